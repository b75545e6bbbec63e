//! Error types for every stage of playback.
//!
//! Record-level failures ([`ValidationError`], [`EncodingError`]) are recovered
//! locally by skipping the record or event. Session-level conditions
//! ([`DispatchError`], [`SinkError`]) are returned to the caller as typed results.

use std::path::PathBuf;

use thiserror::Error;

/// A sparse record, resolved position or tempo carries a value outside its range.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("measure must be 1 or greater, got {0}")]
    MeasureOutOfRange(i64),

    #[error("{rank} must be between 1 and 8, got {value}")]
    RankOutOfRange { rank: &'static str, value: i64 },

    #[error("value must be between 0 and 100, got {0}")]
    ValueOutOfRange(i64),

    #[error("bpm must be between 30 and 360, got {0}")]
    BpmOutOfRange(u16),

    #[error("invalid time signature {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    #[error("time signature must look like N/D, got {0:?}")]
    MalformedTimeSignature(String),

    /// The resolved offset lands before an event that was already accepted.
    #[error("position at {offset:.3}s comes before the previous event at {previous:.3}s")]
    OutOfOrder { offset: f64, previous: f64 },
}

/// An event descriptor could not be turned into a MIDI message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("unrecognized event {0:?}")]
    UnknownEvent(String),

    #[error("note {name} maps to {number}, outside 0..=127")]
    NoteOutOfRange { name: String, number: i32 },

    #[error("channel must be between 0 and 15, got {0}")]
    InvalidChannel(u8),
}

/// Why a single record was skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordErrorKind {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// A record that was skipped, with its index in the input sequence.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("record {index}: {kind}")]
pub struct RecordError {
    pub index: usize,
    pub kind: RecordErrorKind,
}

impl RecordError {
    pub fn new(index: usize, kind: impl Into<RecordErrorKind>) -> Self {
        Self {
            index,
            kind: kind.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("no MIDI output device selected")]
    Unavailable,

    /// `sent` messages of the batch went out before the failure.
    #[error("failed to send MIDI message after {sent} in the batch: {message}")]
    Send { sent: usize, message: String },

    #[error("failed to initialize MIDI output: {0}")]
    Init(String),

    #[error("failed to connect to MIDI output {port:?}: {message}")]
    Connect { port: String, message: String },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("a playback session is already running")]
    SessionActive,

    #[error("no playback session is active")]
    NoActiveSession,
}

/// Failure to read or write a performance file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid RON: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("failed to write RON: {0}")]
    RonWrite(#[from] ron::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Channel(#[from] EncodingError),

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("auto-release hold must be greater than zero")]
    ZeroHold,

    #[error(transparent)]
    Load(#[from] LoadError),
}
