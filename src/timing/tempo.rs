use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ResolvedPosition;
use crate::error::ValidationError;

pub const MIN_BPM: u16 = 30;
pub const MAX_BPM: u16 = 360;

/// Written as `"3/4"`. Reading also accepts `{numerator, denominator}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeSignatureRepr", into = "String")]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const COMMON: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    pub fn new(numerator: u8, denominator: u8) -> Result<Self, ValidationError> {
        let signature = Self {
            numerator,
            denominator,
        };
        signature.validate()?;
        Ok(signature)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let numerator_ok = (1..=32).contains(&self.numerator);
        let denominator_ok = self.denominator.is_power_of_two() && self.denominator <= 64;
        if numerator_ok && denominator_ok {
            Ok(())
        } else {
            Err(ValidationError::InvalidTimeSignature {
                numerator: self.numerator,
                denominator: self.denominator,
            })
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeSignatureRepr {
    Text(String),
    Fields { numerator: u8, denominator: u8 },
}

impl TryFrom<TimeSignatureRepr> for TimeSignature {
    type Error = ValidationError;

    fn try_from(repr: TimeSignatureRepr) -> Result<Self, Self::Error> {
        match repr {
            TimeSignatureRepr::Text(text) => text.parse(),
            TimeSignatureRepr::Fields {
                numerator,
                denominator,
            } => Self::new(numerator, denominator),
        }
    }
}

impl From<TimeSignature> for String {
    fn from(signature: TimeSignature) -> Self {
        signature.to_string()
    }
}

impl FromStr for TimeSignature {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ValidationError::MalformedTimeSignature(s.to_string());
        let (numerator, denominator) = s.split_once('/').ok_or_else(malformed)?;
        let numerator = numerator.trim().parse().map_err(|_| malformed())?;
        let denominator = denominator.trim().parse().map_err(|_| malformed())?;
        Self::new(numerator, denominator)
    }
}

/// Tempo and meter for one session.
///
/// A beat is always a quarter note lasting `60 / bpm` seconds. The denominator
/// of the time signature is carried for display only; the numerator sets the
/// number of beats per measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tempo {
    bpm: u16,
    time_signature: TimeSignature,
}

impl Tempo {
    pub fn new(bpm: u16, time_signature: TimeSignature) -> Result<Self, ValidationError> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(ValidationError::BpmOutOfRange(bpm));
        }
        time_signature.validate()?;
        Ok(Self {
            bpm,
            time_signature,
        })
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    pub fn seconds_per_measure(&self) -> f64 {
        self.time_signature.numerator as f64 * 60.0 / self.bpm as f64
    }

    /// Elapsed seconds from the start of playback to `position`.
    /// A zero rank, which resolution never produces, counts as 1.
    pub fn offset_seconds(&self, position: &ResolvedPosition) -> f64 {
        let beat = self.seconds_per_beat();
        position.measure.saturating_sub(1) as f64 * self.seconds_per_measure()
            + position.beat.saturating_sub(1) as f64 * beat
            + position.quarter_sub.saturating_sub(1) as f64 * beat / 4.0
            + position.sixteenth_sub.saturating_sub(1) as f64 * beat / 16.0
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bpm in {}", self.bpm, self.time_signature)
    }
}
