//! Realtime playback of sparse, musically-timed MIDI performances.
//!
//! Records name only the timing fields that change. They are resolved into
//! absolute positions, converted to seconds for a tempo, encoded as MIDI and
//! handed to a [`Dispatcher`] that flushes everything due on each tick.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod performance;
pub mod sink;
pub mod timing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PlaybackConfig, ScheduleMode};
pub use dispatcher::{
    CancelToken, Dispatcher, DispatcherState, Flush, SessionEnd, SessionSummary, SinkNotice,
    TickReport,
};
pub use engine::{EngineCommand, EngineHandle, EngineUpdate, spawn_engine, spawn_engine_with_clock};
pub use error::{
    ConfigError, DispatchError, EncodingError, LoadError, RecordError, RecordErrorKind,
    SinkError, ValidationError,
};
pub use events::{MidiMessage, ScheduledEvent};
pub use performance::Performance;
pub use sink::{LogSink, MemorySink, MidiSink, PortSink};
