//! Output side of playback. The dispatcher hands each flushed batch to a
//! [`MidiSink`] in one call; what happens after that is up to the sink.

mod log;
mod memory;
mod port;

pub use self::log::LogSink;
pub use memory::MemorySink;
pub use port::{PortSink, list_ports};

use crate::error::SinkError;

pub trait MidiSink {
    /// Whether an output device is currently selected.
    fn is_available(&self) -> bool;

    /// Delivers an ordered batch of 3-byte messages.
    fn send_batch(&mut self, batch: &[[u8; 3]]) -> Result<(), SinkError>;
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn send_batch(&mut self, batch: &[[u8; 3]]) -> Result<(), SinkError> {
        (**self).send_batch(batch)
    }
}
