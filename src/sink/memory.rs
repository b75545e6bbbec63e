use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::MidiSink;
use crate::error::SinkError;

/// Keeps every delivered batch in memory. Clones share the same record, so a
/// test can keep one handle while the dispatcher owns another.
#[derive(Debug, Clone)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<[u8; 3]>>>>,
    available: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates selecting or unplugging the output device.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn batches(&self) -> Vec<Vec<[u8; 3]>> {
        self.batches.lock().clone()
    }

    pub fn messages(&self) -> Vec<[u8; 3]> {
        self.batches.lock().iter().flatten().copied().collect()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiSink for MemorySink {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn send_batch(&mut self, batch: &[[u8; 3]]) -> Result<(), SinkError> {
        if !self.is_available() {
            return Err(SinkError::Unavailable);
        }
        self.batches.lock().push(batch.to_vec());
        Ok(())
    }
}
