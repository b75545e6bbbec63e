use super::MidiSink;
use crate::error::SinkError;
use crate::events::MidiMessage;

/// Logs every message instead of sending it anywhere. Used for dry runs.
#[derive(Debug, Default)]
pub struct LogSink {
    sent: usize,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl MidiSink for LogSink {
    fn is_available(&self) -> bool {
        true
    }

    fn send_batch(&mut self, batch: &[[u8; 3]]) -> Result<(), SinkError> {
        for bytes in batch {
            match MidiMessage::from_bytes(*bytes) {
                Some(message) => tracing::info!("[{:>6}] {}", self.sent, message),
                None => tracing::info!("[{:>6}] Raw: {:02X?}", self.sent, bytes),
            }
            self.sent += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_messages() {
        let mut sink = LogSink::new();
        sink.send_batch(&[[0x90, 60, 100], [0xF8, 0, 0]]).unwrap();
        sink.send_batch(&[[0x80, 60, 0]]).unwrap();
        assert_eq!(sink.sent(), 3);
    }
}
