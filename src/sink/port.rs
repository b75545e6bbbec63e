use midir::{MidiOutput, MidiOutputConnection};

use super::MidiSink;
use crate::error::SinkError;

const CLIENT_NAME: &str = "midicue";

/// Names of the MIDI output ports currently visible.
pub fn list_ports() -> Result<Vec<String>, SinkError> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| SinkError::Init(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .map(|port| midi_out.port_name(port).unwrap_or_default())
        .collect())
}

/// Sends batches to a hardware or virtual MIDI output port.
pub struct PortSink {
    connection: Option<MidiOutputConnection>,
    port_name: Option<String>,
}

impl PortSink {
    /// Connects to the first port whose name contains `query`, falling back to
    /// the first port. With no ports at all the sink is created unavailable.
    pub fn connect(query: Option<&str>) -> Result<Self, SinkError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| SinkError::Init(e.to_string()))?;
        let ports = midi_out.ports();

        let port = query
            .and_then(|query| {
                ports
                    .iter()
                    .find(|p| midi_out.port_name(p).unwrap_or_default().contains(query))
            })
            .or_else(|| ports.first());

        let Some(port) = port else {
            tracing::warn!("No MIDI outputs found.");
            return Ok(Self::disconnected());
        };

        let port_name = midi_out.port_name(port).unwrap_or_default();
        if let Some(query) = query {
            if !port_name.contains(query) {
                tracing::warn!("No MIDI output matches {:?}, using {}", query, port_name);
            }
        }

        let connection = midi_out
            .connect(port, "midicue-output")
            .map_err(|e| SinkError::Connect {
                port: port_name.clone(),
                message: e.to_string(),
            })?;

        tracing::info!("Selected output: {}", port_name);
        Ok(Self {
            connection: Some(connection),
            port_name: Some(port_name),
        })
    }

    pub fn disconnected() -> Self {
        Self {
            connection: None,
            port_name: None,
        }
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            tracing::info!("Closed output: {}", self.port_name.take().unwrap_or_default());
        }
    }
}

impl MidiSink for PortSink {
    fn is_available(&self) -> bool {
        self.connection.is_some()
    }

    fn send_batch(&mut self, batch: &[[u8; 3]]) -> Result<(), SinkError> {
        let connection = self.connection.as_mut().ok_or(SinkError::Unavailable)?;
        for (sent, message) in batch.iter().enumerate() {
            connection.send(message).map_err(|e| SinkError::Send {
                sent,
                message: e.to_string(),
            })?;
            tracing::trace!("Sent MIDI: {:?}", message);
        }
        Ok(())
    }
}

impl Drop for PortSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_sink_reports_unavailable() {
        let mut sink = PortSink::disconnected();
        assert!(!sink.is_available());
        assert!(matches!(
            sink.send_batch(&[[0x90, 60, 100]]),
            Err(SinkError::Unavailable)
        ));
    }
}
