// MIDI OUT - byte sink abstraction
// The core only needs "write these bytes"; the transport (UART, midir port,
// in-memory buffer) lives behind this trait.

use crate::midi::event::MidiEvent;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("MIDI send failed: {0}")]
    Send(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for outbound MIDI bytes
pub trait MidiSink {
    /// Write one complete message (status + data bytes)
    fn send(&mut self, message: &[u8]) -> Result<(), SinkError>;

    /// Write an event, skipping events with no wire form (meta, SysEx)
    fn send_event(&mut self, event: &MidiEvent) -> Result<(), SinkError> {
        match event.to_wire() {
            Some(wire) => self.send(wire.as_slice()),
            None => Ok(()),
        }
    }
}

/// In-memory sink, the raw byte stream as it would leave the UART
impl MidiSink for Vec<u8> {
    fn send(&mut self, message: &[u8]) -> Result<(), SinkError> {
        self.extend_from_slice(message);
        Ok(())
    }
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn send(&mut self, message: &[u8]) -> Result<(), SinkError> {
        (**self).send(message)
    }
}

/// Adapter writing to any `std::io::Write` (serial device file, pipe)
pub struct WriteSink<W: std::io::Write> {
    inner: W,
}

impl<W: std::io::Write> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: std::io::Write> MidiSink for WriteSink<W> {
    fn send(&mut self, message: &[u8]) -> Result<(), SinkError> {
        self.inner.write_all(message)?;
        self.inner.flush()?;
        Ok(())
    }
}
