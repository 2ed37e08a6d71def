// MIDI ports - midir-backed MIDI OUT sink and MIDI IN source

use crate::messaging::channels::LiveProducer;
use crate::midi::sink::{MidiSink, SinkError};
use crate::midi::wire::WireParser;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use ringbuf::traits::Producer;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const CLIENT_NAME: &str = "midistation";

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("MIDI init error: {0}")]
    Init(String),

    #[error("no MIDI port matching '{0}'")]
    NoPort(String),

    #[error("MIDI connection failed: {0}")]
    Connect(String),
}

#[derive(Clone, Debug)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// Names of all MIDI OUT ports
pub fn list_output_ports() -> Result<Vec<MidiPortInfo>, DeviceError> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| DeviceError::Init(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_out
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { index, name })
        })
        .collect())
}

/// Names of all MIDI IN ports
pub fn list_input_ports() -> Result<Vec<MidiPortInfo>, DeviceError> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| DeviceError::Init(e.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_in
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { index, name })
        })
        .collect())
}

/// MIDI OUT through a midir connection (the synthesizer module)
pub struct MidirSink {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidirSink {
    /// Connect to the first output port whose name contains `filter`,
    /// or the first port when no filter is given
    pub fn connect(filter: Option<&str>) -> Result<Self, DeviceError> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|e| DeviceError::Init(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| match filter {
                Some(f) => midi_out.port_name(p).map(|n| n.contains(f)).unwrap_or(false),
                None => true,
            })
            .ok_or_else(|| DeviceError::NoPort(filter.unwrap_or("*").to_string()))?;

        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_out
            .connect(port, "midistation-out")
            .map_err(|e| DeviceError::Connect(e.to_string()))?;

        tracing::info!(port = %port_name, "MIDI OUT connected");
        Ok(Self {
            connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, message: &[u8]) -> Result<(), SinkError> {
        self.connection
            .send(message)
            .map_err(|e| SinkError::Send(e.to_string()))
    }
}

/// Live MIDI IN connection feeding the router's live ring
///
/// The midir callback runs on its own thread; it parses bytes and pushes
/// events without blocking. A full ring drops the incoming event and counts it.
pub struct LiveInput {
    _connection: MidiInputConnection<WireParser>,
    dropped: Arc<AtomicU64>,
    port_name: String,
}

impl LiveInput {
    /// Connect to the first input port matching `filter`
    ///
    /// Returns `Ok(None)` when the system has no MIDI IN port at all; the
    /// station then runs without live input.
    pub fn connect(
        filter: Option<&str>,
        mut producer: LiveProducer,
    ) -> Result<Option<Self>, DeviceError> {
        let mut midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|e| DeviceError::Init(e.to_string()))?;
        midi_in.ignore(Ignore::All);

        let ports = midi_in.ports();
        if ports.is_empty() {
            tracing::info!("no MIDI IN port detected, running without live input");
            return Ok(None);
        }

        let port = ports
            .iter()
            .find(|p| match filter {
                Some(f) => midi_in.port_name(p).map(|n| n.contains(f)).unwrap_or(false),
                None => true,
            })
            .ok_or_else(|| DeviceError::NoPort(filter.unwrap_or("*").to_string()))?;

        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_in_callback = Arc::clone(&dropped);

        let connection = midi_in
            .connect(
                port,
                "midistation-in",
                move |_timestamp, message, parser: &mut WireParser| {
                    parser.feed(message, |event| {
                        if producer.try_push(event).is_err() {
                            let total = dropped_in_callback.fetch_add(1, Ordering::Relaxed) + 1;
                            tracing::warn!(total, "live input ring full, event dropped");
                        }
                    });
                },
                WireParser::new(),
            )
            .map_err(|e| DeviceError::Connect(e.to_string()))?;

        tracing::info!(port = %port_name, "MIDI IN connected");
        Ok(Some(Self {
            _connection: connection,
            dropped,
            port_name,
        }))
    }

    /// Events lost because the live ring was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}
