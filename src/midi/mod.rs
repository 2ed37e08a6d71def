pub mod device;
pub mod event;
pub mod sink;
pub mod wire;

pub use event::{EventKind, MidiEvent, WireMessage};
pub use sink::{MidiSink, SinkError, WriteSink};
pub use wire::WireParser;
