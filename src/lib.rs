// MIDI Station - Library exports for the binary, tests and benchmarks

pub mod config;
pub mod messaging;
pub mod midi;
pub mod playback;
pub mod router;
pub mod sequencer;
pub mod settings;
pub mod smf;
pub mod timing;

// Re-export commonly used types for convenience
pub use config::{ConfigError, StationConfig};
pub use messaging::channels::{
    create_command_channel, create_live_channel, create_notification_channel,
};
pub use messaging::{Command, Notification, Status, StopReason};
pub use midi::event::{EventKind, MidiEvent};
pub use midi::sink::{MidiSink, SinkError};
pub use playback::{OpenError, PlaybackController, Scheduler, TransportState};
pub use router::{EventRouter, EventSource, QueueCapacities};
pub use sequencer::{Pattern, SequencerEngine, SequencerState};
pub use settings::{ChannelSetting, ChannelStateStore, ChannelUpdate, StorageError};
pub use smf::{FormatError, SmfDecoder, SmfHeader};
pub use timing::{MonotonicClock, StepGrid, TempoClock, TempoState};
