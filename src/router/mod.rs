// Router - three-source merge in front of MIDI OUT

pub mod active;
pub mod queue;
#[allow(clippy::module_inception)]
pub mod router;
pub mod source;

pub use active::{ActiveNotes, all_notes_off_for};
pub use queue::{BoundedQueue, OverflowPolicy};
pub use router::{DroppedEvent, EventRouter, MAX_TRANSPOSE, QueueCapacities};
pub use source::{EventSource, ScheduledEvent};
