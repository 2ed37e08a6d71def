// Playback module - file cursor, transport controller and the scheduler loop

pub mod controller;
pub mod cursor;
pub mod scheduler;

pub use controller::{OpenError, PlaybackController, TransportState};
pub use cursor::PlaybackCursor;
pub use scheduler::Scheduler;
