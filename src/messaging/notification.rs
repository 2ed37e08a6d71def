// Status signals - scheduler -> UI
// Every failure in the playback hot path ends up here instead of unwinding.

use crate::router::EventSource;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Why the file player stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    EndOfTrack,
    FileReplaced,
}

/// What happened
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Opened { name: String, ticks_per_quarter: u16 },
    OpenFailed(String),
    /// The track turned out malformed during playback; it ends there
    DecodeError(String),
    Playing,
    Paused,
    Stopped(StopReason),
    /// A bounded router queue overflowed and discarded an event
    DroppedEvent { source: EventSource, total: u64 },
    /// Settings could not be read or written; in-memory values are in use
    StorageWarning(String),
    SettingsLoaded { slot: u16 },
    PatternsLoaded { slot: u16 },
    /// All-notes-off was sent; bit `n` set means channel `n` had hanging notes
    StuckNoteRecovery { channels: u16 },
    SequencerState(crate::sequencer::SequencerState),
    OutputError(String),
}

impl Status {
    pub fn level(&self) -> NotificationLevel {
        match self {
            Status::OpenFailed(_) | Status::DecodeError(_) | Status::OutputError(_) => NotificationLevel::Error,
            Status::DroppedEvent { .. } | Status::StorageWarning(_) => NotificationLevel::Warning,
            _ => NotificationLevel::Info,
        }
    }
}

/// Notification with timestamp
#[derive(Debug, Clone)]
pub struct Notification {
    pub status: Status,
    pub timestamp: u64, // Unix timestamp in milliseconds
}

impl Notification {
    pub fn new(status: Status) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self { status, timestamp }
    }

    pub fn level(&self) -> NotificationLevel {
        self.status.level()
    }

    /// Whether the notification is younger than `max_age_ms`
    pub fn is_recent(&self, max_age_ms: u64) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        now.saturating_sub(self.timestamp) < max_age_ms
    }
}
