// Event sources - origin tags used for merge priority

use crate::midi::event::MidiEvent;
use std::cmp::Ordering;
use std::fmt;

/// Where an event came from
///
/// Declaration order is merge priority: at equal emission time, live input
/// goes first, then the sequencer, then the file player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventSource {
    Live,
    Sequencer,
    File,
}

impl EventSource {
    pub const ALL: [EventSource; 3] = [EventSource::Live, EventSource::Sequencer, EventSource::File];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventSource::Live => "live",
            EventSource::Sequencer => "sequencer",
            EventSource::File => "file",
        };
        f.write_str(name)
    }
}

/// An event waiting in the router with its emission time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    /// Emission time in µs on the scheduler clock
    pub at_micros: u64,
    pub source: EventSource,
    /// Arrival order, keeps same-source same-time events stable
    pub seq: u64,
    pub event: MidiEvent,
}

impl ScheduledEvent {
    fn merge_key(&self) -> (u64, EventSource, u64) {
        (self.at_micros, self.source, self.seq)
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.merge_key().cmp(&other.merge_key())
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled(at: u64, source: EventSource, seq: u64) -> ScheduledEvent {
        ScheduledEvent {
            at_micros: at,
            source,
            seq,
            event: MidiEvent::note_on(0, 60, 100),
        }
    }

    #[test]
    fn test_priority_order() {
        assert!(EventSource::Live < EventSource::Sequencer);
        assert!(EventSource::Sequencer < EventSource::File);
    }

    #[test]
    fn test_merge_ordering() {
        let mut events = vec![
            scheduled(10, EventSource::File, 0),
            scheduled(10, EventSource::Live, 3),
            scheduled(5, EventSource::File, 1),
            scheduled(10, EventSource::Sequencer, 2),
        ];
        events.sort();
        let order: Vec<_> = events.iter().map(|e| (e.at_micros, e.source)).collect();
        assert_eq!(
            order,
            vec![
                (5, EventSource::File),
                (10, EventSource::Live),
                (10, EventSource::Sequencer),
                (10, EventSource::File),
            ]
        );
    }
}
