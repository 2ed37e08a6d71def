// Event router - merges live, sequencer and file events into MIDI OUT order

use crate::messaging::channels::LiveConsumer;
use crate::midi::event::{EventKind, MidiEvent};
use crate::router::active::{ActiveNotes, all_notes_off_for};
use crate::router::queue::{BoundedQueue, OverflowPolicy};
use crate::router::source::{EventSource, ScheduledEvent};
use crate::settings::store::{ChannelStateStore, SharedChannelState};
use ringbuf::traits::Consumer;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, MutexGuard};

pub const MAX_TRANSPOSE: i8 = 12;

/// A non-blocking enqueue hit a full queue and an event was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{queue} queue full, dropped {discarded:?} ({total} dropped so far)")]
pub struct DroppedEvent {
    pub queue: EventSource,
    pub discarded: MidiEvent,
    pub total: u64,
}

/// Capacity of each per-source queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueCapacities {
    pub live: usize,
    pub sequencer: usize,
    pub file: usize,
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self {
            live: 256,
            sequencer: 256,
            file: 512,
        }
    }
}

/// Merge step between the three producers and MIDI OUT
///
/// Each source has its own bounded FIFO ordered by emission time. `route`
/// takes everything due, sorts it by (time, source priority, arrival) and
/// passes it through the channel filters: mute, program override, and for
/// file events the transpose and velocity offset.
pub struct EventRouter {
    store: SharedChannelState,
    live_input: Option<LiveConsumer>,
    /// Copies of live events for the sequencer recorder, when enabled
    live_tap: Option<Vec<(u64, MidiEvent)>>,
    queues: [BoundedQueue<ScheduledEvent>; 3],
    last_at: [u64; 3],
    dropped: [u64; 3],
    pending_drops: Vec<DroppedEvent>,
    next_seq: u64,
    active: ActiveNotes,
    file_active: ActiveNotes,
    transpose: i8,
    velocity_offset: i8,
    due: Vec<ScheduledEvent>,
}

impl EventRouter {
    pub fn new(store: SharedChannelState, capacities: QueueCapacities) -> Self {
        Self {
            store,
            live_input: None,
            live_tap: None,
            queues: [
                BoundedQueue::new(capacities.live, OverflowPolicy::DropOldest),
                BoundedQueue::new(capacities.sequencer, OverflowPolicy::DropNewest),
                BoundedQueue::new(capacities.file, OverflowPolicy::DropNewest),
            ],
            last_at: [0; 3],
            dropped: [0; 3],
            pending_drops: Vec::new(),
            next_seq: 0,
            active: ActiveNotes::new(),
            file_active: ActiveNotes::new(),
            transpose: 0,
            velocity_offset: 0,
            due: Vec::with_capacity(64),
        }
    }

    /// Attach the ring fed by the MIDI IN callback
    pub fn with_live_input(mut self, consumer: LiveConsumer) -> Self {
        self.set_live_input(consumer);
        self
    }

    pub fn set_live_input(&mut self, consumer: LiveConsumer) {
        self.live_input = Some(consumer);
    }

    pub fn store(&self) -> &SharedChannelState {
        &self.store
    }

    /// Enqueue an event for emission at `at_micros`
    ///
    /// Never blocks. Within one source, emission times never go backwards:
    /// an event stamped earlier than its predecessor is emitted with it.
    pub fn push(
        &mut self,
        source: EventSource,
        at_micros: u64,
        event: MidiEvent,
    ) -> Result<(), DroppedEvent> {
        let index = source.index();
        let at_micros = at_micros.max(self.last_at[index]);
        let scheduled = ScheduledEvent {
            at_micros,
            source,
            seq: self.next_seq,
            event,
        };
        self.next_seq += 1;

        let Some(discarded) = self.queues[index].push(scheduled) else {
            self.last_at[index] = at_micros;
            return Ok(());
        };
        // A rejected event leaves the queue tail unchanged
        if discarded.seq != scheduled.seq {
            self.last_at[index] = at_micros;
        }

        self.dropped[index] += 1;
        let drop = DroppedEvent {
            queue: source,
            discarded: discarded.event,
            total: self.dropped[index],
        };
        tracing::warn!(source = %source, total = drop.total, "router queue full, event dropped");
        self.pending_drops.push(drop);
        Err(drop)
    }

    /// Move everything the MIDI IN callback delivered into the live queue
    pub fn poll_live(&mut self, now_micros: u64) -> usize {
        let Some(mut consumer) = self.live_input.take() else {
            return 0;
        };
        let mut count = 0;
        while let Some(event) = consumer.try_pop() {
            if let Some(tap) = self.live_tap.as_mut() {
                tap.push((now_micros, event));
            }
            // Overflow is recorded in pending_drops
            let _ = self.push(EventSource::Live, now_micros, event);
            count += 1;
        }
        self.live_input = Some(consumer);
        count
    }

    /// Start or stop copying live input for the recorder
    pub fn set_live_tap(&mut self, enabled: bool) {
        self.live_tap = enabled.then(Vec::new);
    }

    /// Live events seen since the last call, with their arrival time
    pub fn take_live_tap(&mut self) -> Vec<(u64, MidiEvent)> {
        self.live_tap.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Earliest emission time across all queues
    pub fn next_deadline(&self) -> Option<u64> {
        self.queues
            .iter()
            .filter_map(|q| q.front().map(|e| e.at_micros))
            .min()
    }

    /// Everything due at `now_micros`, merged and filtered, in emission order
    pub fn route(&mut self, now_micros: u64) -> Vec<MidiEvent> {
        self.poll_live(now_micros);

        let mut due = std::mem::take(&mut self.due);
        due.clear();
        for queue in &mut self.queues {
            queue.drain_while(|e| e.at_micros <= now_micros, &mut due);
        }
        if due.is_empty() {
            self.due = due;
            return Vec::new();
        }
        due.sort_unstable();

        let mut out = Vec::with_capacity(due.len());
        {
            let shared = Arc::clone(&self.store);
            let mut store = lock_store(&shared);
            for scheduled in &due {
                if let Some(event) = self.filter(&mut store, scheduled) {
                    out.push(event);
                }
            }
        }
        self.due = due;
        out
    }

    fn filter(
        &mut self,
        store: &mut ChannelStateStore,
        scheduled: &ScheduledEvent,
    ) -> Option<MidiEvent> {
        let mut event = scheduled.event;
        let channel = event.channel?;

        if scheduled.source == EventSource::File {
            event = self.adjust_file_event(event);
        }

        if event.is_note_on() && store.is_muted(channel) {
            return None;
        }

        // The store keeps the requested program; the override only changes
        // what the synth receives
        store.apply(&event);
        if event.kind == EventKind::ProgramChange {
            if let Some(program) = store.program_override(channel) {
                event = event.with_data1(program);
            }
        }

        self.active.track(&event);
        if scheduled.source == EventSource::File {
            self.file_active.track(&event);
        }
        Some(event)
    }

    fn adjust_file_event(&self, event: MidiEvent) -> MidiEvent {
        let Some(pitch) = event.pitch() else {
            return event;
        };
        let mut event = event.with_pitch((pitch as i16 + self.transpose as i16).clamp(0, 127) as u8);
        if event.is_note_on() && self.velocity_offset != 0 {
            let velocity = (event.data2() as i16 + self.velocity_offset as i16).clamp(1, 127);
            event = event.with_data2(velocity as u8);
        }
        event
    }

    /// All-notes-off for every channel with a hanging note
    ///
    /// Returns the CC 123 burst and the channel mask it covers; both are
    /// empty when nothing is sounding.
    pub fn all_notes_off(&mut self) -> (Vec<MidiEvent>, u16) {
        let mask = self.active.channel_mask();
        self.active.clear();
        self.file_active.clear();
        (all_notes_off_for(mask), mask)
    }

    /// All-notes-off for channels with hanging file notes only
    pub fn flush_file_notes(&mut self) -> (Vec<MidiEvent>, u16) {
        let mask = self.file_active.channel_mask();
        self.file_active.clear();
        self.active.clear_channels(mask);
        (all_notes_off_for(mask), mask)
    }

    /// Discard everything queued for `source`
    pub fn clear_source(&mut self, source: EventSource) {
        let index = source.index();
        self.queues[index].clear();
        self.last_at[index] = 0;
    }

    /// Forget hanging notes on channels silenced outside the router
    pub fn clear_sounding(&mut self, mask: u16) {
        self.active.clear_channels(mask);
        self.file_active.clear_channels(mask);
    }

    /// Drops recorded since the last call
    pub fn take_drops(&mut self) -> Vec<DroppedEvent> {
        std::mem::take(&mut self.pending_drops)
    }

    /// Transpose file notes by `semitones`, limited to one octave either way
    pub fn set_transpose(&mut self, semitones: i8) -> i8 {
        self.transpose = semitones.clamp(-MAX_TRANSPOSE, MAX_TRANSPOSE);
        self.transpose
    }

    pub fn transpose(&self) -> i8 {
        self.transpose
    }

    pub fn set_velocity_offset(&mut self, offset: i8) {
        self.velocity_offset = offset;
    }

    pub fn velocity_offset(&self) -> i8 {
        self.velocity_offset
    }

    pub fn dropped(&self, source: EventSource) -> u64 {
        self.dropped[source.index()]
    }

    pub fn queued(&self, source: EventSource) -> usize {
        self.queues[source.index()].len()
    }

    pub fn sounding_channels(&self) -> u16 {
        self.active.channel_mask()
    }
}

/// Lock the shared store, recovering from a poisoned mutex
pub(crate) fn lock_store(store: &SharedChannelState) -> MutexGuard<'_, ChannelStateStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::create_live_channel;
    use crate::midi::event::CC_VOLUME;
    use crate::settings::types::ChannelUpdate;
    use ringbuf::traits::Producer;

    fn router() -> EventRouter {
        EventRouter::new(ChannelStateStore::new().into_shared(), QueueCapacities::default())
    }

    fn wire(events: &[MidiEvent]) -> Vec<Vec<u8>> {
        events
            .iter()
            .map(|e| e.to_wire().unwrap().as_slice().to_vec())
            .collect()
    }

    #[test]
    fn test_route_only_due_events() {
        let mut router = router();
        router.push(EventSource::File, 0, MidiEvent::program_change(0, 5)).unwrap();
        router.push(EventSource::File, 500_000, MidiEvent::note_on(0, 60, 100)).unwrap();

        assert_eq!(wire(&router.route(0)), vec![vec![0xC0, 5]]);
        assert!(router.route(499_999).is_empty());
        assert_eq!(router.next_deadline(), Some(500_000));
        assert_eq!(wire(&router.route(500_000)), vec![vec![0x90, 60, 100]]);
    }

    #[test]
    fn test_same_time_priority() {
        let mut router = router();
        router.push(EventSource::File, 100, MidiEvent::note_on(2, 62, 1)).unwrap();
        router.push(EventSource::Sequencer, 100, MidiEvent::note_on(1, 61, 1)).unwrap();
        router.push(EventSource::Live, 100, MidiEvent::note_on(0, 60, 1)).unwrap();

        let channels: Vec<_> = router.route(100).iter().map(|e| e.channel.unwrap()).collect();
        assert_eq!(channels, vec![0, 1, 2]);
    }

    #[test]
    fn test_mute_suppresses_note_on_only() {
        let mut router = router();
        lock_store(router.store()).update(3, ChannelUpdate::Mute(true));

        router.push(EventSource::File, 0, MidiEvent::note_on(3, 60, 100)).unwrap();
        router.push(EventSource::File, 0, MidiEvent::control_change(3, CC_VOLUME, 90)).unwrap();
        router.push(EventSource::File, 0, MidiEvent::note_off(3, 60, 0)).unwrap();

        let out = router.route(0);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| !e.is_note_on()));
        assert_eq!(router.sounding_channels(), 0);
    }

    #[test]
    fn test_program_override_and_store_apply() {
        let mut router = router();
        lock_store(router.store()).update(1, ChannelUpdate::ProgramOverride(Some(48)));

        router.push(EventSource::Live, 0, MidiEvent::program_change(1, 3)).unwrap();
        assert_eq!(wire(&router.route(0)), vec![vec![0xC1, 48]]);
        let store = lock_store(router.store());
        assert_eq!(store.get(1).unwrap().program, 3);
        assert_eq!(store.get(1).unwrap().effective_program(), 48);
    }

    #[test]
    fn test_file_transpose_and_velocity() {
        let mut router = router();
        router.set_transpose(3);
        router.set_velocity_offset(-120);

        router.push(EventSource::File, 0, MidiEvent::note_on(0, 60, 100)).unwrap();
        router.push(EventSource::File, 0, MidiEvent::note_on(0, 60, 0)).unwrap();
        router.push(EventSource::Live, 0, MidiEvent::note_on(0, 60, 100)).unwrap();

        assert_eq!(
            wire(&router.route(0)),
            vec![vec![0x90, 60, 100], vec![0x90, 63, 1], vec![0x90, 63, 0]]
        );
    }

    #[test]
    fn test_transpose_is_clamped() {
        let mut router = router();
        assert_eq!(router.set_transpose(40), 12);
        assert_eq!(router.set_transpose(-40), -12);
    }

    #[test]
    fn test_file_overflow_drops_newest() {
        let mut router = EventRouter::new(
            ChannelStateStore::new().into_shared(),
            QueueCapacities {
                live: 2,
                sequencer: 2,
                file: 2,
            },
        );
        router.push(EventSource::File, 0, MidiEvent::note_on(0, 60, 1)).unwrap();
        router.push(EventSource::File, 0, MidiEvent::note_on(0, 61, 1)).unwrap();
        let err = router
            .push(EventSource::File, 0, MidiEvent::note_on(0, 62, 1))
            .unwrap_err();

        assert_eq!(err.queue, EventSource::File);
        assert_eq!(err.discarded.pitch(), Some(62));
        assert_eq!(router.dropped(EventSource::File), 1);
        assert_eq!(router.take_drops(), vec![err]);
        assert!(router.take_drops().is_empty());

        let pitches: Vec<_> = router.route(0).iter().map(|e| e.pitch().unwrap()).collect();
        assert_eq!(pitches, vec![60, 61]);
    }

    #[test]
    fn test_live_overflow_drops_oldest() {
        let (mut producer, consumer) = create_live_channel(16);
        let mut router = EventRouter::new(
            ChannelStateStore::new().into_shared(),
            QueueCapacities {
                live: 2,
                sequencer: 2,
                file: 2,
            },
        )
        .with_live_input(consumer);

        for pitch in 60..63 {
            producer.try_push(MidiEvent::note_on(0, pitch, 100)).unwrap();
        }

        let pitches: Vec<_> = router.route(10).iter().map(|e| e.pitch().unwrap()).collect();
        assert_eq!(pitches, vec![61, 62]);
        assert_eq!(router.dropped(EventSource::Live), 1);
    }

    #[test]
    fn test_route_after_overflow_keeps_what_fit() {
        let (mut producer, consumer) = create_live_channel(16);
        let mut router = EventRouter::new(
            ChannelStateStore::new().into_shared(),
            QueueCapacities {
                live: 1,
                sequencer: 2,
                file: 2,
            },
        )
        .with_live_input(consumer);

        router.push(EventSource::File, 0, MidiEvent::note_on(1, 70, 1)).unwrap();
        router.push(EventSource::File, 0, MidiEvent::note_on(1, 71, 1)).unwrap();
        assert!(router.push(EventSource::File, 0, MidiEvent::note_on(1, 72, 1)).is_err());
        producer.try_push(MidiEvent::note_on(0, 60, 1)).unwrap();
        producer.try_push(MidiEvent::note_on(0, 61, 1)).unwrap();

        // The batch is not emptied: survivors go out in priority order
        let pitches: Vec<_> = router.route(0).iter().map(|e| e.pitch().unwrap()).collect();
        assert_eq!(pitches, vec![61, 70, 71]);

        let drops = router.take_drops();
        assert_eq!(drops.len(), 2);
        assert_eq!(drops[0].queue, EventSource::File);
        assert_eq!(drops[0].discarded.pitch(), Some(72));
        assert_eq!(drops[1].queue, EventSource::Live);
        assert_eq!(drops[1].discarded.pitch(), Some(60));
        assert!(router.route(1).is_empty());
    }

    #[test]
    fn test_live_tap_copies_input() {
        let (mut producer, consumer) = create_live_channel(16);
        let mut router = router().with_live_input(consumer);

        producer.try_push(MidiEvent::note_on(0, 60, 100)).unwrap();
        router.route(5);
        assert!(router.take_live_tap().is_empty());

        router.set_live_tap(true);
        producer.try_push(MidiEvent::note_on(0, 62, 100)).unwrap();
        assert_eq!(router.route(7).len(), 1);
        assert_eq!(router.take_live_tap(), vec![(7, MidiEvent::note_on(0, 62, 100))]);
    }

    #[test]
    fn test_per_source_time_never_regresses() {
        let mut router = router();
        router.push(EventSource::File, 1_000, MidiEvent::note_on(0, 60, 1)).unwrap();
        router.push(EventSource::File, 500, MidiEvent::note_on(0, 61, 1)).unwrap();
        assert!(router.route(999).is_empty());
        assert_eq!(router.route(1_000).len(), 2);
    }

    #[test]
    fn test_all_notes_off_covers_hanging_channels() {
        let mut router = router();
        router.push(EventSource::File, 0, MidiEvent::note_on(0, 60, 100)).unwrap();
        router.push(EventSource::Live, 0, MidiEvent::note_on(5, 40, 100)).unwrap();
        router.push(EventSource::File, 0, MidiEvent::note_on(7, 40, 100)).unwrap();
        router.push(EventSource::File, 0, MidiEvent::note_off(7, 40, 0)).unwrap();
        router.route(0);

        let (events, mask) = router.all_notes_off();
        assert_eq!(mask, (1 << 0) | (1 << 5));
        assert_eq!(wire(&events), vec![vec![0xB0, 123, 0], vec![0xB5, 123, 0]]);
        assert_eq!(router.all_notes_off().1, 0);
    }

    #[test]
    fn test_flush_file_notes_keeps_live_channels() {
        let mut router = router();
        router.push(EventSource::File, 0, MidiEvent::note_on(0, 60, 100)).unwrap();
        router.push(EventSource::Live, 0, MidiEvent::note_on(5, 40, 100)).unwrap();
        router.route(0);

        let (_, mask) = router.flush_file_notes();
        assert_eq!(mask, 1);
        assert_eq!(router.sounding_channels(), 1 << 5);
    }
}
