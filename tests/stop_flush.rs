//! All-notes-off handling on stop, pause and end of track

mod common;

use common::SmfWriter;
use midistation::messaging::NotificationConsumer;
use midistation::router::{EventRouter, QueueCapacities};
use midistation::{
    ChannelStateStore, MidiEvent, PlaybackController, SequencerEngine, Status, StepGrid,
    StopReason, create_notification_channel,
};
use ringbuf::traits::Consumer;

/// Notes on channels 0 and 3 held for two quarters, then released
fn chord_song(with_note_offs: bool) -> Vec<u8> {
    let mut writer = SmfWriter::new(480);
    writer.events(&[
        MidiEvent::note_on(0, 60, 100),
        MidiEvent::note_on(3, 64, 100),
    ]);
    if with_note_offs {
        writer.events(&[
            MidiEvent::note_off(0, 60, 0).with_delta(960),
            MidiEvent::note_off(3, 64, 0),
            MidiEvent::end_of_track(),
        ]);
    } else {
        writer.event(&MidiEvent::end_of_track().with_delta(960));
    }
    writer.finish()
}

fn controller() -> (PlaybackController<Vec<u8>>, NotificationConsumer) {
    let (tx, rx) = create_notification_channel(64);
    let router = EventRouter::new(
        ChannelStateStore::new().into_shared(),
        QueueCapacities::default(),
    );
    let sequencer = SequencerEngine::new(StepGrid::default(), Vec::new());
    let controller = PlaybackController::new(Vec::new(), router, sequencer).with_notifications(tx);
    (controller, rx)
}

fn statuses(rx: &mut NotificationConsumer) -> Vec<Status> {
    std::iter::from_fn(|| rx.try_pop()).map(|n| n.status).collect()
}

fn cc123_channels(bytes: &[u8]) -> Vec<u8> {
    bytes
        .chunks(3)
        .filter(|m| m.len() == 3 && m[0] & 0xF0 == 0xB0 && m[1] == 123)
        .map(|m| m[0] & 0x0F)
        .collect()
}

#[test]
fn test_stop_silences_every_hanging_channel() {
    let (mut ctl, mut rx) = controller();
    ctl.open_bytes("chord.mid", chord_song(true)).unwrap();
    ctl.play(0).unwrap();
    ctl.tick(0);
    assert_eq!(ctl.sink().len(), 6);

    ctl.tick(400_000);
    ctl.stop();
    assert_eq!(cc123_channels(&ctl.sink()[6..]), vec![0, 3]);

    let statuses = statuses(&mut rx);
    assert!(statuses.contains(&Status::StuckNoteRecovery { channels: 0b1001 }));
    assert!(statuses.contains(&Status::Stopped(StopReason::User)));
}

#[test]
fn test_stop_without_hanging_notes_sends_nothing() {
    let (mut ctl, mut rx) = controller();
    ctl.open_bytes("chord.mid", chord_song(true)).unwrap();
    ctl.play(0).unwrap();
    for now in (0..=1_000_000).step_by(10_000) {
        ctl.tick(now);
    }
    let before = ctl.sink().len();
    ctl.stop();
    assert_eq!(ctl.sink().len(), before);
    assert!(
        !statuses(&mut rx)
            .iter()
            .any(|s| matches!(s, Status::StuckNoteRecovery { .. }))
    );
}

#[test]
fn test_end_of_track_with_hanging_notes() {
    let (mut ctl, mut rx) = controller();
    ctl.open_bytes("hang.mid", chord_song(false)).unwrap();
    ctl.play(0).unwrap();
    for now in (0..=1_000_000).step_by(5_000) {
        ctl.tick(now);
    }

    assert_eq!(cc123_channels(&ctl.sink()[6..]), vec![0, 3]);
    let statuses = statuses(&mut rx);
    assert!(statuses.contains(&Status::Stopped(StopReason::EndOfTrack)));
    assert!(!ctl.has_cursor());
}

#[test]
fn test_pause_flushes_and_resume_continues() {
    let (mut ctl, _rx) = controller();
    ctl.open_bytes("chord.mid", chord_song(true)).unwrap();
    ctl.play(0).unwrap();
    ctl.tick(0);
    ctl.pause(100_000);
    assert_eq!(cc123_channels(&ctl.sink()[6..]), vec![0, 3]);

    // Resuming does not re-send the notes that were cut
    let before = ctl.sink().len();
    ctl.play(200_000).unwrap();
    ctl.tick(200_000);
    assert_eq!(ctl.sink().len(), before);

    // The note-offs arrive 900 ms of playback later
    ctl.tick(1_099_999);
    assert_eq!(ctl.sink().len(), before);
    ctl.tick(1_100_000);
    assert_eq!(&ctl.sink()[before..], &[0x80, 60, 0, 0x83, 64, 0]);
}

#[test]
fn test_open_replaces_playing_file() {
    let (mut ctl, mut rx) = controller();
    ctl.open_bytes("first.mid", chord_song(true)).unwrap();
    ctl.play(0).unwrap();
    ctl.tick(0);

    ctl.open_bytes("second.mid", chord_song(true)).unwrap();
    assert_eq!(cc123_channels(&ctl.sink()[6..]), vec![0, 3]);
    assert_eq!(ctl.file_name(), Some("second.mid"));
    assert!(statuses(&mut rx).contains(&Status::Stopped(StopReason::FileReplaced)));
}
