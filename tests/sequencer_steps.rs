//! Step sequencer driven through the controller: record live notes, play them back

use midistation::router::{EventRouter, QueueCapacities};
use midistation::sequencer::{SequencerEngine, SequencerState, StepNote, load_bank};
use midistation::{
    ChannelStateStore, MidiEvent, PlaybackController, StationConfig, StepGrid, create_live_channel,
};
use ringbuf::traits::Producer;
use tempfile::TempDir;

fn controller_with_live() -> (PlaybackController<Vec<u8>>, midistation::messaging::LiveProducer) {
    let (live_tx, live_rx) = create_live_channel(64);
    let router = EventRouter::new(
        ChannelStateStore::new().into_shared(),
        QueueCapacities::default(),
    );
    // 125 ms steps, 16-step pattern on channel 9
    let sequencer = SequencerEngine::new(StepGrid::default(), Vec::new());
    let controller = PlaybackController::new(Vec::new(), router, sequencer).with_live_input(live_rx);
    (controller, live_tx)
}

fn play_live(
    controller: &mut PlaybackController<Vec<u8>>,
    live: &mut midistation::messaging::LiveProducer,
    at: u64,
    event: MidiEvent,
) {
    live.try_push(event).unwrap();
    controller.tick(at);
}

#[test]
fn test_record_then_play_back() {
    let (mut ctl, mut live) = controller_with_live();
    ctl.sequencer_record(0).unwrap();

    play_live(&mut ctl, &mut live, 0, MidiEvent::note_on(9, 36, 100));
    play_live(&mut ctl, &mut live, 60_000, MidiEvent::note_off(9, 36, 0));
    // 240 ms quantizes to step 2
    play_live(&mut ctl, &mut live, 240_000, MidiEvent::note_on(9, 36, 90));
    play_live(&mut ctl, &mut live, 300_000, MidiEvent::note_off(9, 36, 0));
    // Held from step 4 to step 6: step 5 is tied
    play_live(&mut ctl, &mut live, 500_000, MidiEvent::note_on(9, 38, 80));
    play_live(&mut ctl, &mut live, 760_000, MidiEvent::note_off(9, 38, 0));
    ctl.sequencer_stop(900_000).unwrap();

    let pattern = ctl.sequencer().current_pattern();
    assert!(pattern.step(0).unwrap().contains(36));
    assert!(pattern.step(1).unwrap().is_empty());
    assert_eq!(
        pattern.step(2).unwrap().notes,
        vec![StepNote::new(36, 90).unwrap()]
    );
    assert!(pattern.step(4).unwrap().contains(38));
    assert!(pattern.step(5).unwrap().tied);
    assert!(pattern.step(6).unwrap().is_empty());

    ctl.sink_mut().clear();
    ctl.sequencer_play(1_000_000).unwrap();

    ctl.tick(1_000_000);
    assert_eq!(ctl.sink(), &vec![0x99, 36, 100]);
    ctl.tick(1_125_000);
    assert_eq!(&ctl.sink()[3..], &[0x89, 36, 0]);

    ctl.tick(1_250_000);
    ctl.tick(1_375_000);
    ctl.sink_mut().clear();
    ctl.tick(1_500_000);
    ctl.tick(1_625_000);
    // The tied step keeps 38 sounding without a new NoteOn
    assert_eq!(ctl.sink(), &vec![0x99, 38, 80]);
    ctl.tick(1_750_000);
    assert_eq!(&ctl.sink()[3..], &[0x89, 38, 0]);
}

#[test]
fn test_stop_releases_sounding_notes() {
    let (mut ctl, _live) = controller_with_live();
    ctl.sequencer_mut()
        .pattern_mut(0)
        .unwrap()
        .set_step(0, vec![StepNote::new(42, 100).unwrap()])
        .unwrap();
    ctl.sequencer_play(0).unwrap();
    ctl.tick(0);
    assert_eq!(ctl.sink(), &vec![0x99, 42, 100]);

    ctl.sequencer_stop(10_000).unwrap();
    ctl.tick(10_000);
    assert_eq!(&ctl.sink()[3..], &[0x89, 42, 0]);
    assert_eq!(ctl.sequencer().state(), SequencerState::Stopped);
}

#[test]
fn test_recording_only_from_stopped() {
    let (mut ctl, _live) = controller_with_live();
    ctl.sequencer_play(0).unwrap();
    assert!(ctl.sequencer_record(0).is_err());
    ctl.sequencer_stop(0).unwrap();
    assert!(ctl.sequencer_stop(0).is_err());
    ctl.sequencer_record(0).unwrap();
    assert_eq!(ctl.sequencer().state(), SequencerState::Recording);
}

#[test]
fn test_pattern_bank_saved_and_reloaded() {
    let dir = TempDir::new().unwrap();
    let config = StationConfig {
        settings_path: Some(dir.path().join("midiset.json")),
        pattern_bank_path: Some(dir.path().join("patterns.json")),
        ..StationConfig::default()
    };

    let mut ctl = PlaybackController::from_config(&config, Vec::new());
    assert_eq!(ctl.sequencer().patterns().len(), 8);
    ctl.sequencer_mut()
        .pattern_mut(3)
        .unwrap()
        .toggle_note(7, 40, 64)
        .unwrap();
    ctl.save_patterns().unwrap();

    let patterns = load_bank(config.pattern_bank_path.as_deref().unwrap()).unwrap();
    assert!(patterns[3].step(7).unwrap().contains(40));

    let reloaded = PlaybackController::from_config(&config, Vec::new());
    assert!(
        reloaded
            .sequencer()
            .pattern(3)
            .unwrap()
            .step(7)
            .unwrap()
            .contains(40)
    );
}

#[test]
fn test_recorded_note_plays_once_per_loop() {
    let (mut ctl, mut live) = controller_with_live();
    ctl.sequencer_record(0).unwrap();
    // Step 3 of the 125 ms grid
    play_live(&mut ctl, &mut live, 380_000, MidiEvent::note_on(9, 50, 110));
    play_live(&mut ctl, &mut live, 400_000, MidiEvent::note_off(9, 50, 0));
    ctl.sequencer_stop(500_000).unwrap();

    let pattern = ctl.sequencer().current_pattern();
    for index in (0..16).filter(|i| *i != 3) {
        assert!(pattern.step(index).unwrap().is_empty());
    }

    ctl.sink_mut().clear();
    ctl.sequencer_play(1_000_000).unwrap();
    let mut note_on_times = Vec::new();
    // Two full loops of 16 steps
    for step in 0..32u64 {
        let now = 1_000_000 + step * 125_000;
        let before = ctl.sink().len();
        ctl.tick(now);
        if ctl.sink()[before..].starts_with(&[0x99, 50, 110]) {
            note_on_times.push(step);
        }
    }
    assert_eq!(note_on_times, vec![3, 19]);
}
