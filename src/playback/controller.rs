// Playback controller - file transport, sequencer control and the per-tick
// pipeline: cursor -> router, sequencer -> router, router -> MIDI OUT

use crate::config::StationConfig;
use crate::messaging::channels::{LiveConsumer, NotificationProducer};
use crate::messaging::command::Command;
use crate::messaging::notification::{Notification, Status, StopReason};
use crate::midi::event::{MidiEvent, master_volume_sysex};
use crate::midi::sink::{MidiSink, SinkError};
use crate::playback::cursor::PlaybackCursor;
use crate::router::router::lock_store;
use crate::router::{EventRouter, EventSource};
use crate::sequencer::{
    PatternId, SequencerEngine, SequencerError, SequencerState, blank_bank, load_bank,
    load_bank_slot, save_bank, save_bank_slot,
};
use crate::settings::{ChannelSetting, ChannelStateStore, ChannelUpdate, StorageError};
use crate::smf::{FormatError, SmfDecoder, SmfHeader};
use crate::timing::tempo::StepGrid;
use ringbuf::traits::Producer;
use std::path::{Path, PathBuf};

const BACKLOG_LIMIT: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid MIDI file: {0}")]
    Format(#[from] FormatError),

    #[error("No file loaded")]
    NoFile,
}

/// File player transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug)]
struct LoadedFile {
    name: String,
    bytes: Vec<u8>,
    header: SmfHeader,
}

/// Top-level orchestrator owned by the scheduler thread
///
/// All times are µs on the scheduler clock. Nothing in [`tick`](Self::tick)
/// returns an error: sink failures, decode errors and queue overflows are
/// logged and turned into notifications.
pub struct PlaybackController<S: MidiSink> {
    sink: S,
    router: EventRouter,
    sequencer: SequencerEngine,
    notifications: Option<NotificationProducer>,
    backlog: Vec<Status>,
    file: Option<LoadedFile>,
    cursor: Option<PlaybackCursor>,
    state: TransportState,
    /// Scheduler time matching `file_origin`
    sched_origin: u64,
    /// Playback time the file resumed from
    file_origin: u64,
    paused_at: u64,
    end_reached: bool,
    lookahead_micros: u64,
    speed_percent: u16,
    pattern_bank_path: Option<PathBuf>,
    record_dir: Option<PathBuf>,
    master_volume: u8,
    seq_out: Vec<(u64, MidiEvent)>,
    sink_failed: bool,
}

impl<S: MidiSink> PlaybackController<S> {
    pub fn new(sink: S, router: EventRouter, sequencer: SequencerEngine) -> Self {
        Self {
            sink,
            router,
            sequencer,
            notifications: None,
            backlog: Vec::new(),
            file: None,
            cursor: None,
            state: TransportState::Stopped,
            sched_origin: 0,
            file_origin: 0,
            paused_at: 0,
            end_reached: false,
            lookahead_micros: 20_000,
            speed_percent: 100,
            pattern_bank_path: None,
            record_dir: None,
            master_volume: 127,
            seq_out: Vec::with_capacity(32),
            sink_failed: false,
        }
    }

    /// Build the whole core from a configuration
    ///
    /// Settings and pattern bank are loaded here; read failures fall back to
    /// defaults and are reported once notifications are attached.
    pub fn from_config(config: &StationConfig, sink: S) -> Self {
        let mut backlog = Vec::new();

        let mut store = match &config.settings_path {
            Some(path) => ChannelStateStore::with_path(path),
            None => ChannelStateStore::new(),
        };
        if let Err(e) = store.load() {
            backlog.push(Status::StorageWarning(format!("settings: {}", e)));
        }
        let router = EventRouter::new(store.into_shared(), config.queues);

        let seq = &config.sequencer;
        let grid = StepGrid::from_bpm(seq.bpm, seq.steps_per_quarter);
        let blank = || {
            blank_bank(seq.pattern_slots, seq.steps, seq.channel, seq.looping).unwrap_or_default()
        };
        let patterns = match &config.pattern_bank_path {
            Some(path) if path.exists() => load_bank(path).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "pattern bank unreadable, using blank patterns");
                backlog.push(Status::StorageWarning(format!("patterns: {}", e)));
                blank()
            }),
            _ => blank(),
        };

        let mut controller = Self::new(sink, router, SequencerEngine::new(grid, patterns));
        controller.lookahead_micros = config.lookahead_micros;
        controller.pattern_bank_path = config.pattern_bank_path.clone();
        controller.record_dir = config.record_dir.clone();
        controller.master_volume = config.master_volume.min(127);
        controller.backlog = backlog;
        controller
    }

    /// Attach the status ring; statuses raised before are delivered now
    pub fn with_notifications(mut self, producer: NotificationProducer) -> Self {
        self.notifications = Some(producer);
        for status in std::mem::take(&mut self.backlog) {
            self.notify(status);
        }
        self
    }

    pub fn with_live_input(mut self, consumer: LiveConsumer) -> Self {
        self.router.set_live_input(consumer);
        self
    }

    pub fn with_lookahead(mut self, micros: u64) -> Self {
        self.lookahead_micros = micros;
        self
    }

    /// Directory holding the numbered settings and pattern records
    pub fn with_record_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_dir = Some(dir.into());
        self
    }

    fn notify(&mut self, status: Status) {
        match self.notifications.as_mut() {
            Some(producer) => {
                if producer.try_push(Notification::new(status)).is_err() {
                    tracing::debug!("notification ring full");
                }
            }
            None if self.backlog.len() < BACKLOG_LIMIT => self.backlog.push(status),
            None => {}
        }
    }

    // ---- file transport ----

    /// Read and validate a file; on failure the current file stays loaded
    pub fn open(&mut self, path: &Path) -> Result<SmfHeader, OpenError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(source) => {
                let err = OpenError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                tracing::warn!(error = %err, "open failed");
                self.notify(Status::OpenFailed(err.to_string()));
                return Err(err);
            }
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.open_bytes(name, bytes)
    }

    /// Open a file already in memory
    pub fn open_bytes(
        &mut self,
        name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<SmfHeader, OpenError> {
        let name = name.into();
        let decoder = match SmfDecoder::from_bytes(&bytes) {
            Ok(decoder) => decoder,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "open failed");
                self.notify(Status::OpenFailed(e.to_string()));
                return Err(e.into());
            }
        };
        let header = decoder.header();

        if self.state != TransportState::Stopped {
            self.stop_with(StopReason::FileReplaced);
        }
        let mut cursor = PlaybackCursor::new(decoder);
        cursor.set_speed(self.speed_percent);
        self.cursor = Some(cursor);
        self.end_reached = false;

        tracing::info!(
            file = %name,
            format = header.format,
            ticks_per_quarter = header.ticks_per_quarter,
            "file opened"
        );
        self.notify(Status::Opened {
            name: name.clone(),
            ticks_per_quarter: header.ticks_per_quarter,
        });
        self.file = Some(LoadedFile {
            name,
            bytes,
            header,
        });
        Ok(header)
    }

    fn fresh_cursor(&self) -> Result<PlaybackCursor, OpenError> {
        let file = self.file.as_ref().ok_or(OpenError::NoFile)?;
        let mut cursor = PlaybackCursor::new(SmfDecoder::from_bytes(&file.bytes)?);
        cursor.set_speed(self.speed_percent);
        Ok(cursor)
    }

    /// Start from the beginning, or resume after pause
    pub fn play(&mut self, now: u64) -> Result<(), OpenError> {
        match self.state {
            TransportState::Playing => return Ok(()),
            TransportState::Paused => {
                self.sched_origin = now;
                self.file_origin = self.paused_at;
            }
            TransportState::Stopped => {
                if self.cursor.is_none() {
                    self.cursor = Some(self.fresh_cursor()?);
                }
                lock_store(self.router.store()).take_snapshot();
                self.sched_origin = now;
                self.file_origin = 0;
                self.end_reached = false;
            }
        }
        self.state = TransportState::Playing;
        tracing::info!(file = self.file_name().unwrap_or("-"), "playing");
        self.notify(Status::Playing);
        Ok(())
    }

    /// Freeze the file clock and silence hanging notes
    pub fn pause(&mut self, now: u64) {
        if self.state != TransportState::Playing {
            return;
        }
        self.paused_at = self.file_now(now);
        self.router.clear_source(EventSource::File);
        self.flush_notes();
        self.state = TransportState::Paused;
        tracing::info!(position_micros = self.paused_at, "paused");
        self.notify(Status::Paused);
    }

    /// Stop file playback; always ends with the all-notes-off burst
    pub fn stop(&mut self) {
        self.stop_with(StopReason::User);
    }

    fn stop_with(&mut self, reason: StopReason) {
        self.router.clear_source(EventSource::File);
        self.flush_notes();
        self.cursor = None;
        self.end_reached = false;

        let restored = lock_store(self.router.store()).restore_snapshot();
        if let Some(changed) = restored {
            for setting in &changed {
                self.send_now(&setting.restore_events());
            }
            tracing::debug!(channels = changed.len(), "channel settings restored");
        }

        if self.state != TransportState::Stopped {
            self.state = TransportState::Stopped;
            tracing::info!(?reason, "stopped");
            self.notify(Status::Stopped(reason));
        }
    }

    /// Jump to an absolute tick
    ///
    /// Program and controller changes before the target are re-sent; a
    /// stopped player becomes paused at the target.
    pub fn seek(&mut self, tick: u64, now: u64) -> Result<(), OpenError> {
        let file = self.file.as_ref().ok_or(OpenError::NoFile)?;
        let decoder = SmfDecoder::from_bytes(&file.bytes)?;
        let (cursor, chase) = PlaybackCursor::seek(decoder, tick, self.speed_percent)?;
        let start = cursor.start_micros();

        self.router.clear_source(EventSource::File);
        let (offs, _) = self.router.flush_file_notes();
        self.send_now(&offs);
        for event in chase {
            // Overflow is reported through take_drops
            let _ = self.router.push(EventSource::File, now, event);
        }
        self.cursor = Some(cursor);
        self.end_reached = false;

        match self.state {
            TransportState::Playing => {
                self.sched_origin = now;
                self.file_origin = start;
            }
            TransportState::Paused => self.paused_at = start,
            TransportState::Stopped => {
                lock_store(self.router.store()).take_snapshot();
                self.paused_at = start;
                self.state = TransportState::Paused;
                self.notify(Status::Paused);
            }
        }
        tracing::info!(tick, position_micros = start, "seek");
        Ok(())
    }

    // ---- channel settings ----

    /// User edit of a channel, sent to the synth right away
    pub fn set_channel(&mut self, channel: u8, update: ChannelUpdate) -> Option<ChannelSetting> {
        let updated = lock_store(self.router.store()).update(channel, update);
        let Some(setting) = updated else {
            tracing::warn!(channel, "channel out of range");
            return None;
        };
        if let Some(event) = update.to_event(&setting) {
            self.send_now(&[event]);
        }
        if update == ChannelUpdate::Mute(true) {
            self.router.clear_sounding(1 << channel);
            self.sequencer.forget_channels(1 << channel);
        }
        tracing::debug!(channel, ?update, "channel updated");
        Some(setting)
    }

    pub fn save_settings(&mut self) -> Result<(), StorageError> {
        // Copy under the lock, write without it
        let (path, store) = {
            let store = lock_store(self.router.store());
            (store.path().map(Path::to_path_buf), store.clone())
        };
        let result = match path {
            Some(path) => store.save_to(&path),
            None => Err(StorageError::NoPath),
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "saving settings failed");
            self.notify(Status::StorageWarning(e.to_string()));
        }
        result
    }

    /// Save the channel settings as numbered record `slot`
    pub fn save_settings_slot(&mut self, slot: u16) -> Result<PathBuf, StorageError> {
        let store = lock_store(self.router.store()).clone();
        let result = match &self.record_dir {
            Some(dir) => store.save_slot(dir, slot),
            None => Err(StorageError::NoPath),
        };
        self.report_storage(result, "saving settings record failed")
    }

    /// Switch to numbered settings record `slot` and send it to the synth
    ///
    /// On failure the current settings stay in effect.
    pub fn load_settings_slot(&mut self, slot: u16) -> Result<(), StorageError> {
        let loaded = match &self.record_dir {
            Some(dir) => lock_store(self.router.store())
                .load_slot(dir, slot)
                .map(|channels| *channels),
            None => Err(StorageError::NoPath),
        };
        let channels = self.report_storage(loaded, "loading settings record failed")?;
        for setting in &channels {
            self.send_now(&setting.restore_events());
        }
        self.notify(Status::SettingsLoaded { slot });
        Ok(())
    }

    fn report_storage<T>(
        &mut self,
        result: Result<T, StorageError>,
        context: &'static str,
    ) -> Result<T, StorageError> {
        if let Err(e) = &result {
            tracing::warn!(error = %e, "{}", context);
            self.notify(Status::StorageWarning(e.to_string()));
        }
        result
    }

    // ---- sequencer ----

    pub fn sequencer_record(&mut self, now: u64) -> Result<(), SequencerError> {
        self.sequencer.record(now)?;
        self.router.set_live_tap(true);
        self.notify(Status::SequencerState(SequencerState::Recording));
        Ok(())
    }

    pub fn sequencer_play(&mut self, now: u64) -> Result<(), SequencerError> {
        self.sequencer.play(now)?;
        self.notify(Status::SequencerState(SequencerState::Playing));
        Ok(())
    }

    pub fn sequencer_stop(&mut self, now: u64) -> Result<(), SequencerError> {
        let offs = self.sequencer.stop()?;
        for event in offs {
            let _ = self.router.push(EventSource::Sequencer, now, event);
        }
        self.router.set_live_tap(false);
        self.notify(Status::SequencerState(SequencerState::Stopped));
        Ok(())
    }

    pub fn pattern_select(&mut self, id: PatternId) -> Result<(), SequencerError> {
        self.sequencer.select_pattern(id)
    }

    pub fn save_patterns(&mut self) -> Result<(), StorageError> {
        let result = match &self.pattern_bank_path {
            Some(path) => save_bank(path, self.sequencer.patterns()),
            None => Err(StorageError::NoPath),
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "saving patterns failed");
            self.notify(Status::StorageWarning(e.to_string()));
        }
        result
    }

    /// Save the pattern bank as numbered record `slot`
    pub fn save_patterns_slot(&mut self, slot: u16) -> Result<PathBuf, StorageError> {
        let result = match &self.record_dir {
            Some(dir) => save_bank_slot(dir, slot, self.sequencer.patterns()),
            None => Err(StorageError::NoPath),
        };
        self.report_storage(result, "saving pattern record failed")
    }

    /// Replace the pattern bank with numbered record `slot`
    ///
    /// Only while the sequencer is stopped; the current bank stays otherwise.
    pub fn load_patterns_slot(&mut self, slot: u16) -> Result<(), StorageError> {
        let loaded = match &self.record_dir {
            Some(dir) => load_bank_slot(dir, slot),
            None => Err(StorageError::NoPath),
        };
        let applied = loaded.and_then(|patterns| {
            self.sequencer
                .replace_patterns(patterns)
                .map_err(|e| StorageError::Rejected(e.to_string()))
        });
        self.report_storage(applied, "loading pattern record failed")?;
        self.notify(Status::PatternsLoaded { slot });
        Ok(())
    }

    // ---- file player adjustments ----

    /// Transpose file notes; sounding file notes are silenced first
    pub fn set_transpose(&mut self, semitones: i8) -> i8 {
        if semitones.clamp(-crate::router::MAX_TRANSPOSE, crate::router::MAX_TRANSPOSE)
            != self.router.transpose()
        {
            let (offs, _) = self.router.flush_file_notes();
            self.send_now(&offs);
        }
        self.router.set_transpose(semitones)
    }

    pub fn set_velocity_offset(&mut self, offset: i8) {
        self.router.set_velocity_offset(offset);
    }

    /// Playback speed in percent; returns the clamped value
    pub fn set_speed(&mut self, percent: u16) -> u16 {
        let mut clamped = percent.clamp(
            crate::timing::MIN_SPEED_PERCENT,
            crate::timing::MAX_SPEED_PERCENT,
        );
        if let Some(cursor) = self.cursor.as_mut() {
            clamped = cursor.set_speed(clamped);
        }
        self.speed_percent = clamped;
        clamped
    }

    /// Synth master volume through universal SysEx; returns the value sent
    pub fn set_master_volume(&mut self, volume: u8) -> u8 {
        let volume = volume.min(127);
        self.master_volume = volume;
        let result = self.sink.send(&master_volume_sysex(volume));
        self.report_sink(result);
        tracing::debug!(volume, "master volume");
        volume
    }

    // ---- scheduler entry points ----

    /// Apply one control-surface command; returns false for `Quit`
    pub fn handle_command(&mut self, command: Command, now: u64) -> bool {
        match command {
            Command::Open(path) => {
                let _ = self.open(&path);
            }
            Command::Play => {
                if let Err(e) = self.play(now) {
                    tracing::warn!(error = %e, "play failed");
                    self.notify(Status::OpenFailed(e.to_string()));
                }
            }
            Command::Pause => self.pause(now),
            Command::Stop => self.stop(),
            Command::Seek(tick) => {
                if let Err(e) = self.seek(tick, now) {
                    tracing::warn!(error = %e, "seek failed");
                }
            }
            Command::SetChannel { channel, update } => {
                self.set_channel(channel, update);
            }
            Command::SaveSettings(None) => {
                let _ = self.save_settings();
            }
            Command::SaveSettings(Some(slot)) => {
                let _ = self.save_settings_slot(slot);
            }
            Command::LoadSettings(slot) => {
                let _ = self.load_settings_slot(slot);
            }
            Command::SavePatterns(None) => {
                let _ = self.save_patterns();
            }
            Command::SavePatterns(Some(slot)) => {
                let _ = self.save_patterns_slot(slot);
            }
            Command::LoadPatterns(slot) => {
                let _ = self.load_patterns_slot(slot);
            }
            Command::SequencerRecord => log_rejected(self.sequencer_record(now)),
            Command::SequencerPlay => log_rejected(self.sequencer_play(now)),
            Command::SequencerStop => log_rejected(self.sequencer_stop(now)),
            Command::PatternSelect(id) => log_rejected(self.pattern_select(id)),
            Command::SetTranspose(semitones) => {
                self.set_transpose(semitones);
            }
            Command::SetVelocityOffset(offset) => self.set_velocity_offset(offset),
            Command::SetSpeed(percent) => {
                self.set_speed(percent);
            }
            Command::SetMasterVolume(volume) => {
                self.set_master_volume(volume);
            }
            Command::Quit => return false,
        }
        true
    }

    /// One scheduler tick; returns the number of messages sent
    pub fn tick(&mut self, now: u64) -> usize {
        self.feed_file(now);
        self.feed_sequencer(now);

        let out = self.router.route(now);
        let sent = self.send_now(&out);

        if self.sequencer.state() == SequencerState::Recording {
            for (at, event) in self.router.take_live_tap() {
                self.sequencer.record_event(at, &event);
            }
        }
        for drop in self.router.take_drops() {
            self.notify(Status::DroppedEvent {
                source: drop.queue,
                total: drop.total,
            });
        }
        if self.end_reached {
            self.stop_with(StopReason::EndOfTrack);
        }
        sent
    }

    fn file_now(&self, now: u64) -> u64 {
        self.file_origin + now.saturating_sub(self.sched_origin)
    }

    fn to_scheduler_time(&self, file_micros: u64) -> u64 {
        self.sched_origin + file_micros.saturating_sub(self.file_origin)
    }

    fn feed_file(&mut self, now: u64) {
        if self.state != TransportState::Playing {
            return;
        }
        let file_now = self.file_now(now);
        let (sched_origin, file_origin) = (self.sched_origin, self.file_origin);
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };

        let decode_error = cursor.fill(file_now + self.lookahead_micros).err();
        while let Some((at, event)) = cursor.pop_due(file_now) {
            let at = sched_origin + at.saturating_sub(file_origin);
            let _ = self.router.push(EventSource::File, at, event);
        }
        self.end_reached = cursor.is_finished(file_now);

        if let Some(e) = decode_error {
            tracing::error!(error = %e, "file decoding failed, ending playback there");
            self.notify(Status::DecodeError(e.to_string()));
        }
    }

    fn feed_sequencer(&mut self, now: u64) {
        if self.sequencer.state() != SequencerState::Playing {
            return;
        }
        let ended = self.sequencer.poll(now, &mut self.seq_out);
        for (at, event) in self.seq_out.drain(..) {
            let _ = self.router.push(EventSource::Sequencer, at, event);
        }
        if ended {
            self.notify(Status::SequencerState(SequencerState::Stopped));
        }
    }

    fn send_now(&mut self, events: &[MidiEvent]) -> usize {
        let mut sent = 0;
        for event in events {
            let result = self.sink.send_event(event);
            if self.report_sink(result) {
                sent += 1;
            }
        }
        sent
    }

    fn report_sink(&mut self, result: Result<(), SinkError>) -> bool {
        match result {
            Ok(()) => {
                self.sink_failed = false;
                true
            }
            Err(e) => {
                // Report the first failure of a run, not every message
                if !self.sink_failed {
                    tracing::error!(error = %e, "MIDI OUT write failed");
                    self.notify(Status::OutputError(e.to_string()));
                }
                self.sink_failed = true;
                false
            }
        }
    }

    fn flush_notes(&mut self) {
        let (events, mask) = self.router.all_notes_off();
        if mask == 0 {
            return;
        }
        // Notes the sequencer holds were cut too
        self.sequencer.forget_channels(mask);
        self.send_now(&events);
        tracing::info!(channels = format_args!("{:#06x}", mask), "all notes off");
        self.notify(Status::StuckNoteRecovery { channels: mask });
    }

    /// When the scheduler should run next
    pub fn next_wakeup(&self) -> Option<u64> {
        let file = match (self.state, self.cursor.as_ref()) {
            (TransportState::Playing, Some(cursor)) => cursor
                .next_deadline()
                .map(|at| self.to_scheduler_time(at)),
            _ => None,
        };
        [
            self.router.next_deadline(),
            self.sequencer.next_boundary(),
            file,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Stop everything before the scheduler exits
    pub fn shutdown(&mut self) {
        if self.sequencer.state() != SequencerState::Stopped {
            if let Ok(offs) = self.sequencer.stop() {
                self.send_now(&offs);
            }
            self.router.set_live_tap(false);
        }
        self.stop();
    }

    // ---- accessors ----

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.name.as_str())
    }

    pub fn header(&self) -> Option<SmfHeader> {
        self.file.as_ref().map(|f| f.header)
    }

    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn speed(&self) -> u16 {
        self.speed_percent
    }

    pub fn master_volume(&self) -> u8 {
        self.master_volume
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn sequencer(&self) -> &SequencerEngine {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut SequencerEngine {
        &mut self.sequencer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

fn log_rejected(result: Result<(), SequencerError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "sequencer command rejected");
    }
}
