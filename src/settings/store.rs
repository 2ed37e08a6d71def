// Channel state store - the single owner of per-channel settings

use crate::midi::event::{CC_CHORUS, CC_REVERB, CC_VOLUME, EventKind, MidiEvent};
use crate::settings::persistence::{self, SETTINGS_SLOT_PREFIX, StorageError};
use crate::settings::types::{CHANNEL_COUNT, ChannelSetting, ChannelUpdate, default_channels};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Store shared between the scheduler thread and control surfaces.
/// Every mutation goes through the mutex, so no reader sees half an update.
pub type SharedChannelState = Arc<Mutex<ChannelStateStore>>;

/// Settings for all 16 channels, optionally backed by a file
#[derive(Debug, Clone)]
pub struct ChannelStateStore {
    channels: [ChannelSetting; CHANNEL_COUNT],
    path: Option<PathBuf>,
    snapshot: Option<[ChannelSetting; CHANNEL_COUNT]>,
}

impl ChannelStateStore {
    /// In-memory store with default settings
    pub fn new() -> Self {
        Self {
            channels: default_channels(),
            path: None,
            snapshot: None,
        }
    }

    /// Store bound to a settings file; call [`load`](Self::load) to read it
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new()
        }
    }

    pub fn into_shared(self) -> SharedChannelState {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the settings file
    ///
    /// A missing file is a first start and yields defaults. Any other failure
    /// also leaves defaults in memory, and the error is returned so the caller
    /// can surface it as a warning.
    pub fn load(&mut self) -> Result<&[ChannelSetting; CHANNEL_COUNT], StorageError> {
        let Some(path) = self.path.clone() else {
            return Ok(&self.channels);
        };

        match persistence::read_settings(&path) {
            Ok(channels) => {
                self.channels = channels;
                tracing::info!(path = %path.display(), "channel settings loaded");
                Ok(&self.channels)
            }
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                self.channels = default_channels();
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                Ok(&self.channels)
            }
            Err(e) => {
                self.channels = default_channels();
                tracing::warn!(path = %path.display(), error = %e, "settings unreadable, using defaults");
                Err(e)
            }
        }
    }

    /// Write all 16 channels to the bound file
    pub fn save(&self) -> Result<(), StorageError> {
        let path = self.path.as_deref().ok_or(StorageError::NoPath)?;
        self.save_to(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), StorageError> {
        persistence::write_settings(path, &self.channels)?;
        tracing::info!(path = %path.display(), "channel settings saved");
        Ok(())
    }

    /// Write the current settings to numbered record `slot` in `dir`
    pub fn save_slot(&self, dir: &Path, slot: u16) -> Result<PathBuf, StorageError> {
        let path = persistence::slot_path(dir, SETTINGS_SLOT_PREFIX, slot)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Switch to numbered record `slot` in `dir`
    ///
    /// Unlike [`load`](Self::load), a failure keeps the current settings.
    pub fn load_slot(
        &mut self,
        dir: &Path,
        slot: u16,
    ) -> Result<&[ChannelSetting; CHANNEL_COUNT], StorageError> {
        let path = persistence::slot_path(dir, SETTINGS_SLOT_PREFIX, slot)?;
        let channels = persistence::read_settings(&path)?;
        self.replace_all(channels);
        tracing::info!(path = %path.display(), slot, "channel settings record loaded");
        Ok(&self.channels)
    }

    /// Track a routed event; returns the updated setting when it changed
    /// anything (program change, volume, reverb or chorus)
    pub fn apply(&mut self, event: &MidiEvent) -> Option<ChannelSetting> {
        let channel = event.channel? as usize;
        let setting = &mut self.channels[channel];
        match event.kind {
            EventKind::ProgramChange => setting.program = event.data1(),
            EventKind::ControlChange => match event.data1() {
                CC_VOLUME => setting.volume = event.data2(),
                CC_REVERB => setting.reverb = event.data2(),
                CC_CHORUS => setting.chorus = event.data2(),
                _ => return None,
            },
            _ => return None,
        }
        Some(*setting)
    }

    /// User edit of one field; `None` for a channel outside 0-15
    ///
    /// A pending snapshot gets the edit too, so restoring after playback
    /// only undoes what the file changed.
    pub fn update(&mut self, channel: u8, update: ChannelUpdate) -> Option<ChannelSetting> {
        let setting = self.channels.get_mut(channel as usize)?;
        update.apply_to(setting);
        let updated = *setting;
        if let Some(snapshot) = self.snapshot.as_mut() {
            update.apply_to(&mut snapshot[channel as usize]);
        }
        Some(updated)
    }

    pub fn get(&self, channel: u8) -> Option<&ChannelSetting> {
        self.channels.get(channel as usize)
    }

    pub fn channels(&self) -> &[ChannelSetting; CHANNEL_COUNT] {
        &self.channels
    }

    /// Replace every channel; a pending snapshot takes the new values too
    pub fn replace_all(&mut self, channels: [ChannelSetting; CHANNEL_COUNT]) {
        self.channels = channels;
        if let Some(snapshot) = self.snapshot.as_mut() {
            *snapshot = channels;
        }
    }

    pub fn is_muted(&self, channel: u8) -> bool {
        self.get(channel).is_some_and(|s| s.mute)
    }

    pub fn program_override(&self, channel: u8) -> Option<u8> {
        self.get(channel).and_then(|s| s.program_override)
    }

    /// Remember the current settings so they can be restored later
    pub fn take_snapshot(&mut self) {
        self.snapshot = Some(self.channels);
    }

    /// Revert to the last snapshot
    ///
    /// Returns the restored settings of the channels that had changed, or
    /// `None` when no snapshot was taken.
    pub fn restore_snapshot(&mut self) -> Option<Vec<ChannelSetting>> {
        let snapshot = self.snapshot.take()?;
        let changed = snapshot
            .iter()
            .zip(self.channels.iter())
            .filter(|(saved, current)| saved != current)
            .map(|(saved, _)| *saved)
            .collect();
        self.channels = snapshot;
        Some(changed)
    }
}

impl Default for ChannelStateStore {
    fn default() -> Self {
        Self::new()
    }
}
