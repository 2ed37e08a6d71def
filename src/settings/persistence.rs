// Settings persistence - JSON record and atomic file replacement

use crate::settings::types::{CHANNEL_COUNT, ChannelSetting, default_channels};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SETTINGS_VERSION: u32 = 1;

/// Numbered records run from 000 to 999
pub const MAX_SLOT: u16 = 999;
/// File name prefix of numbered channel settings records
pub const SETTINGS_SLOT_PREFIX: &str = "MIDISET";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid settings record: {0}")]
    Invalid(String),

    #[error("Unsupported settings version {0}")]
    UnsupportedVersion(u32),

    #[error("Atomic replace failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("No storage path configured")]
    NoPath,

    #[error("Record slot {0} outside 0..=999")]
    InvalidSlot(u16),

    #[error("Record not applied: {0}")]
    Rejected(String),
}

/// On-disk form of the 16 channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub version: u32,
    pub channels: Vec<ChannelSetting>,
}

impl SettingsRecord {
    pub fn from_channels(channels: &[ChannelSetting; CHANNEL_COUNT]) -> Self {
        Self {
            version: SETTINGS_VERSION,
            channels: channels.to_vec(),
        }
    }

    /// Expand into a full channel table, defaults for absent channels
    pub fn into_channels(self) -> Result<[ChannelSetting; CHANNEL_COUNT], StorageError> {
        if self.version > SETTINGS_VERSION {
            return Err(StorageError::UnsupportedVersion(self.version));
        }
        let mut channels = default_channels();
        for setting in self.channels {
            if let Some(field) = setting.invalid_field() {
                return Err(StorageError::Invalid(format!(
                    "channel {}: {} out of range",
                    setting.channel, field
                )));
            }
            channels[setting.channel as usize] = setting;
        }
        Ok(channels)
    }
}

/// `<dir>/<prefix><nnn>.json` for numbered record `slot`
pub fn slot_path(dir: &Path, prefix: &str, slot: u16) -> Result<PathBuf, StorageError> {
    if slot > MAX_SLOT {
        return Err(StorageError::InvalidSlot(slot));
    }
    Ok(dir.join(format!("{}{:03}.json", prefix, slot)))
}

/// Replace `path` with `contents` so readers see either the old or the new file
///
/// Writes into a temporary file in the same directory, syncs it, then renames
/// it over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

/// Read a channel table from a JSON settings file
pub fn read_settings(path: &Path) -> Result<[ChannelSetting; CHANNEL_COUNT], StorageError> {
    let json = std::fs::read_to_string(path)?;
    let record: SettingsRecord = serde_json::from_str(&json)?;
    record.into_channels()
}

/// Write all 16 channels to a JSON settings file atomically
pub fn write_settings(
    path: &Path,
    channels: &[ChannelSetting; CHANNEL_COUNT],
) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(&SettingsRecord::from_channels(channels))?;
    write_atomic(path, json.as_bytes())
}
