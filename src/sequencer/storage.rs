// Pattern bank persistence - JSON file, written with the same atomic replace
// as the channel settings

use crate::sequencer::pattern::Pattern;
use crate::settings::persistence::{StorageError, slot_path, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const BANK_VERSION: u32 = 1;
/// File name prefix of numbered pattern bank records
pub const BANK_SLOT_PREFIX: &str = "SEQSC";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternBank {
    pub version: u32,
    pub patterns: Vec<Pattern>,
}

/// `slots` blank patterns with ids 0..slots
pub fn blank_bank(
    slots: usize,
    steps: usize,
    channel: u8,
    looping: bool,
) -> Result<Vec<Pattern>, crate::sequencer::SequencerError> {
    (0..slots.max(1))
        .map(|slot| {
            let mut pattern = Pattern::new(
                slot as u32,
                format!("Pattern {}", slot + 1),
                steps,
                channel,
            )?;
            pattern.looping = looping;
            Ok(pattern)
        })
        .collect()
}

pub fn load_bank(path: &Path) -> Result<Vec<Pattern>, StorageError> {
    let json = std::fs::read_to_string(path)?;
    let bank: PatternBank = serde_json::from_str(&json)?;
    if bank.version > BANK_VERSION {
        return Err(StorageError::UnsupportedVersion(bank.version));
    }
    if bank.patterns.is_empty() {
        return Err(StorageError::Invalid("pattern bank is empty".to_string()));
    }

    let mut ids = HashSet::new();
    for pattern in &bank.patterns {
        pattern
            .validate()
            .map_err(|e| StorageError::Invalid(format!("pattern {}: {}", pattern.id, e)))?;
        if !ids.insert(pattern.id) {
            return Err(StorageError::Invalid(format!(
                "duplicate pattern id {}",
                pattern.id
            )));
        }
    }

    tracing::info!(path = %path.display(), patterns = bank.patterns.len(), "pattern bank loaded");
    Ok(bank.patterns)
}

pub fn save_bank(path: &Path, patterns: &[Pattern]) -> Result<(), StorageError> {
    let bank = PatternBank {
        version: BANK_VERSION,
        patterns: patterns.to_vec(),
    };
    let json = serde_json::to_string_pretty(&bank)?;
    write_atomic(path, json.as_bytes())?;
    tracing::info!(path = %path.display(), "pattern bank saved");
    Ok(())
}

pub fn load_bank_slot(dir: &Path, slot: u16) -> Result<Vec<Pattern>, StorageError> {
    load_bank(&slot_path(dir, BANK_SLOT_PREFIX, slot)?)
}

pub fn save_bank_slot(dir: &Path, slot: u16, patterns: &[Pattern]) -> Result<PathBuf, StorageError> {
    let path = slot_path(dir, BANK_SLOT_PREFIX, slot)?;
    save_bank(&path, patterns)?;
    Ok(path)
}
