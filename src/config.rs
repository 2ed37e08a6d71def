// Station configuration - RON file with defaults for every field

use crate::router::QueueCapacities;
use crate::sequencer::MAX_PATTERN_STEPS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON serialization error: {0}")]
    RonWrite(#[from] ron::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Step sequencer defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub steps: usize,
    pub steps_per_quarter: u16,
    /// Grid tempo, independent of the file tempo
    pub bpm: f64,
    /// 9 = General MIDI drums
    pub channel: u8,
    pub looping: bool,
    pub pattern_slots: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            steps: 16,
            steps_per_quarter: 4,
            bpm: 120.0,
            channel: 9,
            looping: true,
            pattern_slots: 8,
        }
    }
}

/// Which system MIDI ports to open (substring of the port name)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiPortConfig {
    pub output: Option<String>,
    pub input: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Scheduler period in µs
    pub tick_micros: u64,
    /// How far ahead of its deadline a file event is queued, in µs
    pub lookahead_micros: u64,
    pub queues: QueueCapacities,
    pub live_ring_capacity: usize,
    pub command_ring_capacity: usize,
    pub notification_ring_capacity: usize,
    pub settings_path: Option<PathBuf>,
    pub pattern_bank_path: Option<PathBuf>,
    /// Directory of the numbered records (`MIDISET000.json`, `SEQSC000.json`)
    pub record_dir: Option<PathBuf>,
    /// Synth master volume sent at startup, 0-127
    pub master_volume: u8,
    pub ports: MidiPortConfig,
    pub sequencer: SequencerConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().map(|d| d.join("midistation"));
        Self {
            tick_micros: 1_000,
            lookahead_micros: 20_000,
            queues: QueueCapacities::default(),
            live_ring_capacity: 512,
            command_ring_capacity: 64,
            notification_ring_capacity: 256,
            settings_path: data_dir.as_ref().map(|d| d.join("midiset.json")),
            pattern_bank_path: data_dir.as_ref().map(|d| d.join("patterns.json")),
            record_dir: data_dir.map(|d| d.join("records")),
            master_volume: 127,
            ports: MidiPortConfig::default(),
            sequencer: SequencerConfig::default(),
        }
    }
}

impl StationConfig {
    /// `<config dir>/midistation/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("midistation").join("config.ron"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: StationConfig = ron::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.tick_micros == 0 {
            return invalid("tick_micros must be > 0");
        }
        if self.queues.live == 0 || self.queues.sequencer == 0 || self.queues.file == 0 {
            return invalid("queue capacities must be > 0");
        }
        if self.live_ring_capacity == 0
            || self.command_ring_capacity == 0
            || self.notification_ring_capacity == 0
        {
            return invalid("ring capacities must be > 0");
        }

        if self.master_volume > 127 {
            return invalid("master_volume must be within 0..=127");
        }

        let seq = &self.sequencer;
        if seq.steps == 0 || seq.steps > MAX_PATTERN_STEPS {
            return invalid("sequencer.steps must be within 1..=64");
        }
        if seq.steps_per_quarter == 0 {
            return invalid("sequencer.steps_per_quarter must be > 0");
        }
        if seq.channel > 15 {
            return invalid("sequencer.channel must be within 0..=15");
        }
        if !(20.0..=300.0).contains(&seq.bpm) {
            return invalid("sequencer.bpm must be within 20..=300");
        }
        if seq.pattern_slots == 0 {
            return invalid("sequencer.pattern_slots must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        let config = StationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_micros, 1_000);
        assert_eq!(config.queues.file, 512);
        assert_eq!(config.sequencer.channel, 9);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(tick_micros: 500, sequencer: (steps: 32))").unwrap();

        let config = StationConfig::load(&path).unwrap();
        assert_eq!(config.tick_micros, 500);
        assert_eq!(config.sequencer.steps, 32);
        assert_eq!(config.sequencer.steps_per_quarter, 4);
        assert_eq!(config.lookahead_micros, 20_000);
    }

    #[test]
    fn test_ron_roundtrip() {
        let config = StationConfig::default();
        let text = config.to_ron().unwrap();
        let parsed: StationConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = StationConfig::default();
        config.sequencer.steps = 65;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = StationConfig::default();
        config.sequencer.bpm = 10.0;
        assert!(config.validate().is_err());

        let mut config = StationConfig::default();
        config.queues.live = 0;
        assert!(config.validate().is_err());

        let mut config = StationConfig::default();
        config.sequencer.channel = 16;
        assert!(config.validate().is_err());

        let mut config = StationConfig::default();
        config.master_volume = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StationConfig::load_or_default(&dir.path().join("absent.ron")).unwrap();
        assert_eq!(config, StationConfig::default());
    }

    #[test]
    fn test_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.ron");
        std::fs::write(&path, "(tick_micros: \"fast\")").unwrap();
        assert!(matches!(StationConfig::load(&path), Err(ConfigError::Ron(_))));
    }
}
