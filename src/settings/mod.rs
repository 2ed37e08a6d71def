// Settings - per-channel state and its persistence

pub mod persistence;
pub mod store;
pub mod types;

pub use persistence::{MAX_SLOT, SettingsRecord, StorageError, slot_path, write_atomic};
pub use store::{ChannelStateStore, SharedChannelState};
pub use types::{CHANNEL_COUNT, ChannelSetting, ChannelUpdate, default_channels};
