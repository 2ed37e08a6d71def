// Standard MIDI File support (format 0 only)

pub mod decoder;

pub use decoder::{FormatError, SmfDecoder, SmfHeader, decode_all};
