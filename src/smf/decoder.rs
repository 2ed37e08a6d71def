// SMF decoder - Standard MIDI File, format 0
// Validates the MThd header, reads the single MTrk chunk ahead of playback and
// decodes it lazily into timed events.

use crate::midi::event::{META_END_OF_TRACK, META_TEMPO, MidiEvent, STATUS_META, channel_data_len};
use std::io::Read;

const HEADER_ID: &[u8; 4] = b"MThd";
const TRACK_ID: &[u8; 4] = b"MTrk";

/// Malformed or unsupported file
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("missing MThd header chunk")]
    MissingHeader,

    #[error("header chunk length {0} is shorter than 6 bytes")]
    BadHeaderLength(u32),

    #[error("unsupported SMF format {0} (only format 0 is supported)")]
    UnsupportedFormat(u16),

    #[error("format 0 file must declare exactly one track, found {0}")]
    BadTrackCount(u16),

    #[error("unsupported time division {0:#06x}")]
    BadDivision(u16),

    #[error("no MTrk chunk found")]
    MissingTrack,

    #[error("chunk declares {declared} bytes but only {available} remain")]
    ChunkOverrun { declared: u32, available: usize },

    #[error("stream ended inside a variable-length quantity at offset {0}")]
    TruncatedVarLen(usize),

    #[error("variable-length quantity longer than 4 bytes at offset {0}")]
    VarLenOverflow(usize),

    #[error("stream ended inside an event at offset {0}")]
    TruncatedEvent(usize),

    #[error("data byte without running status at offset {0}")]
    MissingRunningStatus(usize),

    #[error("status byte {status:#04x} not allowed in a track at offset {offset}")]
    UnexpectedStatus { status: u8, offset: usize },

    #[error("data byte with the high bit set at offset {0}")]
    InvalidDataByte(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validated header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmfHeader {
    pub format: u16,
    pub tracks: u16,
    pub ticks_per_quarter: u16,
}

/// Read exactly `buf.len()` bytes, mapping a short read to `short`
fn read_or<R: Read>(reader: &mut R, buf: &mut [u8], short: FormatError) -> Result<(), FormatError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(short),
        Err(e) => Err(FormatError::Io(e)),
    }
}

/// Read up to `len` bytes; fails if the stream holds fewer
fn read_chunk<R: Read>(reader: &mut R, len: u32) -> Result<Vec<u8>, FormatError> {
    let mut body = Vec::with_capacity(len.min(1 << 20) as usize);
    reader.take(len as u64).read_to_end(&mut body)?;
    if body.len() < len as usize {
        return Err(FormatError::ChunkOverrun {
            declared: len,
            available: body.len(),
        });
    }
    Ok(body)
}

/// Parse and validate the header chunk
fn read_header<R: Read>(reader: &mut R) -> Result<SmfHeader, FormatError> {
    let mut id = [0u8; 4];
    read_or(reader, &mut id, FormatError::MissingHeader)?;
    if &id != HEADER_ID {
        return Err(FormatError::MissingHeader);
    }

    let mut len = [0u8; 4];
    read_or(reader, &mut len, FormatError::MissingHeader)?;
    let len = u32::from_be_bytes(len);
    if len < 6 {
        return Err(FormatError::BadHeaderLength(len));
    }

    let body = read_chunk(reader, len)?;
    let format = u16::from_be_bytes([body[0], body[1]]);
    let tracks = u16::from_be_bytes([body[2], body[3]]);
    let division = u16::from_be_bytes([body[4], body[5]]);

    if format != 0 {
        return Err(FormatError::UnsupportedFormat(format));
    }
    if tracks != 1 {
        return Err(FormatError::BadTrackCount(tracks));
    }
    // High bit set = SMPTE timecode division, zero = meaningless
    if division & 0x8000 != 0 || division == 0 {
        return Err(FormatError::BadDivision(division));
    }

    Ok(SmfHeader {
        format,
        tracks,
        ticks_per_quarter: division,
    })
}

/// Single-pass event decoder over one format-0 track
///
/// The track body is read into memory when the decoder is created, so
/// iterating never touches storage. Iteration stops after the end-of-track
/// meta event or the first error.
#[derive(Debug)]
pub struct SmfDecoder {
    header: SmfHeader,
    track: Vec<u8>,
    pos: usize,
    running_status: Option<u8>,
    finished: bool,
}

impl SmfDecoder {
    /// Validate the header and read the track chunk
    ///
    /// Unknown chunks between the header and the track are skipped.
    pub fn new<R: Read>(mut reader: R) -> Result<Self, FormatError> {
        let header = read_header(&mut reader)?;

        loop {
            let mut id = [0u8; 4];
            read_or(&mut reader, &mut id, FormatError::MissingTrack)?;
            let mut len = [0u8; 4];
            read_or(&mut reader, &mut len, FormatError::MissingTrack)?;
            let len = u32::from_be_bytes(len);

            let body = read_chunk(&mut reader, len)?;
            if &id == TRACK_ID {
                return Ok(Self {
                    header,
                    track: body,
                    pos: 0,
                    running_status: None,
                    finished: false,
                });
            }
            tracing::debug!(chunk = ?String::from_utf8_lossy(&id), len, "skipping unknown chunk");
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        Self::new(bytes)
    }

    pub fn header(&self) -> SmfHeader {
        self.header
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.header.ticks_per_quarter
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.track.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    /// Variable-length quantity: 7 bits per byte, high bit = continuation
    fn var_len(&mut self) -> Result<u32, FormatError> {
        let start = self.pos;
        let mut value: u32 = 0;
        for _ in 0..4 {
            let b = self.byte().ok_or(FormatError::TruncatedVarLen(start))?;
            value = (value << 7) | (b & 0x7F) as u32;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(FormatError::VarLenOverflow(start))
    }

    fn skip(&mut self, len: usize) -> Result<(), FormatError> {
        if self.track.len() - self.pos < len {
            return Err(FormatError::TruncatedEvent(self.pos));
        }
        self.pos += len;
        Ok(())
    }

    fn decode_next(&mut self) -> Result<MidiEvent, FormatError> {
        let delta = self.var_len()?;
        let offset = self.pos;
        let first = self.byte().ok_or(FormatError::TruncatedEvent(offset))?;

        let event = match first {
            STATUS_META => {
                // Meta and SysEx events cancel running status
                self.running_status = None;
                let meta_type = self.byte().ok_or(FormatError::TruncatedEvent(offset))?;
                let len = self.var_len()? as usize;
                let data_start = self.pos;
                self.skip(len)?;
                let data = &self.track[data_start..data_start + len];
                match meta_type {
                    META_TEMPO if len == 3 => {
                        let micros = u32::from_be_bytes([0, data[0], data[1], data[2]]);
                        MidiEvent::tempo(micros)
                    }
                    META_END_OF_TRACK => MidiEvent::end_of_track(),
                    other => MidiEvent::other_meta(other),
                }
            }
            0xF0 | 0xF7 => {
                self.running_status = None;
                let len = self.var_len()? as usize;
                self.skip(len)?;
                MidiEvent::sysex(first)
            }
            // System common and real-time bytes have no place in a file track
            0xF1..=0xFE => {
                return Err(FormatError::UnexpectedStatus {
                    status: first,
                    offset,
                });
            }
            status if status & 0x80 != 0 => {
                self.running_status = Some(status);
                self.channel_event(status, offset)?
            }
            _ => {
                // Running status: `first` is already the first data byte
                let status = self
                    .running_status
                    .ok_or(FormatError::MissingRunningStatus(offset))?;
                self.pos -= 1;
                self.channel_event(status, offset)?
            }
        };

        Ok(event.with_delta(delta))
    }

    fn data_byte(&mut self, offset: usize) -> Result<u8, FormatError> {
        let at = self.pos;
        let b = self.byte().ok_or(FormatError::TruncatedEvent(offset))?;
        if b & 0x80 != 0 {
            return Err(FormatError::InvalidDataByte(at));
        }
        Ok(b)
    }

    fn channel_event(&mut self, status: u8, offset: usize) -> Result<MidiEvent, FormatError> {
        let data1 = self.data_byte(offset)?;
        let data2 = if channel_data_len(status) == 2 {
            self.data_byte(offset)?
        } else {
            0
        };
        Ok(MidiEvent::channel_message(status, data1, data2))
    }
}

impl Iterator for SmfDecoder {
    type Item = Result<MidiEvent, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.pos >= self.track.len() {
            self.finished = true;
            return None;
        }
        let result = self.decode_next();
        match &result {
            Ok(event) if event.kind == crate::midi::EventKind::EndOfTrack => self.finished = true,
            Err(_) => self.finished = true,
            Ok(_) => {}
        }
        Some(result)
    }
}

/// Decode a whole file into memory
pub fn decode_all(bytes: &[u8]) -> Result<(SmfHeader, Vec<MidiEvent>), FormatError> {
    let decoder = SmfDecoder::from_bytes(bytes)?;
    let header = decoder.header();
    let events = decoder.collect::<Result<Vec<_>, _>>()?;
    Ok((header, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::EventKind;

    fn file(format: u16, tracks: u16, division: u16, track: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"MThd");
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&format.to_be_bytes());
        bytes.extend_from_slice(&tracks.to_be_bytes());
        bytes.extend_from_slice(&division.to_be_bytes());
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(track);
        bytes
    }

    #[test]
    fn test_decode_simple_track() {
        let track = [
            0x00, 0xC0, 0x05, // program change ch0 -> 5
            0x83, 0x60, 0x90, 60, 100, // delta 480, note on
            0x00, 0xFF, 0x2F, 0x00, // end of track
        ];
        let (header, events) = decode_all(&file(0, 1, 480, &track)).unwrap();
        assert_eq!(header.ticks_per_quarter, 480);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::ProgramChange);
        assert_eq!(events[1].delta_ticks, 480);
        assert_eq!(events[1].data(), &[60, 100]);
        assert_eq!(events[2].kind, EventKind::EndOfTrack);
    }

    #[test]
    fn test_running_status() {
        let track = [
            0x00, 0x91, 60, 100, //
            0x10, 62, 90, // running status
            0x10, 60, 0, // running status, note on vel 0
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let (_, events) = decode_all(&file(0, 1, 96, &track)).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].channel, Some(1));
        assert_eq!(events[1].pitch(), Some(62));
        assert_eq!(events[1].delta_ticks, 0x10);
        assert!(events[2].is_note_off());
    }

    #[test]
    fn test_tempo_meta_surfaces() {
        let track = [
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 500000
            0x00, 0xFF, 0x03, 0x02, b'h', b'i', // track name
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let (_, events) = decode_all(&file(0, 1, 480, &track)).unwrap();
        assert_eq!(events[0].tempo_micros(), Some(500_000));
        assert_eq!(events[1].kind, EventKind::Other);
        assert_eq!(events[1].data(), &[0x03]);
    }

    #[test]
    fn test_meta_cancels_running_status() {
        let track = [
            0x00, 0x90, 60, 100, //
            0x00, 0xFF, 0x01, 0x00, // text meta
            0x00, 60, 0, // data byte with no status
        ];
        let mut decoder = SmfDecoder::from_bytes(&file(0, 1, 480, &track)).unwrap();
        assert!(decoder.next().unwrap().is_ok());
        assert!(decoder.next().unwrap().is_ok());
        assert!(matches!(
            decoder.next().unwrap(),
            Err(FormatError::MissingRunningStatus(_))
        ));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_rejects_format_one() {
        let err = SmfDecoder::from_bytes(&file(1, 1, 480, &[0x00, 0xFF, 0x2F, 0x00])).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedFormat(1)));
    }

    #[test]
    fn test_rejects_bad_chunk_id() {
        let mut bytes = file(0, 1, 480, &[0x00, 0xFF, 0x2F, 0x00]);
        bytes[0] = b'X';
        assert!(matches!(
            SmfDecoder::from_bytes(&bytes),
            Err(FormatError::MissingHeader)
        ));
    }

    #[test]
    fn test_rejects_smpte_division() {
        let err = SmfDecoder::from_bytes(&file(0, 1, 0xE728, &[])).unwrap_err();
        assert!(matches!(err, FormatError::BadDivision(_)));
    }

    #[test]
    fn test_rejects_track_overrun() {
        let mut bytes = file(0, 1, 480, &[0x00, 0xFF, 0x2F, 0x00]);
        let len_at = 14 + 4;
        bytes[len_at..len_at + 4].copy_from_slice(&100u32.to_be_bytes());
        let err = SmfDecoder::from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            FormatError::ChunkOverrun {
                declared: 100,
                available: 4
            }
        ));
    }

    #[test]
    fn test_rejects_truncated_var_len() {
        let track = [0x00, 0x90, 60, 100, 0x81, 0x80];
        let mut decoder = SmfDecoder::from_bytes(&file(0, 1, 480, &track)).unwrap();
        assert!(decoder.next().unwrap().is_ok());
        assert!(matches!(
            decoder.next().unwrap(),
            Err(FormatError::TruncatedVarLen(4))
        ));
    }

    #[test]
    fn test_skips_unknown_chunk() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"MThd");
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 1, 0x01, 0xE0]);
        bytes.extend_from_slice(b"XFIH");
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[1, 2]);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        let (header, events) = decode_all(&bytes).unwrap();
        assert_eq!(header.ticks_per_quarter, 480);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_rejects_realtime_status_in_track() {
        let track = [
            0x00, 0x90, 0x3C, 0x64, //
            0x00, 0xF8, 0x3E, 0x64, // timing clock is not a file event
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let mut decoder = SmfDecoder::from_bytes(&file(0, 1, 480, &track)).unwrap();
        assert!(decoder.next().unwrap().is_ok());
        assert!(matches!(
            decoder.next().unwrap(),
            Err(FormatError::UnexpectedStatus {
                status: 0xF8,
                offset: 5
            })
        ));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_rejects_system_common_status() {
        for status in [0xF1u8, 0xF2, 0xF3, 0xF6, 0xFE] {
            let track = [0x00, status, 0x01, 0x02, 0x00, 0xFF, 0x2F, 0x00];
            let err = decode_all(&file(0, 1, 480, &track)).unwrap_err();
            assert!(matches!(err, FormatError::UnexpectedStatus { status: s, .. } if s == status));
        }
    }

    #[test]
    fn test_rejects_high_bit_data_byte() {
        let track = [0x00, 0x90, 0x3C, 0x90];
        let mut decoder = SmfDecoder::from_bytes(&file(0, 1, 480, &track)).unwrap();
        assert!(matches!(
            decoder.next().unwrap(),
            Err(FormatError::InvalidDataByte(3))
        ));

        // Same check under running status
        let track = [0x00, 0x90, 60, 100, 0x00, 62, 0xC8];
        let err = decode_all(&file(0, 1, 480, &track)).unwrap_err();
        assert!(matches!(err, FormatError::InvalidDataByte(6)));
    }

    #[test]
    fn test_sysex_is_surfaced_as_other() {
        let track = [
            0x00, 0xF0, 0x03, 0x43, 0x12, 0xF7, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let (_, events) = decode_all(&file(0, 1, 480, &track)).unwrap();
        assert_eq!(events[0].kind, EventKind::Other);
        assert_eq!(events[0].status, 0xF0);
        assert!(events[0].to_wire().is_none());
    }
}
