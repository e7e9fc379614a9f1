//! Binary format constants and header for the n-gram index.
//!
//! Layout (all integers little-endian):
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Header (60 bytes)                           │
//! │  magic: [u8; 4] = "NGRM"                    │
//! │  version: u32 = 1                           │
//! │  flags: u32                                 │
//! │  sentinel: u32                              │
//! │  record_count: u32                          │
//! │  trigram_count: u32                         │
//! │  record_table_offset: u64                   │
//! │  trigram_table_offset: u64                  │
//! │  posting_offset: u64                        │
//! │  file_len: u64                              │
//! │  header_crc32: u32                          │
//! ├─────────────────────────────────────────────┤
//! │ Record Table                                │
//! │  (first_pair, pair_count) per record        │
//! │  (c1, c2, c3, count) pairs + section_crc32  │
//! ├─────────────────────────────────────────────┤
//! │ Trigram Table                               │
//! │  sorted trigram entries + section_crc32     │
//! ├─────────────────────────────────────────────┤
//! │ Posting Lists                               │
//! │  Roaring bitmap serialized + section_crc32  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! `file_len` doubles as the completion marker: a file cut short anywhere
//! disagrees with its own header.

use super::error::FormatError;
use super::extract::Trigram;

/// Magic bytes identifying an n-gram index file.
pub const MAGIC: [u8; 4] = *b"NGRM";

/// Current format version.
pub const VERSION: u32 = 1;

/// Header size in bytes (fixed).
pub const HEADER_SIZE: usize = 60;

/// Bytes covered by the header CRC.
const HEADER_CRC_SPAN: usize = 56;

/// Record entry: first_pair (u32) + pair_count (u32) = 8 bytes.
pub const RECORD_ENTRY_SIZE: usize = 8;

/// Record pair: trigram (3 × u32) + count (u32) = 16 bytes.
pub const PAIR_SIZE: usize = 16;

/// Trigram table entry: trigram (3 × u32) + posting_offset (u32) + posting_len (u32) = 20 bytes.
pub const TRIGRAM_ENTRY_SIZE: usize = 20;

/// Every section ends with a CRC32 of its body.
pub const SECTION_CRC_SIZE: usize = 4;

/// Index header parsed from bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u32,
    pub flags: u32,
    pub sentinel: u32,
    pub record_count: u32,
    pub trigram_count: u32,
    pub record_table_offset: u64,
    pub trigram_table_offset: u64,
    pub posting_offset: u64,
    pub file_len: u64,
}

impl IndexHeader {
    /// Serialize header to bytes. CRC32 over the first 56 bytes fills 56..60.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.flags.to_le_bytes());
        buf[12..16].copy_from_slice(&self.sentinel.to_le_bytes());
        buf[16..20].copy_from_slice(&self.record_count.to_le_bytes());
        buf[20..24].copy_from_slice(&self.trigram_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.record_table_offset.to_le_bytes());
        buf[32..40].copy_from_slice(&self.trigram_table_offset.to_le_bytes());
        buf[40..48].copy_from_slice(&self.posting_offset.to_le_bytes());
        buf[48..56].copy_from_slice(&self.file_len.to_le_bytes());
        let crc = crc32fast::hash(&buf[..HEADER_CRC_SPAN]);
        buf[56..60].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse and check a header: length, magic, version, then CRC.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        if data.len() < HEADER_SIZE {
            return Err(FormatError::Truncated {
                section: "header",
                expected: HEADER_SIZE as u64,
                actual: data.len() as u64,
            });
        }

        if data[0..4] != MAGIC {
            return Err(FormatError::BadMagic);
        }

        let version = read_u32(data, 4);
        if version != VERSION {
            return Err(FormatError::UnsupportedVersion {
                expected: VERSION,
                found: version,
            });
        }

        let stored_crc = read_u32(data, HEADER_CRC_SPAN);
        if stored_crc != crc32fast::hash(&data[..HEADER_CRC_SPAN]) {
            return Err(FormatError::HeaderChecksum);
        }

        Ok(IndexHeader {
            version,
            flags: read_u32(data, 8),
            sentinel: read_u32(data, 12),
            record_count: read_u32(data, 16),
            trigram_count: read_u32(data, 20),
            record_table_offset: read_u64(data, 24),
            trigram_table_offset: read_u64(data, 32),
            posting_offset: read_u64(data, 40),
            file_len: read_u64(data, 48),
        })
    }
}

/// Read a little-endian u32 at `offset`. Caller guarantees bounds.
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Read a little-endian u64 at `offset`. Caller guarantees bounds.
pub(crate) fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Append a trigram as three little-endian codepoints.
pub(crate) fn put_trigram(out: &mut Vec<u8>, trigram: &Trigram) {
    for c in trigram {
        out.extend_from_slice(&u32::from(*c).to_le_bytes());
    }
}

/// Raw codepoints of the trigram at `offset`, for ordering comparisons.
pub(crate) fn read_raw_trigram(data: &[u8], offset: usize) -> [u32; 3] {
    [
        read_u32(data, offset),
        read_u32(data, offset + 4),
        read_u32(data, offset + 8),
    ]
}

/// Decode a stored codepoint.
pub(crate) fn decode_char(value: u32) -> Result<char, FormatError> {
    char::from_u32(value).ok_or(FormatError::InvalidCodepoint { value })
}

/// Decode the trigram at `offset`.
pub(crate) fn read_trigram(data: &[u8], offset: usize) -> Result<Trigram, FormatError> {
    let [a, b, c] = read_raw_trigram(data, offset);
    Ok([decode_char(a)?, decode_char(b)?, decode_char(c)?])
}

/// Trigram as raw codepoints; `char` order equals codepoint order.
pub(crate) fn raw_trigram(trigram: &Trigram) -> [u32; 3] {
    [
        u32::from(trigram[0]),
        u32::from(trigram[1]),
        u32::from(trigram[2]),
    ]
}
