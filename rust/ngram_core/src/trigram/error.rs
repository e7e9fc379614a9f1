//! Error types for the trigram index.
//!
//! Failures are split by cause so callers can tell an unreadable path apart
//! from a malformed file or a bad query without matching on message text.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error returned by every fallible engine operation.
#[derive(Debug, Error)]
pub enum NgramError {
    /// The index path could not be opened, read, created or published.
    #[error("index I/O error on {}: {source}", .path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// I/O error while streaming an index to a writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The index file is malformed. Never repaired, never partially served.
    #[error("malformed index: {0}")]
    Format(#[from] FormatError),
    /// The query itself is invalid.
    #[error("invalid query: {0}")]
    Query(#[from] QueryError),
    /// A count does not fit the on-disk integer width.
    #[error("{what} exceeds format limit of {limit}")]
    Capacity { what: &'static str, limit: u64 },
    /// A record without trigrams cannot be stored.
    #[error("record {id} has no trigrams")]
    EmptyRecord { id: u32 },
}

impl NgramError {
    /// Wrap an I/O error with the path it happened on.
    pub fn index(path: impl Into<PathBuf>, source: io::Error) -> Self {
        NgramError::Index {
            path: path.into(),
            source,
        }
    }
}

/// Structural problems found while validating or reading an index file.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    #[error("invalid magic bytes in index header")]
    BadMagic,
    #[error("unsupported format version: expected {expected}, found {found}")]
    UnsupportedVersion { expected: u32, found: u32 },
    #[error("header checksum mismatch")]
    HeaderChecksum,
    #[error("truncated {section}: need {expected} bytes, found {actual}")]
    Truncated {
        section: &'static str,
        expected: u64,
        actual: u64,
    },
    #[error("unexpected trailing data: declared length {expected}, file is {actual} bytes")]
    TrailingData { expected: u64, actual: u64 },
    #[error("{section} checksum mismatch (stored={stored:#010x}, computed={computed:#010x})")]
    SectionChecksum {
        section: &'static str,
        stored: u32,
        computed: u32,
    },
    #[error("invalid codepoint {value:#x}")]
    InvalidCodepoint { value: u32 },
    #[error("posting references record {id} but index holds {record_count} records")]
    PostingOutOfRange { id: u32, record_count: u32 },
    #[error("inconsistent index: {reason}")]
    Inconsistent { reason: String },
}

/// Caller errors in a search request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("threshold {0} is outside [0.0, 1.0]")]
    ThresholdOutOfRange(f64),
    #[error("record {id} does not exist (index holds {record_count} records)")]
    UnknownRecord { id: u32, record_count: u32 },
    #[error("query touches {candidates} candidates, above the limit of {limit}")]
    TooManyCandidates { candidates: u64, limit: usize },
}

pub type Result<T> = std::result::Result<T, NgramError>;
