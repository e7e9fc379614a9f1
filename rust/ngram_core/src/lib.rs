//! `ngram_core`: trigram index files and approximate string matching.
//!
//! Callers hand in already-normalized strings and get back integer record ids
//! ranked by weighted Jaccard similarity of their trigram multisets.
//!
//! Modules:
//! - `trigram`: extraction, index build/write, mmap reader, matcher
//! - `config`: search, reader and build options (JSON via serde)
//! - `normalize`: lowercase + NFC helper for front ends
//! - `python`: PyO3 bindings (`python` feature)

use std::path::Path;

pub mod config;
pub mod normalize;
#[cfg(feature = "python")]
pub mod python;
pub mod trigram;

pub use config::{EngineConfig, ReaderOptions, SearchOptions, ThresholdPolicy, DEFAULT_THRESHOLD};
pub use trigram::error::{FormatError, NgramError, QueryError, Result};
pub use trigram::matcher::Match;
pub use trigram::reader::IndexReader;

/// Open and validate an index file.
pub fn open_index(path: &Path) -> Result<IndexReader> {
    IndexReader::open(path)
}

/// Rank the records of `index` against an already-normalized `query`.
///
/// Out-of-range thresholds are clamped into `[0.0, 1.0]`.
pub fn search(index: &IndexReader, query: &str, threshold: f64) -> Result<Vec<Match>> {
    index.search(query, &SearchOptions::with_threshold(threshold))
}
