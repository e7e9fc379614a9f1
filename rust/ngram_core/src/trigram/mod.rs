//! Memory-mapped trigram index for approximate string matching.
//!
//! Strings are padded with a sentinel and cut into overlapping trigrams.
//! Each record keeps its trigram multiset; an inverted index maps every
//! trigram to the records containing it. Queries are ranked by weighted
//! Jaccard similarity over the candidates the inverted index returns.
//!
//! # Architecture
//!
//! - **extract**: Sentinel-padded trigram extraction over codepoints
//! - **multiset**: Trigram → count mapping for one string
//! - **posting**: Posting list operations using Roaring bitmaps
//! - **format**: Binary index format with CRC32 integrity checks
//! - **builder**: In-memory index construction
//! - **writer**: Serialize index to bytes and publish atomically
//! - **reader**: Validate and mmap an index file
//! - **matcher**: Candidate selection, scoring and ranking
//! - **error**: Error types

pub mod builder;
pub mod error;
pub mod extract;
pub mod format;
pub mod matcher;
pub mod multiset;
pub mod posting;
pub mod reader;
pub mod writer;

// Re-export key types for convenience.
pub use builder::IndexBuilder;
pub use error::{FormatError, NgramError, QueryError};
pub use extract::{extract, extract_with, Trigram, DEFAULT_SENTINEL};
pub use matcher::{score, Match, TrigramSource};
pub use multiset::TrigramMultiset;
pub use posting::PostingList;
pub use reader::IndexReader;
pub use writer::{build_index, persist_index, write_index, IndexStats};
