//! Index builder: accumulates records and their trigram multisets.

use ahash::AHashMap;
use roaring::RoaringBitmap;

use super::error::{NgramError, QueryError, Result};
use super::extract::{Trigram, DEFAULT_SENTINEL};
use super::matcher::TrigramSource;
use super::multiset::TrigramMultiset;
use super::posting::PostingList;

/// Id for the record appended after `len` records.
///
/// `u32::MAX` itself is never assigned, so the record count fits a u32.
fn next_record_id(len: usize) -> Result<u32> {
    match u32::try_from(len) {
        Ok(id) if id < u32::MAX => Ok(id),
        _ => Err(NgramError::Capacity {
            what: "record count",
            limit: u64::from(u32::MAX),
        }),
    }
}

/// Builder for constructing an n-gram index in memory.
///
/// Records get sequential ids in insertion order. Serialize with
/// `writer::write_index()` or publish with `writer::persist_index()`.
#[derive(Debug)]
pub struct IndexBuilder {
    sentinel: char,
    /// Record multisets, indexed by record id.
    records: Vec<TrigramMultiset>,
    /// Trigram → set of record ids containing this trigram.
    posting_lists: AHashMap<Trigram, RoaringBitmap>,
}

impl IndexBuilder {
    /// Create a new empty builder padding with [`DEFAULT_SENTINEL`].
    pub fn new() -> Self {
        Self::with_sentinel(DEFAULT_SENTINEL)
    }

    /// Create a new empty builder padding with `sentinel`.
    pub fn with_sentinel(sentinel: char) -> Self {
        IndexBuilder {
            sentinel,
            records: Vec::new(),
            posting_lists: AHashMap::new(),
        }
    }

    /// Add an already-normalized string. Returns its record id.
    pub fn add(&mut self, text: &str) -> Result<u32> {
        let multiset = TrigramMultiset::from_text_with(text, self.sentinel);
        self.add_multiset(multiset)
    }

    /// Add a precomputed multiset. Returns its record id.
    ///
    /// The multiset must have been extracted with this builder's sentinel and
    /// must not be empty.
    pub fn add_multiset(&mut self, multiset: TrigramMultiset) -> Result<u32> {
        let record_id = next_record_id(self.records.len())?;
        if multiset.is_empty() {
            return Err(NgramError::EmptyRecord { id: record_id });
        }

        for trigram in multiset.trigrams() {
            self.posting_lists
                .entry(*trigram)
                .or_default()
                .insert(record_id);
        }
        self.records.push(multiset);
        Ok(record_id)
    }

    /// Add every string of `texts`, in order.
    pub fn extend<I, S>(&mut self, texts: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for text in texts {
            self.add(text.as_ref())?;
        }
        Ok(())
    }

    /// Padding sentinel used for every record.
    pub fn sentinel(&self) -> char {
        self.sentinel
    }

    /// Number of records in the index.
    pub fn record_count(&self) -> u32 {
        // `next_record_id` keeps the length at or below u32::MAX.
        self.records.len() as u32
    }

    /// Number of unique trigrams in the index.
    pub fn trigram_count(&self) -> usize {
        self.posting_lists.len()
    }

    /// Record multisets in id order.
    pub fn records(&self) -> &[TrigramMultiset] {
        &self.records
    }

    /// Multiset of one record.
    pub fn record(&self, record_id: u32) -> Result<&TrigramMultiset> {
        self.records.get(record_id as usize).ok_or_else(|| {
            QueryError::UnknownRecord {
                id: record_id,
                record_count: self.record_count(),
            }
            .into()
        })
    }

    /// Posting list for one trigram, if any record contains it.
    pub fn posting_list(&self, trigram: &Trigram) -> Option<&RoaringBitmap> {
        self.posting_lists.get(trigram)
    }

    /// Get the posting lists (for serialization).
    /// Returns entries sorted by trigram for binary search.
    pub fn sorted_posting_lists(&self) -> Vec<(Trigram, &RoaringBitmap)> {
        let mut entries: Vec<(Trigram, &RoaringBitmap)> =
            self.posting_lists.iter().map(|(k, v)| (*k, v)).collect();
        entries.sort_unstable_by_key(|(trigram, _)| *trigram);
        entries
    }

    #[cfg(test)]
    pub(crate) fn posting_lists_mut(&mut self) -> &mut AHashMap<Trigram, RoaringBitmap> {
        &mut self.posting_lists
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Search an index before it is written.
impl TrigramSource for IndexBuilder {
    fn record_count(&self) -> u32 {
        IndexBuilder::record_count(self)
    }

    fn sentinel(&self) -> char {
        self.sentinel
    }

    fn postings(&self, trigram: &Trigram) -> Result<PostingList> {
        Ok(self
            .posting_lists
            .get(trigram)
            .map(|bitmap| PostingList::from_bitmap(bitmap.clone()))
            .unwrap_or_default())
    }

    fn record_multiset(&self, id: u32) -> Result<TrigramMultiset> {
        self.record(id).cloned()
    }
}
