//! Trigram multisets: trigram → occurrence count for one string.

use ahash::AHashMap;

use super::extract::{for_each_trigram, Trigram, DEFAULT_SENTINEL};

/// Occurrence counts of the trigrams of one string.
///
/// Built once, then only read. Zero counts are never stored, and `total`
/// always equals the sum of the stored counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrigramMultiset {
    counts: AHashMap<Trigram, u32>,
    total: u64,
}

impl TrigramMultiset {
    /// Multiset of `text` using [`DEFAULT_SENTINEL`].
    pub fn from_text(text: &str) -> Self {
        Self::from_text_with(text, DEFAULT_SENTINEL)
    }

    /// Multiset of `text` padded with `sentinel`.
    pub fn from_text_with(text: &str, sentinel: char) -> Self {
        let mut counts: AHashMap<Trigram, u32> = AHashMap::new();
        for_each_trigram(text, sentinel, |trigram| {
            let slot = counts.entry(trigram).or_insert(0);
            *slot = slot.saturating_add(1);
        });
        Self::with_total(counts)
    }

    /// Build from explicit `(trigram, count)` pairs.
    ///
    /// Duplicate trigrams are summed (saturating at `u32::MAX`) and zero
    /// counts dropped.
    pub fn from_counts<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Trigram, u32)>,
    {
        let mut counts: AHashMap<Trigram, u32> = AHashMap::new();
        for (trigram, count) in pairs {
            if count == 0 {
                continue;
            }
            let slot = counts.entry(trigram).or_insert(0);
            *slot = slot.saturating_add(count);
        }
        Self::with_total(counts)
    }

    /// Total is summed from the final counts so the two never disagree.
    fn with_total(counts: AHashMap<Trigram, u32>) -> Self {
        let total = counts.values().map(|c| u64::from(*c)).sum();
        TrigramMultiset { counts, total }
    }

    /// Count of `trigram`, 0 when absent.
    pub fn get(&self, trigram: &Trigram) -> u32 {
        self.counts.get(trigram).copied().unwrap_or(0)
    }

    /// Number of distinct trigrams.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Iterate `(trigram, count)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&Trigram, u32)> + '_ {
        self.counts.iter().map(|(t, c)| (t, *c))
    }

    /// Distinct trigrams in unspecified order.
    pub fn trigrams(&self) -> impl Iterator<Item = &Trigram> + '_ {
        self.counts.keys()
    }

    /// Pairs sorted by trigram, as laid out on disk.
    pub fn sorted_entries(&self) -> Vec<(Trigram, u32)> {
        let mut entries: Vec<(Trigram, u32)> = self.counts.iter().map(|(t, c)| (*t, *c)).collect();
        entries.sort_unstable_by_key(|(trigram, _)| *trigram);
        entries
    }
}
