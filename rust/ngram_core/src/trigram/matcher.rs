//! Candidate selection, weighted-Jaccard scoring and ranking.
//!
//! Pipeline:
//! 1. Look up postings for every trigram of the query and union them.
//! 2. Score each candidate: `Σ min(q[t], r[t]) / Σ max(q[t], r[t])`.
//! 3. Keep scores `>= threshold`, sort by score desc then id asc.
//!
//! Records sharing no trigram with the query are never loaded.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{QueryError, Result};
use super::extract::Trigram;
use super::multiset::TrigramMultiset;
use super::posting::{self, PostingList};
use crate::config::SearchOptions;

/// Candidate count above which scoring fans out over the rayon pool.
const PARALLEL_THRESHOLD: usize = 256;

/// Read access to records and postings, on disk or in memory.
pub trait TrigramSource: Sync {
    fn record_count(&self) -> u32;

    /// Sentinel the records were padded with.
    fn sentinel(&self) -> char;

    /// Ids of records containing `trigram`; empty when none do.
    fn postings(&self, trigram: &Trigram) -> Result<PostingList>;

    fn record_multiset(&self, id: u32) -> Result<TrigramMultiset>;
}

/// One ranked search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: u32,
    pub score: f64,
}

/// Weighted Jaccard similarity of two multisets, in `[0.0, 1.0]`.
///
/// `Σmax` is computed as `q.total + r.total - Σmin`. Two empty multisets
/// are identical and score 1.0.
pub fn score(query: &TrigramMultiset, record: &TrigramMultiset) -> f64 {
    let (small, large) = if query.len() <= record.len() {
        (query, record)
    } else {
        (record, query)
    };
    let shared: u64 = small
        .iter()
        .map(|(trigram, count)| u64::from(count.min(large.get(trigram))))
        .sum();
    // shared <= min(q.total, r.total), so this cannot underflow.
    let union = query.total() + record.total() - shared;
    if union == 0 {
        return 1.0;
    }
    shared as f64 / union as f64
}

/// Candidate ids: union of the postings of every query trigram.
pub fn candidates<S>(source: &S, query: &TrigramMultiset) -> Result<PostingList>
where
    S: TrigramSource + ?Sized,
{
    let mut lists = Vec::with_capacity(query.len());
    for trigram in query.trigrams() {
        lists.push(source.postings(trigram)?);
    }
    Ok(posting::union(&lists))
}

fn score_candidate<S>(
    source: &S,
    query: &TrigramMultiset,
    id: u32,
    threshold: f64,
) -> Result<Option<Match>>
where
    S: TrigramSource + ?Sized,
{
    let record = source.record_multiset(id)?;
    let score = score(query, &record);
    Ok((score >= threshold).then_some(Match { id, score }))
}

/// Rank the records of `source` against `query`.
///
/// The query must have been extracted with `source.sentinel()`.
pub fn search<S>(source: &S, query: &TrigramMultiset, options: &SearchOptions) -> Result<Vec<Match>>
where
    S: TrigramSource + ?Sized,
{
    let threshold = options.effective_threshold()?;

    let pool = candidates(source, query)?;
    if let Some(limit) = options.max_candidates {
        if pool.len() > limit as u64 {
            return Err(QueryError::TooManyCandidates {
                candidates: pool.len(),
                limit,
            }
            .into());
        }
    }

    let ids = pool.to_vec();
    let scored: Vec<Option<Match>> = if ids.len() > PARALLEL_THRESHOLD {
        ids.par_iter()
            .map(|&id| score_candidate(source, query, id, threshold))
            .collect::<Result<_>>()?
    } else {
        ids.iter()
            .map(|&id| score_candidate(source, query, id, threshold))
            .collect::<Result<_>>()?
    };

    let mut matches: Vec<Match> = scored.into_iter().flatten().collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    if let Some(limit) = options.limit {
        matches.truncate(limit);
    }

    tracing::debug!(
        query_trigrams = query.len(),
        candidates = ids.len(),
        matches = matches.len(),
        threshold,
        "search finished"
    );
    Ok(matches)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::trigram::builder::IndexBuilder;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_score_bounded_and_symmetric(a in "[a-d]{0,10}", b in "[a-d]{0,10}") {
            let qa = TrigramMultiset::from_text_with(&a, '$');
            let qb = TrigramMultiset::from_text_with(&b, '$');
            let s = score(&qa, &qb);
            prop_assert!((0.0..=1.0).contains(&s));
            prop_assert_eq!(s, score(&qb, &qa));
            prop_assert_eq!(s == 1.0, qa == qb);
        }

        #[test]
        fn prop_raising_threshold_only_removes(
            texts in prop::collection::vec("[a-c]{0,6}", 1..30),
            query in "[a-c]{0,6}",
            low in 0.0f64..1.0,
            delta in 0.0f64..1.0,
        ) {
            let mut builder = IndexBuilder::with_sentinel('$');
            builder.extend(&texts).unwrap();
            let q = TrigramMultiset::from_text_with(&query, '$');

            let loose = search(&builder, &q, &SearchOptions::with_threshold(low)).unwrap();
            let strict = search(&builder, &q, &SearchOptions::with_threshold(low + delta)).unwrap();

            // The strict result is exactly the loose result filtered, in the same order.
            let high = (low + delta).min(1.0);
            let filtered: Vec<Match> = loose.into_iter().filter(|m| m.score >= high).collect();
            prop_assert_eq!(strict, filtered);
        }
    }
}
