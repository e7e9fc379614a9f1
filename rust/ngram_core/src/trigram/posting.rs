//! Posting list operations using Roaring bitmaps.

use roaring::RoaringBitmap;

/// A posting list wrapping a Roaring bitmap of record IDs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingList {
    pub bitmap: RoaringBitmap,
}

impl PostingList {
    /// Create an empty posting list.
    pub fn new() -> Self {
        PostingList {
            bitmap: RoaringBitmap::new(),
        }
    }

    /// Create a posting list from a Roaring bitmap.
    pub fn from_bitmap(bitmap: RoaringBitmap) -> Self {
        PostingList { bitmap }
    }

    /// Insert a record ID.
    pub fn insert(&mut self, record_id: u32) {
        self.bitmap.insert(record_id);
    }

    /// Number of record IDs in this posting list.
    pub fn len(&self) -> u64 {
        self.bitmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// Largest record ID, if any.
    pub fn max(&self) -> Option<u32> {
        self.bitmap.max()
    }

    /// Iterate over record IDs in ascending order.
    pub fn iter(&self) -> roaring::bitmap::Iter<'_> {
        self.bitmap.iter()
    }

    /// Convert to a sorted Vec of record IDs.
    pub fn to_vec(&self) -> Vec<u32> {
        self.bitmap.iter().collect()
    }
}

/// Union multiple posting lists (OR operation).
///
/// Candidate selection: any record sharing at least one trigram.
pub fn union<'a, I>(lists: I) -> PostingList
where
    I: IntoIterator<Item = &'a PostingList>,
{
    let mut result = RoaringBitmap::new();
    for list in lists {
        result |= &list.bitmap;
    }
    PostingList::from_bitmap(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[u32]) -> PostingList {
        let mut pl = PostingList::new();
        for id in ids {
            pl.insert(*id);
        }
        pl
    }

    #[test]
    fn test_union_posting_lists() {
        let a = list(&[1, 2]);
        let b = list(&[2, 3]);
        assert_eq!(union([&a, &b]).to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_union_disjoint_keeps_order() {
        let a = list(&[40, 7]);
        let b = list(&[3]);
        assert_eq!(union([&a, &b]).to_vec(), vec![3, 7, 40]);
    }

    #[test]
    fn test_union_empty_input() {
        let result = union(std::iter::empty::<&PostingList>());
        assert!(result.is_empty());
    }

    #[test]
    fn test_posting_list_len_and_max() {
        let mut pl = PostingList::new();
        assert_eq!(pl.len(), 0);
        assert_eq!(pl.max(), None);
        pl.insert(1);
        pl.insert(9);
        pl.insert(9);
        assert_eq!(pl.len(), 2);
        assert_eq!(pl.max(), Some(9));
    }
}
