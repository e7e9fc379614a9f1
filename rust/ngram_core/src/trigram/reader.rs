//! Memory-mapped index reader.
//!
//! Opening validates the header, the section layout, checksums and the
//! posting ranges before any query runs. All accessors take `&self` and read
//! at explicit offsets of a read-only map, so one reader can serve any number
//! of threads.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use roaring::RoaringBitmap;

use super::error::{FormatError, NgramError, QueryError, Result};
use super::extract::Trigram;
use super::format::{
    decode_char, raw_trigram, read_raw_trigram, read_trigram, read_u32, IndexHeader, HEADER_SIZE,
    PAIR_SIZE, RECORD_ENTRY_SIZE, SECTION_CRC_SIZE, TRIGRAM_ENTRY_SIZE,
};
use super::matcher::{self, Match, TrigramSource};
use super::multiset::TrigramMultiset;
use super::posting::PostingList;
use crate::config::{ReaderOptions, SearchOptions};

/// Byte ranges of the sections, checked against the map length on open.
#[derive(Debug, Clone, Copy)]
struct Layout {
    record_entries: usize,
    pairs: usize,
    total_pairs: usize,
    trigram_table: usize,
    posting_data: usize,
    posting_data_len: usize,
}

/// Memory-mapped n-gram index reader.
///
/// Thread-safe: `Send + Sync` (read-only mmap, no cursor).
#[derive(Debug)]
pub struct IndexReader {
    mmap: Mmap,
    header: IndexHeader,
    sentinel: char,
    layout: Layout,
    postings_verified: bool,
    path: PathBuf,
}

fn inconsistent(reason: impl Into<String>) -> NgramError {
    FormatError::Inconsistent {
        reason: reason.into(),
    }
    .into()
}

/// Verify a section's CRC32 checksum.
///
/// Each section is laid out as: `[data bytes][crc32 (4 bytes)]`.
fn verify_section_crc(
    data: &[u8],
    section_start: usize,
    section_end: usize,
    section: &'static str,
) -> Result<()> {
    let crc_start = section_end - SECTION_CRC_SIZE;
    let stored = read_u32(data, crc_start);
    let computed = crc32fast::hash(&data[section_start..crc_start]);
    if stored != computed {
        return Err(FormatError::SectionChecksum {
            section,
            stored,
            computed,
        }
        .into());
    }
    Ok(())
}

/// Check offsets and section sizes against the declared counts.
fn compute_layout(header: &IndexHeader, actual_len: u64) -> Result<Layout> {
    if header.file_len > actual_len {
        return Err(FormatError::Truncated {
            section: "index",
            expected: header.file_len,
            actual: actual_len,
        }
        .into());
    }
    if header.file_len < actual_len {
        return Err(FormatError::TrailingData {
            expected: header.file_len,
            actual: actual_len,
        }
        .into());
    }

    let record_off = header.record_table_offset;
    let trigram_off = header.trigram_table_offset;
    let posting_off = header.posting_offset;
    if record_off < HEADER_SIZE as u64
        || record_off > trigram_off
        || trigram_off > posting_off
        || posting_off > actual_len
    {
        return Err(inconsistent("section offsets out of order or out of bounds"));
    }

    // Record table: entries, pairs, CRC.
    let record_size = trigram_off - record_off;
    let entries_size = u64::from(header.record_count) * RECORD_ENTRY_SIZE as u64;
    let pairs_size = record_size
        .checked_sub(entries_size + SECTION_CRC_SIZE as u64)
        .ok_or_else(|| {
            FormatError::Truncated {
                section: "record table",
                expected: entries_size + SECTION_CRC_SIZE as u64,
                actual: record_size,
            }
        })?;
    if pairs_size % PAIR_SIZE as u64 != 0 {
        return Err(inconsistent(format!(
            "record pair area of {pairs_size} bytes is not a whole number of pairs"
        )));
    }

    // Trigram table: fixed entries, CRC.
    let trigram_size = posting_off - trigram_off;
    let expected_trigram_size =
        u64::from(header.trigram_count) * TRIGRAM_ENTRY_SIZE as u64 + SECTION_CRC_SIZE as u64;
    if trigram_size != expected_trigram_size {
        return Err(inconsistent(format!(
            "trigram table is {trigram_size} bytes, {} trigrams need {expected_trigram_size}",
            header.trigram_count
        )));
    }

    let posting_size = actual_len - posting_off;
    if posting_size < SECTION_CRC_SIZE as u64 {
        return Err(FormatError::Truncated {
            section: "posting lists",
            expected: SECTION_CRC_SIZE as u64,
            actual: posting_size,
        }
        .into());
    }

    // Every value above is bounded by the map length, which is a usize.
    Ok(Layout {
        record_entries: record_off as usize,
        pairs: (record_off + entries_size) as usize,
        total_pairs: (pairs_size / PAIR_SIZE as u64) as usize,
        trigram_table: trigram_off as usize,
        posting_data: posting_off as usize,
        posting_data_len: (posting_size - SECTION_CRC_SIZE as u64) as usize,
    })
}

impl IndexReader {
    /// Open and validate an index file with default options.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &ReaderOptions::default())
    }

    /// Open and validate an index file.
    pub fn open_with(path: &Path, options: &ReaderOptions) -> Result<Self> {
        let file = File::open(path).map_err(|e| NgramError::index(path, e))?;
        let metadata = file.metadata().map_err(|e| NgramError::index(path, e))?;

        if metadata.len() < HEADER_SIZE as u64 {
            return Err(FormatError::Truncated {
                section: "header",
                expected: HEADER_SIZE as u64,
                actual: metadata.len(),
            }
            .into());
        }

        // SAFETY: Read-only mmap. Index files are never modified in place;
        // rebuilds publish a new file by rename.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| NgramError::index(path, e))?;

        let header = IndexHeader::from_bytes(&mmap)?;
        let layout = compute_layout(&header, mmap.len() as u64)?;
        let sentinel = decode_char(header.sentinel)?;

        if options.verify_checksums {
            verify_section_crc(&mmap, layout.record_entries, layout.trigram_table, "record table")?;
            verify_section_crc(&mmap, layout.trigram_table, layout.posting_data, "trigram table")?;
            verify_section_crc(&mmap, layout.posting_data, mmap.len(), "posting section")?;
        }

        let reader = IndexReader {
            mmap,
            header,
            sentinel,
            layout,
            postings_verified: options.verify_postings,
            path: path.to_path_buf(),
        };
        reader.validate_record_table()?;
        reader.validate_trigram_table()?;

        tracing::debug!(
            path = %path.display(),
            records = reader.header.record_count,
            trigrams = reader.header.trigram_count,
            bytes = reader.mmap.len(),
            "index opened"
        );
        Ok(reader)
    }

    /// Record entries must tile the pair area exactly, in id order.
    fn validate_record_table(&self) -> Result<()> {
        let mut next_pair: u64 = 0;
        for id in 0..self.header.record_count {
            let (first_pair, pair_count) = self.record_entry(id);
            if u64::from(first_pair) != next_pair {
                return Err(inconsistent(format!(
                    "record {id} starts at pair {first_pair}, expected {next_pair}"
                )));
            }
            if pair_count == 0 {
                return Err(inconsistent(format!("record {id} has no trigrams")));
            }
            next_pair += u64::from(pair_count);
        }
        if next_pair != self.layout.total_pairs as u64 {
            return Err(inconsistent(format!(
                "records cover {next_pair} pairs, table holds {}",
                self.layout.total_pairs
            )));
        }
        Ok(())
    }

    /// Trigrams must be strictly ascending with contiguous in-bounds postings.
    fn validate_trigram_table(&self) -> Result<()> {
        let mut previous: Option<[u32; 3]> = None;
        let mut next_offset: u64 = 0;
        for i in 0..self.header.trigram_count as usize {
            let entry = self.layout.trigram_table + i * TRIGRAM_ENTRY_SIZE;
            read_trigram(&self.mmap, entry)?;
            let raw = read_raw_trigram(&self.mmap, entry);
            if previous.is_some_and(|p| p >= raw) {
                return Err(inconsistent(format!("trigram table not sorted at entry {i}")));
            }
            previous = Some(raw);

            let p_offset = u64::from(read_u32(&self.mmap, entry + 12));
            let p_len = u64::from(read_u32(&self.mmap, entry + 16));
            if p_offset != next_offset || p_len == 0 {
                return Err(inconsistent(format!("posting range of entry {i} is not contiguous")));
            }
            next_offset += p_len;
            if next_offset > self.layout.posting_data_len as u64 {
                return Err(FormatError::Truncated {
                    section: "posting lists",
                    expected: next_offset,
                    actual: self.layout.posting_data_len as u64,
                }
                .into());
            }

            if self.postings_verified {
                self.decode_posting(p_offset as usize, p_len as usize, true)?;
            }
        }
        if next_offset != self.layout.posting_data_len as u64 {
            return Err(inconsistent(format!(
                "postings cover {next_offset} bytes, section holds {}",
                self.layout.posting_data_len
            )));
        }
        Ok(())
    }

    /// `(first_pair, pair_count)` of a record. Caller checks `id`.
    fn record_entry(&self, id: u32) -> (u32, u32) {
        let entry = self.layout.record_entries + id as usize * RECORD_ENTRY_SIZE;
        (read_u32(&self.mmap, entry), read_u32(&self.mmap, entry + 4))
    }

    /// Deserialize one posting bitmap and range-check its ids.
    fn decode_posting(&self, offset: usize, len: usize, check_range: bool) -> Result<PostingList> {
        let start = self.layout.posting_data + offset;
        let bytes = &self.mmap[start..start + len];
        let bitmap = RoaringBitmap::deserialize_from(bytes)
            .map_err(|e| inconsistent(format!("unreadable posting list: {e}")))?;
        if bitmap.is_empty() {
            return Err(inconsistent("empty posting list"));
        }
        if check_range {
            if let Some(id) = bitmap.max().filter(|id| *id >= self.header.record_count) {
                return Err(FormatError::PostingOutOfRange {
                    id,
                    record_count: self.header.record_count,
                }
                .into());
            }
        }
        Ok(PostingList::from_bitmap(bitmap))
    }

    /// Look up the posting list for a trigram using binary search.
    ///
    /// An absent trigram yields an empty list.
    pub fn postings(&self, trigram: &Trigram) -> Result<PostingList> {
        let target = raw_trigram(trigram);
        let mut lo = 0usize;
        let mut hi = self.header.trigram_count as usize;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = self.layout.trigram_table + mid * TRIGRAM_ENTRY_SIZE;
            match read_raw_trigram(&self.mmap, entry).cmp(&target) {
                std::cmp::Ordering::Equal => {
                    let p_offset = read_u32(&self.mmap, entry + 12) as usize;
                    let p_len = read_u32(&self.mmap, entry + 16) as usize;
                    // Ranges were validated on open; ids only when verify_postings was on.
                    return self.decode_posting(p_offset, p_len, !self.postings_verified);
                }
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }

        Ok(PostingList::new())
    }

    /// Trigram multiset of one record.
    pub fn record_multiset(&self, id: u32) -> Result<TrigramMultiset> {
        if id >= self.header.record_count {
            return Err(QueryError::UnknownRecord {
                id,
                record_count: self.header.record_count,
            }
            .into());
        }

        let (first_pair, pair_count) = self.record_entry(id);
        let start = self.layout.pairs + first_pair as usize * PAIR_SIZE;
        let mut pairs = Vec::with_capacity(pair_count as usize);
        let mut previous: Option<Trigram> = None;
        for i in 0..pair_count as usize {
            let offset = start + i * PAIR_SIZE;
            let trigram = read_trigram(&self.mmap, offset)?;
            let count = read_u32(&self.mmap, offset + 12);
            if count == 0 || previous.is_some_and(|p| p >= trigram) {
                return Err(inconsistent(format!("record {id} has a malformed pair at {i}")));
            }
            previous = Some(trigram);
            pairs.push((trigram, count));
        }
        Ok(TrigramMultiset::from_counts(pairs))
    }

    /// Multiset of `text` padded with this index's sentinel.
    pub fn query_multiset(&self, text: &str) -> TrigramMultiset {
        TrigramMultiset::from_text_with(text, self.sentinel)
    }

    /// Rank the records of this index against an already-normalized string.
    pub fn search(&self, text: &str, options: &SearchOptions) -> Result<Vec<Match>> {
        matcher::search(self, &self.query_multiset(text), options)
    }

    /// Number of records in the index.
    pub fn record_count(&self) -> u32 {
        self.header.record_count
    }

    /// Number of unique trigrams in the index.
    pub fn trigram_count(&self) -> u32 {
        self.header.trigram_count
    }

    /// Padding sentinel the index was built with.
    pub fn sentinel(&self) -> char {
        self.sentinel
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// Index file size in bytes.
    pub fn index_size(&self) -> usize {
        self.mmap.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrigramSource for IndexReader {
    fn record_count(&self) -> u32 {
        self.header.record_count
    }

    fn sentinel(&self) -> char {
        self.sentinel
    }

    fn postings(&self, trigram: &Trigram) -> Result<PostingList> {
        IndexReader::postings(self, trigram)
    }

    fn record_multiset(&self, id: u32) -> Result<TrigramMultiset> {
        IndexReader::record_multiset(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigram::builder::IndexBuilder;
    use crate::trigram::format::IndexHeader;
    use crate::trigram::writer::{persist_index, write_index};
    use tempfile::TempDir;

    fn sample_builder() -> IndexBuilder {
        let mut builder = IndexBuilder::with_sentinel('$');
        builder.extend(["spam", "ham", "jam", ""]).unwrap();
        builder
    }

    fn write_bytes(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Rewrite a section CRC after patching its body.
    fn fix_crc(bytes: &mut [u8], start: usize, end: usize) {
        let crc = crc32fast::hash(&bytes[start..end - 4]);
        bytes[end - 4..end].copy_from_slice(&crc.to_le_bytes());
    }

    #[test]
    fn test_roundtrip_record_multisets() {
        let dir = TempDir::new().unwrap();
        let builder = sample_builder();
        let path = dir.path().join("idx.ngrm");
        persist_index(&builder, &path).unwrap();

        let reader = IndexReader::open(&path).unwrap();
        assert_eq!(reader.record_count(), 4);
        assert_eq!(reader.trigram_count() as usize, builder.trigram_count());
        assert_eq!(reader.sentinel(), '$');
        for (id, text) in ["spam", "ham", "jam", ""].iter().enumerate() {
            assert_eq!(
                reader.record_multiset(id as u32).unwrap(),
                TrigramMultiset::from_text_with(text, '$')
            );
        }
    }

    #[test]
    fn test_postings_lookup() {
        let dir = TempDir::new().unwrap();
        let path = write_bytes(&dir, "idx.ngrm", &write_index(&sample_builder()).unwrap());
        let reader = IndexReader::open(&path).unwrap();

        assert_eq!(reader.postings(&['a', 'm', '$']).unwrap().to_vec(), vec![0, 1, 2]);
        assert_eq!(reader.postings(&['$', '$', '$']).unwrap().to_vec(), vec![3]);
        assert!(reader.postings(&['z', 'z', 'z']).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_record() {
        let dir = TempDir::new().unwrap();
        let path = write_bytes(&dir, "idx.ngrm", &write_index(&sample_builder()).unwrap());
        let reader = IndexReader::open(&path).unwrap();
        assert!(matches!(
            reader.record_multiset(4),
            Err(NgramError::Query(QueryError::UnknownRecord { id: 4, record_count: 4 }))
        ));
    }

    #[test]
    fn test_empty_index_opens() {
        let dir = TempDir::new().unwrap();
        let path = write_bytes(&dir, "empty.ngrm", &write_index(&IndexBuilder::new()).unwrap());
        let reader = IndexReader::open(&path).unwrap();
        assert_eq!(reader.record_count(), 0);
        assert!(reader.postings(&['a', 'b', 'c']).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_index_error() {
        let dir = TempDir::new().unwrap();
        let err = IndexReader::open(&dir.path().join("nope.ngrm")).unwrap_err();
        assert!(matches!(err, NgramError::Index { .. }));
    }

    #[test]
    fn test_truncated_header() {
        let dir = TempDir::new().unwrap();
        let bytes = write_index(&sample_builder()).unwrap();
        let path = write_bytes(&dir, "short.ngrm", &bytes[..30]);
        assert!(matches!(
            IndexReader::open(&path),
            Err(NgramError::Format(FormatError::Truncated { section: "header", .. }))
        ));
    }

    #[test]
    fn test_zero_length_file() {
        let dir = TempDir::new().unwrap();
        let path = write_bytes(&dir, "zero.ngrm", b"");
        assert!(matches!(
            IndexReader::open(&path),
            Err(NgramError::Format(FormatError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_truncated_body() {
        let dir = TempDir::new().unwrap();
        let bytes = write_index(&sample_builder()).unwrap();
        let path = write_bytes(&dir, "cut.ngrm", &bytes[..bytes.len() - 7]);
        assert!(matches!(
            IndexReader::open(&path),
            Err(NgramError::Format(FormatError::Truncated { section: "index", .. }))
        ));
    }

    #[test]
    fn test_trailing_data_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bytes = write_index(&sample_builder()).unwrap();
        bytes.extend_from_slice(b"junk");
        let path = write_bytes(&dir, "long.ngrm", &bytes);
        assert!(matches!(
            IndexReader::open(&path),
            Err(NgramError::Format(FormatError::TrailingData { .. }))
        ));
    }

    #[test]
    fn test_bad_magic() {
        let dir = TempDir::new().unwrap();
        let mut bytes = write_index(&sample_builder()).unwrap();
        bytes[0..4].copy_from_slice(b"TRGM");
        let path = write_bytes(&dir, "magic.ngrm", &bytes);
        assert!(matches!(
            IndexReader::open(&path),
            Err(NgramError::Format(FormatError::BadMagic))
        ));
    }

    #[test]
    fn test_section_crc_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut bytes = write_index(&sample_builder()).unwrap();
        let header = IndexHeader::from_bytes(&bytes).unwrap();
        // Flip a count inside the record pair area.
        let first_count = header.record_table_offset as usize + 4 * RECORD_ENTRY_SIZE + 12;
        bytes[first_count] ^= 0x01;
        let path = write_bytes(&dir, "crc.ngrm", &bytes);
        assert!(matches!(
            IndexReader::open(&path),
            Err(NgramError::Format(FormatError::SectionChecksum {
                section: "record table",
                ..
            }))
        ));
    }

    #[test]
    fn test_posting_out_of_range_rejected_on_open() {
        let dir = TempDir::new().unwrap();
        let mut builder = sample_builder();
        builder
            .posting_lists_mut()
            .get_mut(&['h', 'a', 'm'])
            .unwrap()
            .insert(99);
        let path = write_bytes(&dir, "range.ngrm", &write_index(&builder).unwrap());
        assert!(matches!(
            IndexReader::open(&path),
            Err(NgramError::Format(FormatError::PostingOutOfRange { id: 99, record_count: 4 }))
        ));
    }

    #[test]
    fn test_posting_out_of_range_rejected_lazily() {
        let dir = TempDir::new().unwrap();
        let mut builder = sample_builder();
        builder
            .posting_lists_mut()
            .get_mut(&['h', 'a', 'm'])
            .unwrap()
            .insert(99);
        let path = write_bytes(&dir, "range.ngrm", &write_index(&builder).unwrap());
        let options = ReaderOptions {
            verify_postings: false,
            ..ReaderOptions::default()
        };
        let reader = IndexReader::open_with(&path, &options).unwrap();
        assert!(reader.postings(&['s', 'p', 'a']).is_ok());
        assert!(matches!(
            reader.postings(&['h', 'a', 'm']),
            Err(NgramError::Format(FormatError::PostingOutOfRange { id: 99, .. }))
        ));
    }

    #[test]
    fn test_inconsistent_record_count_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bytes = write_index(&sample_builder()).unwrap();
        let mut header = IndexHeader::from_bytes(&bytes).unwrap();
        header.record_count = 5;
        bytes[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        let path = write_bytes(&dir, "count.ngrm", &bytes);
        assert!(matches!(
            IndexReader::open(&path),
            Err(NgramError::Format(FormatError::Inconsistent { .. }))
        ));
    }

    #[test]
    fn test_unsorted_trigram_table_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bytes = write_index(&sample_builder()).unwrap();
        let header = IndexHeader::from_bytes(&bytes).unwrap();
        let table = header.trigram_table_offset as usize;
        // Swap the codepoints of the first two entries.
        let (a, b) = (table, table + TRIGRAM_ENTRY_SIZE);
        for k in 0..12 {
            bytes.swap(a + k, b + k);
        }
        fix_crc(&mut bytes, table, header.posting_offset as usize);
        let path = write_bytes(&dir, "order.ngrm", &bytes);
        assert!(matches!(
            IndexReader::open(&path),
            Err(NgramError::Format(FormatError::Inconsistent { .. }))
        ));
    }

    #[test]
    fn test_reader_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IndexReader>();
    }
}
