//! Index writer: serializes a built index and publishes it atomically.
//!
//! `write_index` is pure byte serialization. `persist_index` writes through
//! a temporary file in the destination directory and renames it into place,
//! so a reader never observes a half-written index at the destination path.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::builder::IndexBuilder;
use super::error::{NgramError, Result};
use super::format::{
    put_trigram, IndexHeader, HEADER_SIZE, PAIR_SIZE, RECORD_ENTRY_SIZE, SECTION_CRC_SIZE,
    TRIGRAM_ENTRY_SIZE, VERSION,
};

/// Summary of a written index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub record_count: u32,
    pub trigram_count: u32,
    pub bytes: u64,
}

fn to_u32(value: usize, what: &'static str) -> Result<u32> {
    value.try_into().map_err(|_| NgramError::Capacity {
        what,
        limit: u64::from(u32::MAX),
    })
}

/// Serialize a built index to bytes.
///
/// Returns the complete index file content. The caller decides where it goes.
pub fn write_index(builder: &IndexBuilder) -> Result<Vec<u8>> {
    let records = builder.records();
    let sorted_postings = builder.sorted_posting_lists();
    let trigram_count = to_u32(sorted_postings.len(), "trigram count")?;

    // Phase 1: Compute sizes for all sections.
    let total_pairs: usize = records.iter().map(|r| r.len()).sum();
    let record_table_size =
        records.len() * RECORD_ENTRY_SIZE + total_pairs * PAIR_SIZE + SECTION_CRC_SIZE;
    let trigram_table_size = sorted_postings.len() * TRIGRAM_ENTRY_SIZE + SECTION_CRC_SIZE;

    let mut serialized_postings: Vec<Vec<u8>> = Vec::with_capacity(sorted_postings.len());
    let mut posting_data_size: usize = 0;
    for (_, bitmap) in &sorted_postings {
        let mut buf = Vec::with_capacity(bitmap.serialized_size());
        bitmap.serialize_into(&mut buf)?;
        posting_data_size += buf.len();
        serialized_postings.push(buf);
    }
    // Posting offsets are stored as u32 relative to the section start.
    to_u32(posting_data_size, "posting section size")?;
    let posting_section_size = posting_data_size + SECTION_CRC_SIZE;

    // Phase 2: Compute offsets.
    let record_table_offset = HEADER_SIZE as u64;
    let trigram_table_offset = record_table_offset + record_table_size as u64;
    let posting_offset = trigram_table_offset + trigram_table_size as u64;
    let total_size = HEADER_SIZE + record_table_size + trigram_table_size + posting_section_size;

    let mut output = Vec::with_capacity(total_size);

    // Phase 3: Write header.
    let header = IndexHeader {
        version: VERSION,
        flags: 0,
        sentinel: u32::from(builder.sentinel()),
        record_count: builder.record_count(),
        trigram_count,
        record_table_offset,
        trigram_table_offset,
        posting_offset,
        file_len: total_size as u64,
    };
    output.extend_from_slice(&header.to_bytes());

    // Phase 4: Write record table. Entries first, then the pairs they point at.
    let record_table_start = output.len();
    let mut first_pair: usize = 0;
    for record in records {
        output.extend_from_slice(&to_u32(first_pair, "record pair count")?.to_le_bytes());
        output.extend_from_slice(&to_u32(record.len(), "record pair count")?.to_le_bytes());
        first_pair += record.len();
    }
    for record in records {
        for (trigram, count) in record.sorted_entries() {
            put_trigram(&mut output, &trigram);
            output.extend_from_slice(&count.to_le_bytes());
        }
    }
    let record_table_crc = crc32fast::hash(&output[record_table_start..]);
    output.extend_from_slice(&record_table_crc.to_le_bytes());

    // Phase 5: Write trigram table.
    let trigram_table_start = output.len();
    let mut current_posting_offset: u32 = 0;
    for (i, (trigram, _)) in sorted_postings.iter().enumerate() {
        put_trigram(&mut output, trigram);
        output.extend_from_slice(&current_posting_offset.to_le_bytes());
        // Bounded by the posting section size checked above.
        let posting_len = serialized_postings[i].len() as u32;
        output.extend_from_slice(&posting_len.to_le_bytes());
        current_posting_offset += posting_len;
    }
    let trigram_table_crc = crc32fast::hash(&output[trigram_table_start..]);
    output.extend_from_slice(&trigram_table_crc.to_le_bytes());

    // Phase 6: Write posting lists.
    let posting_start = output.len();
    for serialized in &serialized_postings {
        output.extend_from_slice(serialized);
    }
    let posting_crc = crc32fast::hash(&output[posting_start..]);
    output.extend_from_slice(&posting_crc.to_le_bytes());

    debug_assert_eq!(output.len(), total_size);
    Ok(output)
}

/// Serialize a built index into `out`. Returns the number of bytes written.
pub fn write_index_to<W: Write>(builder: &IndexBuilder, out: &mut W) -> Result<u64> {
    let bytes = write_index(builder)?;
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(bytes.len() as u64)
}

/// Serialize and atomically publish a built index at `path`.
///
/// The bytes go to a temporary file next to `path`, are synced, then renamed
/// over `path`. On failure the temporary file is removed and `path` is left
/// as it was.
pub fn persist_index(builder: &IndexBuilder, path: &Path) -> Result<IndexStats> {
    let bytes = write_index(builder)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| NgramError::index(dir, e))?;
    tmp.write_all(&bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| NgramError::index(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| NgramError::index(path, e.error))?;

    let stats = IndexStats {
        record_count: builder.record_count(),
        trigram_count: builder.trigram_count() as u32,
        bytes: bytes.len() as u64,
    };
    tracing::info!(
        path = %path.display(),
        records = stats.record_count,
        trigrams = stats.trigram_count,
        bytes = stats.bytes,
        "index published"
    );
    Ok(stats)
}

/// Build an index from already-normalized strings and publish it at `path`.
///
/// Record ids are the positions of the strings in `texts`.
pub fn build_index<I, S>(texts: I, path: &Path) -> Result<IndexStats>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut builder = IndexBuilder::new();
    builder.extend(texts)?;
    tracing::debug!(
        records = builder.record_count(),
        trigrams = builder.trigram_count(),
        "index built in memory"
    );
    persist_index(&builder, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigram::format::MAGIC;

    #[test]
    fn test_write_empty_index() {
        let builder = IndexBuilder::new();
        let bytes = write_index(&builder).expect("Should serialize empty index");
        // Header + three section CRCs.
        assert_eq!(bytes.len(), HEADER_SIZE + 3 * SECTION_CRC_SIZE);
        assert_eq!(&bytes[0..4], &MAGIC);
    }

    #[test]
    fn test_write_preserves_header() {
        let mut builder = IndexBuilder::with_sentinel('$');
        builder.extend(["spam", "ham", "jam"]).unwrap();
        let bytes = write_index(&builder).expect("Should serialize");

        let header = IndexHeader::from_bytes(&bytes).expect("Should parse header");
        assert_eq!(header.version, VERSION);
        assert_eq!(header.sentinel, u32::from('$'));
        assert_eq!(header.record_count, 3);
        assert_eq!(header.trigram_count as usize, builder.trigram_count());
        assert_eq!(header.file_len, bytes.len() as u64);
        assert_eq!(header.record_table_offset, HEADER_SIZE as u64);
        assert!(header.trigram_table_offset > header.record_table_offset);
        assert!(header.posting_offset > header.trigram_table_offset);
    }

    #[test]
    fn test_record_table_size() {
        let mut builder = IndexBuilder::with_sentinel('$');
        builder.add("spam").unwrap(); // 6 distinct trigrams
        builder.add("").unwrap(); // 1
        let bytes = write_index(&builder).unwrap();
        let header = IndexHeader::from_bytes(&bytes).unwrap();
        let expected = 2 * RECORD_ENTRY_SIZE + 7 * PAIR_SIZE + SECTION_CRC_SIZE;
        assert_eq!(
            header.trigram_table_offset - header.record_table_offset,
            expected as u64
        );
    }

    #[test]
    fn test_write_index_to_stream() {
        let mut builder = IndexBuilder::new();
        builder.add("hello").unwrap();
        let mut out = Vec::new();
        let written = write_index_to(&builder, &mut out).unwrap();
        assert_eq!(written, out.len() as u64);
        assert_eq!(out, write_index(&builder).unwrap());
    }

    #[test]
    fn test_persist_leaves_no_temp_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("words.ngrm");
        let stats = build_index(["alpha", "beta"], &path).unwrap();
        assert_eq!(stats.record_count, 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), stats.bytes);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_persist_replaces_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("words.ngrm");
        std::fs::write(&path, b"old contents").unwrap();
        build_index(["gamma"], &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], &MAGIC);
    }

    #[test]
    fn test_persist_into_missing_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing").join("words.ngrm");
        let err = build_index(["delta"], &path).unwrap_err();
        assert!(matches!(err, NgramError::Index { .. }));
        assert!(!path.exists());
    }
}
