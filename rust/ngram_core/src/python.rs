//! PyO3 bindings for the n-gram engine.
//!
//! Exposes `Ngrams` for searching an index file plus `build_index` and
//! `string_trigrams` helpers. Records and queries are normalized here, before
//! they reach the engine; `string_trigrams` extracts its input as given.

use std::path::Path;

use pyo3::create_exception;
use pyo3::exceptions::PyException;
use pyo3::prelude::*;

use crate::config::SearchOptions;
use crate::normalize::normalize;
use crate::trigram::builder::IndexBuilder;
use crate::trigram::error::NgramError;
use crate::trigram::extract::extract_with;
use crate::trigram::reader::IndexReader;
use crate::trigram::writer::persist_index;

create_exception!(_search, SearchError, PyException, "Base class of all engine errors.");
create_exception!(_search, IndexFileError, SearchError, "The index path could not be read or written.");
create_exception!(_search, FormatError, SearchError, "The index file is malformed.");
create_exception!(_search, QueryError, SearchError, "The query is invalid.");

/// Map an engine error onto the Python exception hierarchy.
fn to_py_err(e: NgramError) -> PyErr {
    let message = e.to_string();
    match e {
        NgramError::Index { .. } | NgramError::Io(_) => IndexFileError::new_err(message),
        NgramError::Format(_) => FormatError::new_err(message),
        NgramError::Query(_) => QueryError::new_err(message),
        NgramError::Capacity { .. } | NgramError::EmptyRecord { .. } => {
            SearchError::new_err(message)
        }
    }
}

fn sentinel_from(value: Option<&str>) -> PyResult<Option<char>> {
    let Some(text) = value else {
        return Ok(None);
    };
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Some(c)),
        _ => Err(QueryError::new_err(format!(
            "sentinel must be a single character, got {text:?}"
        ))),
    }
}

/// Read-only handle over an index file.
///
/// Thread-safe: all methods take `&self`; the reader is immutable.
#[pyclass(frozen, name = "Ngrams")]
pub struct PyNgrams {
    reader: IndexReader,
}

#[pymethods]
impl PyNgrams {
    #[new]
    fn new(path: &str) -> PyResult<Self> {
        let reader = IndexReader::open(Path::new(path)).map_err(to_py_err)?;
        Ok(Self { reader })
    }

    /// Rank indexed records against `string`.
    ///
    /// Returns: list of (record_id, score) tuples, best first.
    #[pyo3(signature = (string, threshold = 0.3))]
    fn search(&self, string: &str, threshold: f64) -> PyResult<Vec<(u32, f64)>> {
        let options = SearchOptions::with_threshold(threshold);
        let matches = self
            .reader
            .search(&normalize(string), &options)
            .map_err(to_py_err)?;
        Ok(matches.into_iter().map(|m| (m.id, m.score)).collect())
    }

    #[getter]
    fn record_count(&self) -> u32 {
        self.reader.record_count()
    }

    #[getter]
    fn trigram_count(&self) -> u32 {
        self.reader.trigram_count()
    }
}

/// Trigrams of `string` as given, as codepoint triples.
#[pyfunction]
#[pyo3(signature = (string, sentinel = "$"))]
fn string_trigrams(string: &str, sentinel: &str) -> PyResult<Vec<(u32, u32, u32)>> {
    let sentinel = sentinel_from(Some(sentinel))?.unwrap_or('$');
    Ok(extract_with(string, sentinel)
        .into_iter()
        .map(|[a, b, c]| (u32::from(a), u32::from(b), u32::from(c)))
        .collect())
}

/// Normalize `strings`, index them in order and publish the file.
///
/// Returns: number of records written.
#[pyfunction]
#[pyo3(signature = (strings, output_path, sentinel = None))]
fn build_index(strings: Vec<String>, output_path: &str, sentinel: Option<&str>) -> PyResult<u32> {
    let mut builder = match sentinel_from(sentinel)? {
        Some(c) => IndexBuilder::with_sentinel(c),
        None => IndexBuilder::new(),
    };
    for text in &strings {
        builder.add(&normalize(text)).map_err(to_py_err)?;
    }
    let stats = persist_index(&builder, Path::new(output_path)).map_err(to_py_err)?;
    Ok(stats.record_count)
}

/// Python module: _search
#[pymodule]
#[pyo3(name = "_search")]
fn search_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();
    m.add_class::<PyNgrams>()?;
    m.add_function(wrap_pyfunction!(string_trigrams, m)?)?;
    m.add_function(wrap_pyfunction!(build_index, m)?)?;
    m.add("SearchError", py.get_type::<SearchError>())?;
    m.add("IndexFileError", py.get_type::<IndexFileError>())?;
    m.add("FormatError", py.get_type::<FormatError>())?;
    m.add("QueryError", py.get_type::<QueryError>())?;
    Ok(())
}
