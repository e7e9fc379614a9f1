//! Engine configuration and JSON loading helpers.
//!
//! Every field has a default, so an empty JSON object is a valid config and
//! a partial one overrides only what it names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trigram::error::QueryError;
use crate::trigram::extract::DEFAULT_SENTINEL;

/// Threshold used when a caller does not pass one.
pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// What to do with a threshold outside `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Pull the value into range.
    #[default]
    Clamp,
    /// Fail with [`QueryError::ThresholdOutOfRange`].
    Reject,
}

/// Per-query knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Minimum score a match must reach (inclusive).
    pub threshold: f64,
    pub threshold_policy: ThresholdPolicy,
    /// Fail the query when more records than this are candidates.
    pub max_candidates: Option<usize>,
    /// Keep only the best `limit` matches.
    pub limit: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            threshold: DEFAULT_THRESHOLD,
            threshold_policy: ThresholdPolicy::Clamp,
            max_candidates: None,
            limit: None,
        }
    }
}

impl SearchOptions {
    /// Default options with the given threshold.
    pub fn with_threshold(threshold: f64) -> Self {
        SearchOptions {
            threshold,
            ..SearchOptions::default()
        }
    }

    /// Threshold after applying the policy. NaN is never accepted.
    pub fn effective_threshold(&self) -> Result<f64, QueryError> {
        let t = self.threshold;
        if t.is_nan() {
            return Err(QueryError::ThresholdOutOfRange(t));
        }
        match self.threshold_policy {
            ThresholdPolicy::Clamp => Ok(t.clamp(0.0, 1.0)),
            ThresholdPolicy::Reject if (0.0..=1.0).contains(&t) => Ok(t),
            ThresholdPolicy::Reject => Err(QueryError::ThresholdOutOfRange(t)),
        }
    }
}

/// Checks run when an index file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Verify the CRC32 of every section.
    pub verify_checksums: bool,
    /// Range-check every posting id up front instead of per lookup.
    pub verify_postings: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            verify_checksums: true,
            verify_postings: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Padding sentinel written into new indexes.
    pub sentinel: char,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            sentinel: DEFAULT_SENTINEL,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub search: SearchOptions,
    pub reader: ReaderOptions,
    pub build: BuildOptions,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parse an engine config from a JSON string.
pub fn parse_config(json: &str) -> Result<EngineConfig, serde_json::Error> {
    serde_json::from_str(json)
}

/// Read and parse an engine config file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&text)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_object_uses_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.search.threshold, DEFAULT_THRESHOLD);
        assert!(config.reader.verify_checksums);
        assert_eq!(config.build.sentinel, DEFAULT_SENTINEL);
    }

    #[test]
    fn parse_partial_search_section() {
        let json = r#"{"search":{"threshold":0.5,"threshold_policy":"reject","limit":10}}"#;
        let config = parse_config(json).unwrap();
        assert_eq!(config.search.threshold, 0.5);
        assert_eq!(config.search.threshold_policy, ThresholdPolicy::Reject);
        assert_eq!(config.search.limit, Some(10));
        assert_eq!(config.search.max_candidates, None);
    }

    #[test]
    fn parse_reader_and_build_sections() {
        let json = r#"{"reader":{"verify_postings":false},"build":{"sentinel":"$"}}"#;
        let config = parse_config(json).unwrap();
        assert!(config.reader.verify_checksums);
        assert!(!config.reader.verify_postings);
        assert_eq!(config.build.sentinel, '$');
    }

    #[test]
    fn parse_unknown_policy_fails() {
        assert!(parse_config(r#"{"search":{"threshold_policy":"ignore"}}"#).is_err());
    }

    #[test]
    fn clamp_policy_pulls_into_range() {
        assert_eq!(SearchOptions::with_threshold(-0.5).effective_threshold(), Ok(0.0));
        assert_eq!(SearchOptions::with_threshold(1.7).effective_threshold(), Ok(1.0));
        assert_eq!(SearchOptions::with_threshold(0.4).effective_threshold(), Ok(0.4));
    }

    #[test]
    fn reject_policy_refuses_out_of_range() {
        let options = SearchOptions {
            threshold: 1.2,
            threshold_policy: ThresholdPolicy::Reject,
            ..SearchOptions::default()
        };
        assert_eq!(
            options.effective_threshold(),
            Err(QueryError::ThresholdOutOfRange(1.2))
        );
        let boundary = SearchOptions {
            threshold: 1.0,
            threshold_policy: ThresholdPolicy::Reject,
            ..SearchOptions::default()
        };
        assert_eq!(boundary.effective_threshold(), Ok(1.0));
    }

    #[test]
    fn nan_threshold_always_rejected() {
        let options = SearchOptions::with_threshold(f64::NAN);
        assert!(matches!(
            options.effective_threshold(),
            Err(QueryError::ThresholdOutOfRange(t)) if t.is_nan()
        ));
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_config(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ngram.json");
        std::fs::write(&path, r#"{"search":{"max_candidates":1000}}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.search.max_candidates, Some(1000));
    }
}
