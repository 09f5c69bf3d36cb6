// src/core/cache.rs

use crate::constants::LINT_CACHE_EXTENSION;
use crate::core::aggregator::AggregationReport;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use std::fs;
use thiserror::Error;

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters

/// Errors that can occur while reading or writing the lint cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A filesystem I/O error occurred.
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    /// The cache file exists but does not decode.
    #[error("Failed to decode from binary format: {0}")]
    BincodeDecode(#[from] bincode::error::DecodeError),
    /// The report could not be encoded.
    #[error("Failed to encode to binary format: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),
}

type CacheResult<T> = Result<T, CacheError>;

/// Validation metadata for a cached lint report. The layers are checked
/// cheapest-first: modification time, then size, then a truncated
/// content hash.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct CacheValidationData {
    pub timestamp: SystemTime,
    pub file_size: u64,
    pub content_hash: String,
}

/// The lint findings cached next to a document.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
    pub node_count: usize,
    /// node id -> the unresolved references found on it.
    pub unresolved: BTreeMap<String, BTreeSet<String>>,
    /// Nodes whose persisted link sets differ from a fresh aggregation.
    pub out_of_sync: BTreeSet<String>,
}

impl LintReport {
    /// Condenses per-node aggregation reports into a lint report.
    pub fn from_aggregation(node_count: usize, reports: &[AggregationReport]) -> Self {
        let mut lint = Self {
            node_count,
            ..Self::default()
        };
        for report in reports {
            if !report.unresolved.is_empty() {
                lint.unresolved
                    .insert(report.node_id.clone(), report.unresolved.clone());
            }
            if report.changed {
                lint.out_of_sync.insert(report.node_id.clone());
            }
        }
        lint
    }

    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty() && self.out_of_sync.is_empty()
    }
}

/// On-disk shape of the cache file: the validation data of the document
/// it was computed from, plus the report itself.
#[derive(Serialize, Deserialize, Debug)]
struct LintCache {
    validation: CacheValidationData,
    report: LintReport,
}

/// Where the lint cache for a document lives.
pub fn cache_path(document_path: &Path) -> PathBuf {
    let mut name = document_path.as_os_str().to_os_string();
    name.push(".");
    name.push(LINT_CACHE_EXTENSION);
    PathBuf::from(name)
}

/// Calculates the validation metadata for a document file. The content
/// hash is `blake3`, truncated and hex-encoded.
///
/// # Errors
/// Returns an I/O error if the file cannot be read or its metadata
/// cannot be accessed.
pub fn calculate_validation_data(path: &Path) -> CacheResult<CacheValidationData> {
    debug!("Calculating validation data for '{}'", path.display());

    let metadata = fs::metadata(path)?;
    let timestamp = metadata.modified()?;
    let file_size = metadata.len();

    let content = fs::read(path)?;
    let hash = blake3::hash(&content);
    let content_hash = hex::encode(&hash.as_bytes()[..HASH_TRUNCATE_LENGTH]);

    Ok(CacheValidationData {
        timestamp,
        file_size,
        content_hash,
    })
}

/// Returns the cached lint report for a document, if one exists and is
/// still valid against the document's current contents. A missing,
/// undecodable or stale cache yields `Ok(None)`.
pub fn read_lint_cache(document_path: &Path) -> CacheResult<Option<LintReport>> {
    let path = cache_path(document_path);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let Ok((cache, _)) = bincode::serde::decode_from_slice::<LintCache, _>(
        &bytes,
        bincode::config::standard(),
    ) else {
        debug!("Lint cache at '{}' is undecodable, ignoring it", path.display());
        return Ok(None);
    };

    let current = calculate_validation_data(document_path)?;
    if is_valid(&cache.validation, &current) {
        debug!("Lint cache hit for '{}'", document_path.display());
        Ok(Some(cache.report))
    } else {
        debug!("Lint cache stale for '{}'", document_path.display());
        Ok(None)
    }
}

/// Writes a fresh lint report next to the document.
pub fn write_lint_cache(document_path: &Path, report: &LintReport) -> CacheResult<()> {
    let cache = LintCache {
        validation: calculate_validation_data(document_path)?,
        report: report.clone(),
    };
    let bytes = bincode::serde::encode_to_vec(&cache, bincode::config::standard())?;
    fs::write(cache_path(document_path), bytes)?;
    Ok(())
}

/// Deletes the lint cache, returning whether one existed.
pub fn clear_lint_cache(document_path: &Path) -> CacheResult<bool> {
    match fs::remove_file(cache_path(document_path)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Layered staleness check. An unchanged modification time is trusted
/// outright; otherwise size and content hash must both match (an
/// editor may rewrite identical bytes with a fresh mtime).
fn is_valid(stored: &CacheValidationData, current: &CacheValidationData) -> bool {
    if stored.timestamp == current.timestamp {
        return true;
    }
    stored.file_size == current.file_size && stored.content_hash == current.content_hash
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_calculate_validation_data_success() {
        let content = b"hello world";
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content).unwrap();
        temp_file.flush().unwrap();

        let data = calculate_validation_data(temp_file.path()).unwrap();

        assert_eq!(data.file_size, 11);
        // Pre-calculated blake3 hash of the bytes "hello world",
        // truncated to 16 bytes.
        assert_eq!(data.content_hash, "d74981efa70a0c880b8d8c1985d075db");

        let difference = SystemTime::now().duration_since(data.timestamp).unwrap();
        assert!(difference.as_secs() < 5);
    }

    #[test]
    fn test_calculate_validation_data_file_not_found() {
        let result = calculate_validation_data(Path::new("non_existent_file_for_test.tmp"));
        assert!(result.is_err());
    }

    #[test]
    fn test_cache_round_trip_and_staleness() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{\"nodes\":{}}").unwrap();
        temp_file.flush().unwrap();

        let mut report = LintReport {
            node_count: 3,
            ..LintReport::default()
        };
        report
            .unresolved
            .entry("rampant".into())
            .or_default()
            .insert("@value.fantome".into());

        write_lint_cache(temp_file.path(), &report).unwrap();
        assert_eq!(read_lint_cache(temp_file.path()).unwrap(), Some(report));

        // Changing the document's contents invalidates the cache.
        temp_file.write_all(b" ").unwrap();
        temp_file.flush().unwrap();
        assert_eq!(read_lint_cache(temp_file.path()).unwrap(), None);

        let _ = clear_lint_cache(temp_file.path());
    }

    #[test]
    fn test_missing_cache_is_none_not_an_error() {
        let temp_file = NamedTempFile::new().unwrap();
        assert_eq!(read_lint_cache(temp_file.path()).unwrap(), None);
        assert!(!clear_lint_cache(temp_file.path()).unwrap());
    }
}
