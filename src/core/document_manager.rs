// src/core/document_manager.rs

use crate::models::TreeDocument;
use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or saving a tree document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// A filesystem I/O error occurred.
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    /// The file exists but does not parse as a tree document.
    #[error("Failed to parse document as JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The path does not exist.
    #[error("Document file '{path}' not found.")]
    NotFound {
        /// The path that was requested.
        path: String,
    },
}

type DocumentResult<T> = Result<T, DocumentError>;

/// Loads a tree document from a JSON file.
pub fn load_document(path: &Path) -> DocumentResult<TreeDocument> {
    debug!("Loading document from '{}'", path.display());
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(DocumentError::NotFound {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    let doc = serde_json::from_str(&content)?;
    Ok(doc)
}

/// Saves a tree document as pretty-printed JSON. Pretty output keeps
/// document diffs reviewable; link sets are already persisted sorted.
pub fn save_document(path: &Path, doc: &TreeDocument) -> DocumentResult<()> {
    debug!("Saving document to '{}'", path.display());
    let content = serde_json::to_string_pretty(doc)?;
    fs::write(path, content)?;
    Ok(())
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, NodeKind};
    use tempfile::tempdir;

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("form.json");

        let mut doc = TreeDocument::default();
        doc.nodes.insert("racine".into(), Node::new("racine", NodeKind::Branch));
        save_document(&path, &doc).unwrap();

        let loaded = load_document(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_missing_file_is_a_distinct_error() {
        let dir = tempdir().unwrap();
        let result = load_document(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(DocumentError::NotFound { .. })));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_document(&path), Err(DocumentError::Json(_))));
    }
}
