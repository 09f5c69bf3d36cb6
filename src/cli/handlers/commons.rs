// src/cli/handlers/commons.rs

use anyhow::Result;
use std::path::Path;

use crate::core::document_manager;
use crate::state::DocumentState;

/// Runs a mutating operation against a journaled document state.
///
/// The document is loaded fresh, the operation runs against a
/// copy-on-write state, and the result decides what hits disk: success
/// persists (only when something actually changed), any error rolls the
/// state back and nothing is written. A half-finished operation is
/// never observable in the file.
pub fn with_document<T>(
    path: &Path,
    op: impl FnOnce(&mut DocumentState) -> Result<T>,
) -> Result<T> {
    let document = document_manager::load_document(path)?;
    let mut state = DocumentState::new(document);

    match op(&mut state) {
        Ok(value) => {
            if state.needs_saving() {
                document_manager::save_document(path, state.document())?;
                log::debug!("Document '{}' saved", path.display());
            }
            Ok(value)
        }
        Err(e) => {
            state.rollback();
            Err(e)
        }
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, NodeKind, TreeDocument};
    use anyhow::anyhow;
    use tempfile::tempdir;

    fn write_doc(path: &Path) -> TreeDocument {
        let mut doc = TreeDocument::default();
        doc.nodes.insert("racine".into(), Node::new("racine", NodeKind::Branch));
        document_manager::save_document(path, &doc).unwrap();
        doc
    }

    #[test]
    fn test_success_persists_the_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("form.json");
        write_doc(&path);

        with_document(&path, |state| {
            state
                .nodes
                .insert("feuille".into(), Node::new("feuille", NodeKind::Leaf));
            Ok(())
        })
        .unwrap();

        let reloaded = document_manager::load_document(&path).unwrap();
        assert!(reloaded.nodes.contains_key("feuille"));
    }

    #[test]
    fn test_error_leaves_the_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("form.json");
        let original = write_doc(&path);

        let result: Result<()> = with_document(&path, |state| {
            state.nodes.remove("racine");
            Err(anyhow!("boom"))
        });
        assert!(result.is_err());

        let reloaded = document_manager::load_document(&path).unwrap();
        assert_eq!(reloaded, original);
    }
}
