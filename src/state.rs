// src/state.rs

use crate::models::TreeDocument;
use std::ops::{Deref, DerefMut};

/// Represents the journaled state of a loaded document.
/// It holds the current state and, optionally, a snapshot of the original
/// state taken before the first mutation occurred.
enum JournalState {
    /// The state is clean, no mutations have been requested yet.
    Pristine(TreeDocument),
    /// A mutation has been requested. We now hold both the original
    /// snapshot and the current, mutable state.
    Dirty {
        original: TreeDocument,
        current: TreeDocument,
    },
}

/// A per-operation document wrapper with copy-on-write journaling.
///
/// Every CLI invocation constructs one of these around the document it
/// loaded, mutates it through `DerefMut`, and then either commits (takes
/// the current state for persisting) or rolls back (recovers the
/// pre-operation snapshot). There is deliberately no process-wide
/// instance: the state lives exactly as long as the operation.
pub struct DocumentState {
    state: JournalState,
}

impl std::fmt::Debug for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match &self.state {
            JournalState::Pristine(_) => "Pristine",
            JournalState::Dirty { .. } => "Dirty",
        };
        f.debug_struct("DocumentState").field("phase", &phase).finish()
    }
}

impl DocumentState {
    pub fn new(document: TreeDocument) -> Self {
        Self {
            state: JournalState::Pristine(document),
        }
    }

    /// Checks whether the state needs to be saved by comparing the
    /// current state against the original snapshot, if one exists.
    pub fn needs_saving(&self) -> bool {
        match &self.state {
            JournalState::Pristine(_) => false, // Never modified, no need to save.
            JournalState::Dirty { original, current } => original != current,
        }
    }

    /// Read-only access to the current document state.
    pub fn document(&self) -> &TreeDocument {
        match &self.state {
            JournalState::Pristine(doc) => doc,
            JournalState::Dirty { current, .. } => current,
        }
    }

    /// Discards every mutation performed since construction, restoring
    /// the pre-operation snapshot.
    pub fn rollback(&mut self) {
        let taken =
            std::mem::replace(&mut self.state, JournalState::Pristine(TreeDocument::default()));
        self.state = match taken {
            JournalState::Dirty { original, .. } => JournalState::Pristine(original),
            pristine => pristine,
        };
    }

    /// Consumes the state, yielding the current document for persisting.
    pub fn commit(self) -> TreeDocument {
        match self.state {
            JournalState::Pristine(doc) => doc,
            JournalState::Dirty { current, .. } => current,
        }
    }
}

// Implement Deref for easy read-only access.
impl Deref for DocumentState {
    type Target = TreeDocument;

    fn deref(&self) -> &Self::Target {
        self.document()
    }
}

// Implement DerefMut for controlled mutable access: the first mutable
// borrow transitions the journal from Pristine to Dirty.
impl DerefMut for DocumentState {
    fn deref_mut(&mut self) -> &mut TreeDocument {
        if let JournalState::Pristine(_) = self.state {
            // This is the first request for mutable access. Atomically
            // swap the Pristine state with a new Dirty state.
            self.state = match std::mem::replace(
                &mut self.state,
                JournalState::Pristine(TreeDocument::default()),
            ) {
                JournalState::Pristine(doc) => JournalState::Dirty {
                    original: doc.clone(), // The one and only clone happens here.
                    current: doc,
                },
                _ => unreachable!(),
            };
        }

        match &mut self.state {
            JournalState::Dirty { current, .. } => current,
            _ => unreachable!(),
        }
    }
}
