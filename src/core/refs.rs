// src/core/refs.rs

use crate::constants::{
    CONDITION_REF_PREFIX, FORMULA_REF_PREFIX, TABLE_REF_PREFIX, VALUE_REF_PREFIX,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    /// Every reference spelling the builder UI has ever produced. Longer
    /// prefixes must come first in the alternation so that
    /// `node-condition:` never half-matches as `condition:`.
    pub(crate) static ref REFERENCE_RE: Regex = Regex::new(
        r"(@value\.|@table\.|node-formula:|node-condition:|node-table:|condition:|table:)([A-Za-z0-9_-]+)"
    ).unwrap();

    /// Trailing copy-generation segments: `-1`, `-1-1`, ...
    static ref GENERATION_SUFFIX_RE: Regex = Regex::new(r"-(\d+)(?:-\d+)*$").unwrap();
}

/// What a parsed reference points at.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefKind {
    Field,
    Formula,
    Condition,
    Table,
}

impl RefKind {
    /// Maps a matched prefix spelling to its kind. Legacy and alternate
    /// spellings collapse onto the same kind.
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "@value." => Some(Self::Field),
            "node-formula:" => Some(Self::Formula),
            "node-condition:" | "condition:" => Some(Self::Condition),
            "@table." | "node-table:" | "table:" => Some(Self::Table),
            _ => None,
        }
    }
}

/// A reference embedded in a capability payload, in canonical form.
/// This is the single parse point for the prefix grammar: nothing else
/// in the crate strips prefixes by hand.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    pub kind: RefKind,
    pub id: String,
}

impl NodeRef {
    pub fn new(kind: RefKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    /// Parses a string that is exactly one reference (e.g. a variable's
    /// `source_ref`). Returns `None` when the string carries no known
    /// prefix.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = REFERENCE_RE.captures(raw)?;
        let full = caps.get(0)?;
        if full.start() != 0 || full.end() != raw.len() {
            return None;
        }
        let kind = RefKind::from_prefix(caps.get(1)?.as_str())?;
        let id = caps.get(2)?.as_str().to_string();
        Some(Self { kind, id })
    }
}

impl fmt::Display for NodeRef {
    /// Renders the canonical spelling for the kind, regardless of which
    /// legacy spelling was parsed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RefKind::Field => write!(f, "{}{}", VALUE_REF_PREFIX, self.id),
            RefKind::Formula => write!(f, "{}{}", FORMULA_REF_PREFIX, self.id),
            RefKind::Condition => write!(f, "{}{}", CONDITION_REF_PREFIX, self.id),
            RefKind::Table => write!(f, "{}{}", TABLE_REF_PREFIX, self.id),
        }
    }
}

/// An identifier split into its base and its copy generation.
///
/// Copy arithmetic goes through this type instead of string
/// concatenation, so "already suffixed" checks are structural equality.
/// Parsing strips *every* trailing numeric segment into the base (the
/// malformed `x-1-1` normalizes to the same base as `x-1`) and keeps
/// the last segment as the generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CopyId {
    pub base: String,
    pub generation: Option<u32>,
}

impl CopyId {
    pub fn parse(id: &str) -> Self {
        if let Some(m) = GENERATION_SUFFIX_RE.find(id) {
            let base = id[..m.start()].to_string();
            // The last numeric segment is the effective generation.
            let generation = id[m.start() + 1..]
                .rsplit('-')
                .next()
                .and_then(|seg| seg.parse::<u32>().ok());
            if !base.is_empty() {
                return Self { base, generation };
            }
        }
        Self {
            base: id.to_string(),
            generation: None,
        }
    }

    /// The same base id at the given generation.
    pub fn with_generation(&self, generation: u32) -> Self {
        Self {
            base: self.base.clone(),
            generation: Some(generation),
        }
    }

    /// True when this id already carries exactly the given generation.
    pub fn has_generation(&self, generation: u32) -> bool {
        self.generation == Some(generation)
    }
}

impl fmt::Display for CopyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation {
            Some(generation) => write!(f, "{}-{}", self.base, generation),
            None => write!(f, "{}", self.base),
        }
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    // --- `NodeRef` parsing ---

    #[test]
    fn test_parse_canonical_spellings() {
        assert_eq!(
            NodeRef::parse("@value.longueur-toiture"),
            Some(NodeRef::new(RefKind::Field, "longueur-toiture"))
        );
        assert_eq!(
            NodeRef::parse("node-formula:f1"),
            Some(NodeRef::new(RefKind::Formula, "f1"))
        );
        assert_eq!(
            NodeRef::parse("condition:c1"),
            Some(NodeRef::new(RefKind::Condition, "c1"))
        );
        assert_eq!(
            NodeRef::parse("@table.t1"),
            Some(NodeRef::new(RefKind::Table, "t1"))
        );
    }

    #[test]
    fn test_parse_legacy_spellings_collapse_to_canonical_kind() {
        assert_eq!(
            NodeRef::parse("node-condition:c1"),
            Some(NodeRef::new(RefKind::Condition, "c1"))
        );
        assert_eq!(
            NodeRef::parse("node-table:t1"),
            Some(NodeRef::new(RefKind::Table, "t1"))
        );
        assert_eq!(
            NodeRef::parse("table:t1"),
            Some(NodeRef::new(RefKind::Table, "t1"))
        );
    }

    #[test]
    fn test_parse_rejects_partial_and_unknown() {
        assert_eq!(NodeRef::parse("longueur-toiture"), None);
        assert_eq!(NodeRef::parse("x @value.y"), None); // not exactly one reference
        assert_eq!(NodeRef::parse("@other.y"), None);
    }

    #[test]
    fn test_display_renders_canonical_spelling() {
        let parsed = NodeRef::parse("node-table:t1").unwrap();
        assert_eq!(parsed.to_string(), "@table.t1");
        let parsed = NodeRef::parse("node-condition:c1").unwrap();
        assert_eq!(parsed.to_string(), "condition:c1");
    }

    // --- `CopyId` arithmetic ---

    #[test]
    fn test_copy_id_parse_unsuffixed() {
        let id = CopyId::parse("rampant-toiture");
        assert_eq!(id.base, "rampant-toiture");
        assert_eq!(id.generation, None);
    }

    #[test]
    fn test_copy_id_parse_suffixed() {
        let id = CopyId::parse("rampant-toiture-2");
        assert_eq!(id.base, "rampant-toiture");
        assert_eq!(id.generation, Some(2));
        assert_eq!(id.to_string(), "rampant-toiture-2");
    }

    #[test]
    fn test_copy_id_normalizes_double_suffix() {
        // `x-1-1` is a historic corruption: the base must strip every
        // trailing generation segment.
        let id = CopyId::parse("rampant-toiture-1-1");
        assert_eq!(id.base, "rampant-toiture");
        assert_eq!(id.generation, Some(1));
    }

    #[test]
    fn test_with_generation_is_structurally_idempotent() {
        let once = CopyId::parse("rampant-toiture").with_generation(1);
        let twice = CopyId::parse(&once.to_string()).with_generation(1);
        assert_eq!(once, twice);
        assert_eq!(twice.to_string(), "rampant-toiture-1");
    }

    #[test]
    fn test_has_generation_is_structural() {
        assert!(CopyId::parse("x-3").has_generation(3));
        assert!(!CopyId::parse("x-3").has_generation(1));
        assert!(!CopyId::parse("x").has_generation(1));
    }
}
