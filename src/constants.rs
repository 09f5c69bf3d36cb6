// src/constants.rs

/// File extension appended to a document path to locate its lint cache.
pub const LINT_CACHE_EXTENSION: &str = "lint.bin";

/// Canonical prefix for a field-value reference (`@value.<nodeId>`).
pub const VALUE_REF_PREFIX: &str = "@value.";

/// Canonical prefix for a table reference (`@table.<tableId>`).
pub const TABLE_REF_PREFIX: &str = "@table.";

/// Canonical prefix for a formula reference (`node-formula:<formulaId>`).
pub const FORMULA_REF_PREFIX: &str = "node-formula:";

/// Canonical prefix for a condition reference (`condition:<conditionId>`).
pub const CONDITION_REF_PREFIX: &str = "condition:";

/// Prefix carried by identifiers that are shared across all repetitions
/// of a repeater and therefore exempt from copy suffixing.
pub const SHARED_REF_PREFIX: &str = "shared-ref-";

/// Maximum nesting depth the reference scanner will traverse inside a
/// JSON payload before giving up on a branch.
pub const MAX_SCAN_DEPTH: usize = 64;
