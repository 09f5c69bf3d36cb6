// src/models.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

// --- TREE ELEMENT MODELS ---
// These are the structures persisted inside a document file and used
// directly by the engine at runtime.

/// The role a node plays in the form tree.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Branch,
    Section,
    Leaf,
}

/// Repetition settings carried by a node that acts as a repeater.
///
/// `template_node_ids` is the list of node ids that constitute one
/// repetition unit. Invariant: these must always be base (unsuffixed)
/// ids; a suffixed member would make every later duplication derive
/// from a copy instead of the template.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RepeaterConfig {
    pub template_node_ids: Vec<String>,
    #[serde(default)]
    pub max_items: Option<u32>,
    #[serde(default)]
    pub add_button_label: Option<String>,
}

/// A single element of the form tree (branch, section, or leaf field).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub order: i64,

    // Link sets: which capabilities are "wired" for this node. They are
    // recomputed from scratch by the dependency aggregator and persisted
    // sorted for stable diffs.
    #[serde(default)]
    pub linked_formula_ids: BTreeSet<String>,
    #[serde(default)]
    pub linked_condition_ids: BTreeSet<String>,
    #[serde(default)]
    pub linked_table_ids: BTreeSet<String>,
    #[serde(default)]
    pub linked_variable_ids: BTreeSet<String>,

    /// References discovered by the aggregator that resolve to nothing.
    /// Surfaced here so the builder UI can flag them on the node.
    #[serde(default)]
    pub unresolved_refs: BTreeSet<String>,

    /// Free-form configuration written by the form builder (select
    /// options, link parameters, ...). May embed references.
    #[serde(default)]
    pub config: Value,

    /// Shared/global nodes are referenced from every repetition and are
    /// deliberately exempt from per-copy suffixing.
    #[serde(default)]
    pub shared_reference: bool,

    #[serde(default)]
    pub repeater: Option<RepeaterConfig>,

    // Copy provenance, filled in by the deep-copy engine.
    #[serde(default)]
    pub copied_from: Option<String>,
    #[serde(default)]
    pub copy_suffix: Option<u32>,
}

impl Node {
    /// Creates a bare node with the given id and kind. Everything else
    /// starts empty; callers fill in what they need.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            parent_id: None,
            order: 0,
            linked_formula_ids: BTreeSet::new(),
            linked_condition_ids: BTreeSet::new(),
            linked_table_ids: BTreeSet::new(),
            linked_variable_ids: BTreeSet::new(),
            unresolved_refs: BTreeSet::new(),
            config: Value::Null,
            shared_reference: false,
            repeater: None,
            copied_from: None,
            copy_suffix: None,
        }
    }
}

/// A formula owned by exactly one node. `tokens` is the ordered token
/// list produced by the builder UI: literals, operators, and typed
/// references such as `@value.<nodeId>`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Formula {
    pub id: String,
    pub node_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub tokens: Value,
}

/// A condition owned by one node: a nested when/then/else structure
/// whose leaves use the same reference grammar as formula tokens.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub id: String,
    pub node_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub condition_set: Value,
}

/// Lookup metadata on a table: the two selector fields whose values
/// pick the row and the column at evaluation time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TableLookup {
    pub row_selector_id: String,
    pub column_selector_id: String,
}

/// A lookup table owned by one node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Table {
    pub id: String,
    pub node_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub lookup: Option<TableLookup>,
}

/// An exposed value owned by one node. `source_ref` is a typed
/// reference string (e.g. `@value.<nodeId>` or `node-formula:<id>`);
/// `display_node_id` points at the synthetic leaf used to render the
/// value elsewhere in the tree, when one exists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: String,
    pub node_id: String,
    pub exposed_key: String,
    pub source_ref: String,
    #[serde(default)]
    pub display_node_id: Option<String>,
}

// --- DOCUMENT MODEL ---

/// The whole persisted tree: every node and every capability, keyed by
/// id. This is what a document file deserializes into and what every
/// engine operation works against.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TreeDocument {
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
    #[serde(default)]
    pub formulas: HashMap<String, Formula>,
    #[serde(default)]
    pub conditions: HashMap<String, Condition>,
    #[serde(default)]
    pub tables: HashMap<String, Table>,
    #[serde(default)]
    pub variables: HashMap<String, Variable>,
}

impl TreeDocument {
    /// Returns the ids of the direct children of `parent_id`, sorted by
    /// their `order` (then by id, for determinism).
    pub fn children_of(&self, parent_id: &str) -> Vec<String> {
        let mut children: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.parent_id.as_deref() == Some(parent_id))
            .collect();
        children.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        children.into_iter().map(|n| n.id.clone()).collect()
    }

    /// Ids of every descendant of `start_id` (the node itself excluded),
    /// discovered breadth-first.
    pub fn descendants_of(&self, start_id: &str) -> Vec<String> {
        let mut descendants = Vec::new();
        let mut to_visit = vec![start_id.to_string()];

        while let Some(current) = to_visit.pop() {
            let children = self.children_of(&current);
            descendants.extend(children.iter().cloned());
            to_visit.extend(children);
        }
        descendants
    }

    /// Ids of the formulas owned by `node_id`, sorted for determinism.
    pub fn formulas_of(&self, node_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .formulas
            .values()
            .filter(|f| f.node_id == node_id)
            .map(|f| f.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of the conditions owned by `node_id`, sorted.
    pub fn conditions_of(&self, node_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .conditions
            .values()
            .filter(|c| c.node_id == node_id)
            .map(|c| c.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of the tables owned by `node_id`, sorted.
    pub fn tables_of(&self, node_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tables
            .values()
            .filter(|t| t.node_id == node_id)
            .map(|t| t.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of the variables owned by `node_id`, sorted.
    pub fn variables_of(&self, node_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .variables
            .values()
            .filter(|v| v.node_id == node_id)
            .map(|v| v.id.clone())
            .collect();
        ids.sort();
        ids
    }
}
