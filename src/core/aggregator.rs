// src/core/aggregator.rs

use crate::core::parser::scan_references;
use crate::core::refs::{NodeRef, RefKind};
use crate::models::{Node, TreeDocument};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Errors raised while recomputing a node's link sets.
#[derive(Error, Debug)]
pub enum AggregateError {
    /// The node whose links were requested does not exist.
    #[error("Node '{id}' not found in document.")]
    NodeNotFound {
        /// The id that was not found.
        id: String,
    },
}

type AggregateResult<T> = Result<T, AggregateError>;

/// What one aggregation pass found for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationReport {
    pub node_id: String,
    /// References that resolved to no known entity, in canonical
    /// spelling. These are also persisted on the owning node.
    pub unresolved: BTreeSet<String>,
    /// Whether any link set actually changed.
    pub changed: bool,
}

/// The recomputed state for one node, before it is written back.
struct Recomputed {
    node_id: String,
    formula_ids: BTreeSet<String>,
    condition_ids: BTreeSet<String>,
    table_ids: BTreeSet<String>,
    variable_ids: BTreeSet<String>,
    /// Nodes this one textually references (owners of referenced
    /// capabilities included), targets of the reciprocal pass.
    referenced_nodes: BTreeSet<String>,
    unresolved: BTreeSet<String>,
}

/// The five persisted sets of a node, snapshotted to detect whether an
/// aggregation pass actually changed anything. The comparison happens
/// on the final state, after the reciprocal pass, so a node whose only
/// links are back-links written by other nodes still converges.
#[derive(Clone, PartialEq, Eq)]
struct LinkSets {
    formulas: BTreeSet<String>,
    conditions: BTreeSet<String>,
    tables: BTreeSet<String>,
    variables: BTreeSet<String>,
    unresolved: BTreeSet<String>,
}

impl LinkSets {
    fn of(node: &Node) -> Self {
        Self {
            formulas: node.linked_formula_ids.clone(),
            conditions: node.linked_condition_ids.clone(),
            tables: node.linked_table_ids.clone(),
            variables: node.linked_variable_ids.clone(),
            unresolved: node.unresolved_refs.clone(),
        }
    }
}

/// Recomputes the four link sets of `node_id` from scratch and writes
/// reciprocal back-links onto every node it references.
///
/// The pass is idempotent: run twice without intervening edits, the
/// second run changes nothing. A reference that resolves to no known
/// entity is recorded in the node's `unresolved_refs` (and in the
/// returned report) instead of being silently dropped.
///
/// # Errors
/// Returns `AggregateError::NodeNotFound` when `node_id` is unknown.
pub fn aggregate_dependencies(
    doc: &mut TreeDocument,
    node_id: &str,
) -> AggregateResult<AggregationReport> {
    let recomputed = recompute(doc, node_id)?;
    let before = doc.nodes.get(node_id).map(LinkSets::of);
    apply(doc, &recomputed);
    apply_reciprocal(doc, &recomputed);
    let changed = doc.nodes.get(node_id).map(LinkSets::of) != before;
    Ok(AggregationReport {
        node_id: recomputed.node_id,
        unresolved: recomputed.unresolved,
        changed,
    })
}

/// Aggregates every node of the document: one full recompute pass, then
/// one reciprocal pass, so a later recompute cannot wipe a back-link an
/// earlier node just wrote. Reports come back sorted by node id, with
/// `changed` judged against each node's state before the whole run.
pub fn aggregate_all(doc: &mut TreeDocument) -> Vec<AggregationReport> {
    let mut node_ids: Vec<String> = doc.nodes.keys().cloned().collect();
    node_ids.sort();

    let before: HashMap<&String, LinkSets> = node_ids
        .iter()
        .filter_map(|id| doc.nodes.get(id).map(|n| (id, LinkSets::of(n))))
        .collect();

    let mut recomputed = Vec::with_capacity(node_ids.len());
    for id in &node_ids {
        // Every id comes straight from the key set; recompute cannot fail.
        if let Ok(r) = recompute(doc, id) {
            recomputed.push(r);
        }
    }
    for r in &recomputed {
        apply(doc, r);
    }
    for r in &recomputed {
        apply_reciprocal(doc, r);
    }

    recomputed
        .into_iter()
        .map(|r| {
            let changed =
                doc.nodes.get(&r.node_id).map(LinkSets::of) != before.get(&r.node_id).cloned();
            AggregationReport {
                node_id: r.node_id,
                unresolved: r.unresolved,
                changed,
            }
        })
        .collect()
}

/// Builds the from-scratch link sets for one node: its own capability
/// ids, plus everything discoverable by parsing those capabilities'
/// payloads and the node config.
fn recompute(doc: &TreeDocument, node_id: &str) -> AggregateResult<Recomputed> {
    let node = doc
        .nodes
        .get(node_id)
        .ok_or_else(|| AggregateError::NodeNotFound {
            id: node_id.to_string(),
        })?;

    // (a) The node's own capabilities.
    let mut formula_ids: BTreeSet<String> = doc.formulas_of(node_id).into_iter().collect();
    let mut condition_ids: BTreeSet<String> = doc.conditions_of(node_id).into_iter().collect();
    let mut table_ids: BTreeSet<String> = doc.tables_of(node_id).into_iter().collect();
    let mut variable_ids: BTreeSet<String> = doc.variables_of(node_id).into_iter().collect();

    // (b) Everything the payloads reference.
    let mut refs: BTreeSet<NodeRef> = BTreeSet::new();
    for fid in &formula_ids {
        if let Some(formula) = doc.formulas.get(fid) {
            refs.extend(scan_references(&formula.tokens));
        }
    }
    for cid in &condition_ids {
        if let Some(condition) = doc.conditions.get(cid) {
            refs.extend(scan_references(&condition.condition_set));
        }
    }
    for tid in &table_ids {
        if let Some(table) = doc.tables.get(tid) {
            if let Some(lookup) = &table.lookup {
                refs.insert(NodeRef::new(RefKind::Field, lookup.row_selector_id.clone()));
                refs.insert(NodeRef::new(
                    RefKind::Field,
                    lookup.column_selector_id.clone(),
                ));
            }
        }
    }
    for vid in &variable_ids {
        if let Some(variable) = doc.variables.get(vid) {
            if let Some(reference) = NodeRef::parse(&variable.source_ref) {
                refs.insert(reference);
            }
        }
    }
    if node.config != Value::Null {
        refs.extend(scan_references(&node.config));
    }

    // (c) Resolve each reference; unresolved ones are kept, not dropped.
    let mut referenced_nodes: BTreeSet<String> = BTreeSet::new();
    let mut unresolved: BTreeSet<String> = BTreeSet::new();
    for reference in refs {
        match resolve_owner(doc, &reference) {
            Some(owner) => {
                match reference.kind {
                    RefKind::Formula => {
                        formula_ids.insert(reference.id.clone());
                    }
                    RefKind::Condition => {
                        condition_ids.insert(reference.id.clone());
                    }
                    RefKind::Table => {
                        table_ids.insert(reference.id.clone());
                    }
                    RefKind::Field => {}
                }
                if owner != node_id {
                    // Import the referenced node's exposed variables.
                    variable_ids.extend(doc.variables_of(&owner));
                    referenced_nodes.insert(owner);
                }
            }
            None => {
                unresolved.insert(reference.to_string());
            }
        }
    }

    Ok(Recomputed {
        node_id: node_id.to_string(),
        formula_ids,
        condition_ids,
        table_ids,
        variable_ids,
        referenced_nodes,
        unresolved,
    })
}

/// Which node owns the entity a reference points at, when it resolves.
fn resolve_owner(doc: &TreeDocument, reference: &NodeRef) -> Option<String> {
    match reference.kind {
        RefKind::Field => doc.nodes.get(&reference.id).map(|n| n.id.clone()),
        RefKind::Formula => doc.formulas.get(&reference.id).map(|f| f.node_id.clone()),
        RefKind::Condition => doc.conditions.get(&reference.id).map(|c| c.node_id.clone()),
        RefKind::Table => doc.tables.get(&reference.id).map(|t| t.node_id.clone()),
    }
}

/// Writes the recomputed sets onto the node.
fn apply(doc: &mut TreeDocument, recomputed: &Recomputed) {
    let Some(node) = doc.nodes.get_mut(&recomputed.node_id) else {
        return;
    };
    node.linked_formula_ids = recomputed.formula_ids.clone();
    node.linked_condition_ids = recomputed.condition_ids.clone();
    node.linked_table_ids = recomputed.table_ids.clone();
    node.linked_variable_ids = recomputed.variable_ids.clone();
    node.unresolved_refs = recomputed.unresolved.clone();
}

/// Writes the reciprocal update onto each referenced node: it also
/// lists this node's formula/condition/table/variable ids, so the
/// rendering layer sees the wiring from both ends.
fn apply_reciprocal(doc: &mut TreeDocument, recomputed: &Recomputed) {
    let own_formulas = doc.formulas_of(&recomputed.node_id);
    let own_conditions = doc.conditions_of(&recomputed.node_id);
    let own_tables = doc.tables_of(&recomputed.node_id);
    let own_variables = doc.variables_of(&recomputed.node_id);

    for referenced_id in &recomputed.referenced_nodes {
        if let Some(referenced) = doc.nodes.get_mut(referenced_id) {
            referenced.linked_formula_ids.extend(own_formulas.iter().cloned());
            referenced
                .linked_condition_ids
                .extend(own_conditions.iter().cloned());
            referenced.linked_table_ids.extend(own_tables.iter().cloned());
            referenced
                .linked_variable_ids
                .extend(own_variables.iter().cloned());
        }
    }
}

// MARK: --- UNIT TESTS ---
