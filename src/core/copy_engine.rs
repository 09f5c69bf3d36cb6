// src/core/copy_engine.rs

use crate::constants::SHARED_REF_PREFIX;
use crate::core::parser::RefRewriter;
use crate::core::refs::CopyId;
use crate::models::TreeDocument;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Errors raised while duplicating a subtree.
#[derive(Error, Debug)]
pub enum CopyError {
    /// A template root does not exist in the document.
    #[error("Node '{id}' not found in document.")]
    NodeNotFound {
        /// The id that was not found.
        id: String,
    },
    /// The id a clone would take is already occupied.
    #[error("Copy target id '{id}' already exists.")]
    DuplicateCopy {
        /// The colliding id.
        id: String,
    },
}

type CopyResult<T> = Result<T, CopyError>;

/// Everything one copy operation produced. The per-kind id maps are the
/// record of every rename; callers (the repeat executor, tests) use
/// them to reason about the clones without re-deriving ids.
#[derive(Debug, Clone, Default)]
pub struct CopyOutcome {
    /// `(template_id, clone_id)` for each requested root, in request
    /// order. A root skipped by the generation guard maps to itself.
    pub roots: Vec<(String, String)>,
    pub node_id_map: HashMap<String, String>,
    pub formula_id_map: HashMap<String, String>,
    pub condition_id_map: HashMap<String, String>,
    pub table_id_map: HashMap<String, String>,
    pub variable_id_map: HashMap<String, String>,
    /// Clones of display nodes owned by copied variables.
    pub display_node_ids: Vec<String>,
    /// Every node the operation inserted, display clones included.
    pub created_node_ids: Vec<String>,
}

impl CopyOutcome {
    /// True when the operation copied nothing (every root was skipped).
    pub fn is_empty(&self) -> bool {
        self.created_node_ids.is_empty()
    }
}

/// Copies the subtree under a single template root. See [`copy_nodes`].
pub fn copy_node(
    doc: &mut TreeDocument,
    template_id: &str,
    target_parent_id: Option<&str>,
    generation: u32,
) -> CopyResult<CopyOutcome> {
    copy_nodes(doc, &[template_id.to_string()], target_parent_id, generation)
}

/// Deep-copies the subtrees under `template_ids` at the given copy
/// generation, rewriting every internal reference so the clones form a
/// self-contained unit.
///
/// All roots share one copy set and one set of id maps. That is what
/// keeps a reference from one template's formula into another template's
/// field pointing inside the new unit instead of back at the originals.
///
/// Per-root guard: a root whose id already carries this generation is
/// skipped and reported as mapping to itself (copying `x-1` at
/// generation 1 yields `x-1` again, never `x-1-1`).
/// Shared nodes (`shared_reference` or a `shared-ref-` id) are never
/// copied and never renamed, so every reference to them survives
/// byte-for-byte.
///
/// # Errors
/// - `NodeNotFound` when a template root is unknown.
/// - `DuplicateCopy` when any clone's id is already taken. The document
///   is untouched in both cases: all ids are planned before the first
///   insert.
pub fn copy_nodes(
    doc: &mut TreeDocument,
    template_ids: &[String],
    target_parent_id: Option<&str>,
    generation: u32,
) -> CopyResult<CopyOutcome> {
    // --- PLANNING: copy set and id maps, no mutation yet ---

    let mut roots: Vec<String> = Vec::new();
    for id in template_ids {
        if !doc.nodes.contains_key(id) {
            return Err(CopyError::NodeNotFound { id: id.clone() });
        }
        if CopyId::parse(id).has_generation(generation) {
            log::warn!("copy: '{id}' already carries generation {generation}, root skipped");
            continue;
        }
        roots.push(id.clone());
    }
    if roots.is_empty() {
        // Every root was already at this generation: the copy is an
        // idempotent no-op and each root maps to itself.
        return Ok(CopyOutcome {
            roots: template_ids
                .iter()
                .map(|id| (id.clone(), id.clone()))
                .collect(),
            ..CopyOutcome::default()
        });
    }
    let root_set: HashSet<&String> = roots.iter().collect();

    // Breadth-first over all roots at once; parents always precede
    // their children in `copy_order`.
    let mut copy_order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = roots.iter().cloned().collect();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        copy_order.push(id.clone());
        for child in doc.children_of(&id) {
            if is_shared(doc, &child) {
                continue;
            }
            queue.push_back(child);
        }
    }

    let mut node_map: HashMap<String, String> = HashMap::new();
    for id in &copy_order {
        let new_id = CopyId::parse(id).with_generation(generation).to_string();
        if doc.nodes.contains_key(&new_id) || node_map.values().any(|v| v == &new_id) {
            return Err(CopyError::DuplicateCopy { id: new_id });
        }
        node_map.insert(id.clone(), new_id);
    }

    let mut formula_map: HashMap<String, String> = HashMap::new();
    let mut condition_map: HashMap<String, String> = HashMap::new();
    let mut table_map: HashMap<String, String> = HashMap::new();
    let mut variable_map: HashMap<String, String> = HashMap::new();
    for id in &copy_order {
        plan_capability_ids(&doc.formulas_of(id), generation, &mut formula_map, |fid| {
            doc.formulas.contains_key(fid)
        })?;
        plan_capability_ids(&doc.conditions_of(id), generation, &mut condition_map, |cid| {
            doc.conditions.contains_key(cid)
        })?;
        plan_capability_ids(&doc.tables_of(id), generation, &mut table_map, |tid| {
            doc.tables.contains_key(tid)
        })?;
        plan_capability_ids(&doc.variables_of(id), generation, &mut variable_map, |vid| {
            doc.variables.contains_key(vid)
        })?;
    }

    // Display nodes owned by copied variables join the copy set, even
    // when they live outside the template subtrees.
    let mut display_sources: Vec<String> = Vec::new();
    for old_vid in variable_map.keys() {
        let Some(variable) = doc.variables.get(old_vid) else {
            continue;
        };
        let Some(display_id) = &variable.display_node_id else {
            continue;
        };
        if node_map.contains_key(display_id)
            || !doc.nodes.contains_key(display_id)
            || is_shared(doc, display_id)
        {
            continue;
        }
        let new_id = CopyId::parse(display_id)
            .with_generation(generation)
            .to_string();
        if doc.nodes.contains_key(&new_id) || node_map.values().any(|v| v == &new_id) {
            return Err(CopyError::DuplicateCopy { id: new_id });
        }
        node_map.insert(display_id.clone(), new_id);
        display_sources.push(display_id.clone());
    }
    display_sources.sort();

    let rewriter = RefRewriter {
        nodes: &node_map,
        formulas: &formula_map,
        conditions: &condition_map,
        tables: &table_map,
    };

    // --- EXECUTION: clone nodes, then capabilities ---

    let mut outcome = CopyOutcome {
        // A skipped root is not in the node map and maps to itself.
        roots: template_ids
            .iter()
            .map(|id| {
                let new_id = node_map.get(id).cloned().unwrap_or_else(|| id.clone());
                (id.clone(), new_id)
            })
            .collect(),
        ..CopyOutcome::default()
    };

    for old_id in copy_order.iter().chain(display_sources.iter()) {
        let Some(source) = doc.nodes.get(old_id).cloned() else {
            continue;
        };
        let new_id = node_map[old_id].clone();
        let is_root = root_set.contains(old_id);

        let mut clone = source.clone();
        clone.id = new_id.clone();
        clone.parent_id = resolve_parent(
            doc,
            &source.parent_id,
            is_root,
            target_parent_id,
            &node_map,
            generation,
        );
        clone.label = source.label.as_ref().map(|l| format!("{l}-{generation}"));
        clone.config = rewriter.rewrite_value(&source.config);
        clone.linked_formula_ids = remap_set(&source.linked_formula_ids, &formula_map);
        clone.linked_condition_ids = remap_set(&source.linked_condition_ids, &condition_map);
        clone.linked_table_ids = remap_set(&source.linked_table_ids, &table_map);
        clone.linked_variable_ids = remap_set(&source.linked_variable_ids, &variable_map);
        clone.copied_from = Some(old_id.clone());
        clone.copy_suffix = Some(generation);
        // A cloned repeater keeps its template list as base ids: the
        // next repetition must still derive from the originals.

        doc.nodes.insert(new_id.clone(), clone);
        outcome.created_node_ids.push(new_id.clone());
        if display_sources.contains(old_id) {
            outcome.display_node_ids.push(new_id);
        }
    }

    for (old_id, new_id) in &formula_map {
        if let Some(source) = doc.formulas.get(old_id).cloned() {
            let mut clone = source;
            clone.id = new_id.clone();
            clone.node_id = rewriter.rewrite_plain_node_id(&clone.node_id);
            clone.tokens = rewriter.rewrite_value(&clone.tokens);
            doc.formulas.insert(new_id.clone(), clone);
        }
    }
    for (old_id, new_id) in &condition_map {
        if let Some(source) = doc.conditions.get(old_id).cloned() {
            let mut clone = source;
            clone.id = new_id.clone();
            clone.node_id = rewriter.rewrite_plain_node_id(&clone.node_id);
            clone.condition_set = rewriter.rewrite_value(&clone.condition_set);
            doc.conditions.insert(new_id.clone(), clone);
        }
    }
    for (old_id, new_id) in &table_map {
        if let Some(source) = doc.tables.get(old_id).cloned() {
            let mut clone = source;
            clone.id = new_id.clone();
            clone.node_id = rewriter.rewrite_plain_node_id(&clone.node_id);
            if let Some(lookup) = &mut clone.lookup {
                lookup.row_selector_id = rewriter.rewrite_plain_node_id(&lookup.row_selector_id);
                lookup.column_selector_id =
                    rewriter.rewrite_plain_node_id(&lookup.column_selector_id);
            }
            doc.tables.insert(new_id.clone(), clone);
        }
    }
    for (old_id, new_id) in &variable_map {
        if let Some(source) = doc.variables.get(old_id).cloned() {
            let mut clone = source;
            clone.id = new_id.clone();
            clone.node_id = rewriter.rewrite_plain_node_id(&clone.node_id);
            clone.exposed_key = CopyId::parse(&clone.exposed_key)
                .with_generation(generation)
                .to_string();
            clone.source_ref = rewriter.rewrite_str(&clone.source_ref);
            clone.display_node_id = clone
                .display_node_id
                .as_ref()
                .map(|d| rewriter.rewrite_plain_node_id(d));
            doc.variables.insert(new_id.clone(), clone);
        }
    }

    outcome.node_id_map = node_map;
    outcome.formula_id_map = formula_map;
    outcome.condition_id_map = condition_map;
    outcome.table_id_map = table_map;
    outcome.variable_id_map = variable_map;
    Ok(outcome)
}

fn is_shared(doc: &TreeDocument, id: &str) -> bool {
    id.starts_with(SHARED_REF_PREFIX)
        || doc.nodes.get(id).is_some_and(|n| n.shared_reference)
}

/// Plans suffixed ids for one node's capabilities of one kind. A clone
/// id that already exists in the document, or that another clone in
/// this operation planned, aborts the whole copy before any write.
fn plan_capability_ids(
    owned: &[String],
    generation: u32,
    map: &mut HashMap<String, String>,
    exists_in_doc: impl Fn(&str) -> bool,
) -> CopyResult<()> {
    for id in owned {
        let new_id = CopyId::parse(id).with_generation(generation).to_string();
        if exists_in_doc(&new_id) || map.values().any(|v| v == &new_id) {
            return Err(CopyError::DuplicateCopy { id: new_id });
        }
        map.insert(id.clone(), new_id);
    }
    Ok(())
}

/// Picks a clone's parent. In-set parents map to their own clone; a
/// copied root lands under the requested target; otherwise the clone
/// keeps a suffixed sibling of the original parent when one exists, or
/// stays under the original parent (the repeat executor's reparent pass
/// fixes those up).
fn resolve_parent(
    doc: &TreeDocument,
    original_parent: &Option<String>,
    is_root: bool,
    target_parent_id: Option<&str>,
    node_map: &HashMap<String, String>,
    generation: u32,
) -> Option<String> {
    if is_root {
        if let Some(target) = target_parent_id {
            return Some(target.to_string());
        }
    }
    let parent = original_parent.as_ref()?;
    if let Some(mapped) = node_map.get(parent) {
        return Some(mapped.clone());
    }
    let suffixed = CopyId::parse(parent).with_generation(generation).to_string();
    if doc.nodes.contains_key(&suffixed) {
        Some(suffixed)
    } else {
        Some(parent.clone())
    }
}

fn remap_set(
    set: &std::collections::BTreeSet<String>,
    map: &HashMap<String, String>,
) -> std::collections::BTreeSet<String> {
    set.iter()
        .map(|id| map.get(id).cloned().unwrap_or_else(|| id.clone()))
        .collect()
}

// MARK: --- UNIT TESTS ---
