// src/core/repeater.rs

use crate::core::copy_engine::{copy_nodes, CopyError};
use crate::core::refs::CopyId;
use crate::models::TreeDocument;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised by the repetition operations.
#[derive(Error, Debug)]
pub enum RepeatError {
    #[error("Node '{id}' not found in document.")]
    NodeNotFound { id: String },
    #[error("Node '{id}' carries no repeater configuration.")]
    NotARepeater { id: String },
    #[error("Repeater '{id}' is capped at {max} items.")]
    MaxItemsReached { id: String, max: u32 },
    #[error("Node '{id}' is not a repetition copy and cannot be removed as one.")]
    NotARepetition { id: String },
    #[error(transparent)]
    Copy(#[from] CopyError),
}

type RepeatResult<T> = Result<T, RepeatError>;

/// What one `add_repetition` produced.
#[derive(Debug, Clone)]
pub struct RepetitionOutcome {
    /// The copy generation the new repetition was created at.
    pub suffix: u32,
    /// Clone ids of the template roots, in template order.
    pub root_node_ids: Vec<String>,
    /// Every node the repetition created, display clones included.
    pub duplicated_node_ids: Vec<String>,
}

/// What `remove_repetition` deleted.
#[derive(Debug, Clone, Default)]
pub struct RemovalOutcome {
    pub removed_node_ids: Vec<String>,
    pub removed_formula_ids: Vec<String>,
    pub removed_condition_ids: Vec<String>,
    pub removed_table_ids: Vec<String>,
    pub removed_variable_ids: Vec<String>,
}

/// Appends one repetition under a repeater node: deep-copies all of its
/// templates as one unit at the next free suffix, then reparents any
/// clone still hanging off a template-side node.
///
/// Template ids that arrive suffixed are normalized back to their base
/// before copying (and the stored config is repaired), so a repetition
/// always derives from the originals, never from an earlier copy.
pub fn add_repetition(
    doc: &mut TreeDocument,
    repeater_id: &str,
) -> RepeatResult<RepetitionOutcome> {
    if !doc.nodes.contains_key(repeater_id) {
        return Err(RepeatError::NodeNotFound {
            id: repeater_id.to_string(),
        });
    }
    let Some(config) = doc.nodes[repeater_id].repeater.clone() else {
        return Err(RepeatError::NotARepeater {
            id: repeater_id.to_string(),
        });
    };

    let templates = normalize_templates(doc, repeater_id, &config.template_node_ids);

    let existing = existing_suffixes(doc, &templates);
    if let Some(max) = config.max_items {
        if existing.len() as u32 >= max {
            return Err(RepeatError::MaxItemsReached {
                id: repeater_id.to_string(),
                max,
            });
        }
    }
    let suffix = existing.iter().next_back().map_or(1, |s| s + 1);

    let outcome = copy_nodes(doc, &templates, Some(repeater_id), suffix)?;

    // Reparent pass: any clone whose parent still points at a
    // template-side original is moved onto that original's clone.
    for created in &outcome.created_node_ids {
        let Some(node) = doc.nodes.get(created) else {
            continue;
        };
        let mapped = node
            .parent_id
            .as_ref()
            .and_then(|p| outcome.node_id_map.get(p).cloned());
        if let Some(new_parent) = mapped {
            if let Some(node) = doc.nodes.get_mut(created) {
                node.parent_id = Some(new_parent);
            }
        }
    }

    Ok(RepetitionOutcome {
        suffix,
        root_node_ids: outcome.roots.iter().map(|(_, new)| new.clone()).collect(),
        duplicated_node_ids: outcome.created_node_ids,
    })
}

/// Deletes the repetition a copied root belongs to: every sibling root
/// created at the same suffix, their subtrees, the capabilities they
/// own, the display nodes of deleted variables, and every dangling id
/// the deletion leaves in surviving link sets.
pub fn remove_repetition(doc: &mut TreeDocument, root_id: &str) -> RepeatResult<RemovalOutcome> {
    let Some(root) = doc.nodes.get(root_id) else {
        return Err(RepeatError::NodeNotFound {
            id: root_id.to_string(),
        });
    };
    let (Some(suffix), Some(template)) = (root.copy_suffix, root.copied_from.clone()) else {
        return Err(RepeatError::NotARepetition {
            id: root_id.to_string(),
        });
    };

    // Sibling roots of the same repetition: copies of the other
    // templates of the owning repeater, at the same suffix. When the
    // root does not sit under a repeater, the root alone is removed.
    let mut templates = vec![template.clone()];
    if let Some(config) = root
        .parent_id
        .as_ref()
        .and_then(|p| doc.nodes.get(p))
        .and_then(|n| n.repeater.as_ref())
    {
        if config.template_node_ids.contains(&template) {
            templates = config.template_node_ids.clone();
        }
    }

    let mut doomed_nodes: BTreeSet<String> = BTreeSet::new();
    for template in &templates {
        let clone_id = CopyId::parse(template).with_generation(suffix).to_string();
        if doc
            .nodes
            .get(&clone_id)
            .is_some_and(|n| n.copy_suffix == Some(suffix))
        {
            doomed_nodes.insert(clone_id.clone());
            doomed_nodes.extend(doc.descendants_of(&clone_id));
        }
    }
    doomed_nodes.insert(root_id.to_string());
    doomed_nodes.extend(doc.descendants_of(root_id));

    let mut outcome = RemovalOutcome::default();

    // Owned capabilities go with their nodes. Display nodes of doomed
    // variables are cloned leaves; they go too, unless they survive as
    // someone else's node.
    for node_id in &doomed_nodes {
        outcome.removed_formula_ids.extend(doc.formulas_of(node_id));
        outcome
            .removed_condition_ids
            .extend(doc.conditions_of(node_id));
        outcome.removed_table_ids.extend(doc.tables_of(node_id));
        outcome.removed_variable_ids.extend(doc.variables_of(node_id));
    }
    for vid in &outcome.removed_variable_ids {
        if let Some(display_id) = doc
            .variables
            .get(vid)
            .and_then(|v| v.display_node_id.clone())
        {
            if doc
                .nodes
                .get(&display_id)
                .is_some_and(|n| n.copy_suffix == Some(suffix))
            {
                doomed_nodes.insert(display_id.clone());
                doomed_nodes.extend(doc.descendants_of(&display_id));
            }
        }
    }

    for id in &outcome.removed_formula_ids {
        doc.formulas.remove(id);
    }
    for id in &outcome.removed_condition_ids {
        doc.conditions.remove(id);
    }
    for id in &outcome.removed_table_ids {
        doc.tables.remove(id);
    }
    for id in &outcome.removed_variable_ids {
        doc.variables.remove(id);
    }
    for id in &doomed_nodes {
        doc.nodes.remove(id);
        outcome.removed_node_ids.push(id.clone());
    }

    // Strip dangling ids from every survivor's link sets.
    let gone_f: BTreeSet<&String> = outcome.removed_formula_ids.iter().collect();
    let gone_c: BTreeSet<&String> = outcome.removed_condition_ids.iter().collect();
    let gone_t: BTreeSet<&String> = outcome.removed_table_ids.iter().collect();
    let gone_v: BTreeSet<&String> = outcome.removed_variable_ids.iter().collect();
    for node in doc.nodes.values_mut() {
        node.linked_formula_ids.retain(|id| !gone_f.contains(id));
        node.linked_condition_ids.retain(|id| !gone_c.contains(id));
        node.linked_table_ids.retain(|id| !gone_t.contains(id));
        node.linked_variable_ids.retain(|id| !gone_v.contains(id));
    }

    Ok(outcome)
}

/// Strips copy suffixes out of a template list. A suffixed entry is a
/// config corruption (it would chain copies of copies), so it is
/// repaired in place and logged.
fn normalize_templates(
    doc: &mut TreeDocument,
    repeater_id: &str,
    template_ids: &[String],
) -> Vec<String> {
    let mut normalized = Vec::with_capacity(template_ids.len());
    let mut repaired = false;
    for id in template_ids {
        let parsed = CopyId::parse(id);
        if parsed.generation.is_some() && doc.nodes.contains_key(&parsed.base) {
            log::warn!(
                "repeater '{repeater_id}': template '{id}' is a copy, using base '{}'",
                parsed.base
            );
            normalized.push(parsed.base);
            repaired = true;
        } else {
            normalized.push(id.clone());
        }
    }
    if repaired {
        if let Some(config) = doc
            .nodes
            .get_mut(repeater_id)
            .and_then(|n| n.repeater.as_mut())
        {
            config.template_node_ids = normalized.clone();
        }
    }
    normalized
}

/// The distinct copy generations already present for these templates.
fn existing_suffixes(doc: &TreeDocument, templates: &[String]) -> BTreeSet<u32> {
    doc.nodes
        .values()
        .filter(|n| {
            n.copied_from
                .as_deref()
                .is_some_and(|from| templates.iter().any(|t| t == from))
        })
        .filter_map(|n| n.copy_suffix)
        .collect()
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Formula, Node, NodeKind, RepeaterConfig, Variable};
    use serde_json::json;

    fn node(id: &str, parent: Option<&str>) -> Node {
        let mut n = Node::new(id, NodeKind::Leaf);
        n.parent_id = parent.map(String::from);
        n
    }

    /// A repeater section with two template fields, a cross-template
    /// formula, and an exposed variable with a display node.
    fn roof_doc() -> TreeDocument {
        let mut doc = TreeDocument::default();
        let mut section = node("toiture", None);
        section.kind = NodeKind::Section;
        section.repeater = Some(RepeaterConfig {
            template_node_ids: vec!["longueur".into(), "rampant".into()],
            max_items: Some(3),
            add_button_label: Some("Ajouter un pan".into()),
        });
        doc.nodes.insert("toiture".into(), section);
        doc.nodes.insert("longueur".into(), node("longueur", Some("toiture")));
        doc.nodes.insert("rampant".into(), node("rampant", Some("toiture")));
        doc.nodes.insert("recap".into(), node("recap", None));
        doc.nodes.insert("disp-longueur".into(), node("disp-longueur", Some("recap")));
        doc.formulas.insert(
            "f-rampant".into(),
            Formula {
                id: "f-rampant".into(),
                node_id: "rampant".into(),
                name: None,
                tokens: json!(["@value.longueur", "*", 2]),
            },
        );
        doc.variables.insert(
            "v-longueur".into(),
            Variable {
                id: "v-longueur".into(),
                node_id: "longueur".into(),
                exposed_key: "longueur".into(),
                source_ref: "@value.longueur".into(),
                display_node_id: Some("disp-longueur".into()),
            },
        );
        doc
    }

    #[test]
    fn test_add_repetition_copies_all_templates_as_one_unit() {
        let mut doc = roof_doc();
        let outcome = add_repetition(&mut doc, "toiture").unwrap();

        assert_eq!(outcome.suffix, 1);
        assert_eq!(outcome.root_node_ids, vec!["longueur-1", "rampant-1"]);
        assert_eq!(doc.nodes["longueur-1"].parent_id.as_deref(), Some("toiture"));
        assert_eq!(
            doc.formulas["f-rampant-1"].tokens,
            json!(["@value.longueur-1", "*", 2])
        );
    }

    #[test]
    fn test_suffixes_increment_per_repetition() {
        let mut doc = roof_doc();
        assert_eq!(add_repetition(&mut doc, "toiture").unwrap().suffix, 1);
        assert_eq!(add_repetition(&mut doc, "toiture").unwrap().suffix, 2);
        assert!(doc.nodes.contains_key("rampant-2"));
    }

    #[test]
    fn test_no_created_node_is_parented_on_a_template() {
        let mut doc = roof_doc();
        let outcome = add_repetition(&mut doc, "toiture").unwrap();
        for id in &outcome.duplicated_node_ids {
            let parent = doc.nodes[id].parent_id.as_deref();
            assert!(
                parent != Some("longueur") && parent != Some("rampant"),
                "'{id}' still hangs off a template"
            );
        }
    }

    #[test]
    fn test_max_items_is_enforced() {
        let mut doc = roof_doc();
        for _ in 0..3 {
            add_repetition(&mut doc, "toiture").unwrap();
        }
        assert!(matches!(
            add_repetition(&mut doc, "toiture"),
            Err(RepeatError::MaxItemsReached { max: 3, .. })
        ));
    }

    #[test]
    fn test_suffixed_template_list_is_repaired() {
        let mut doc = roof_doc();
        add_repetition(&mut doc, "toiture").unwrap();
        // Corrupt the config the way a buggy save used to.
        doc.nodes
            .get_mut("toiture")
            .unwrap()
            .repeater
            .as_mut()
            .unwrap()
            .template_node_ids = vec!["longueur-1".into(), "rampant".into()];

        let outcome = add_repetition(&mut doc, "toiture").unwrap();
        assert_eq!(outcome.suffix, 2);
        // Derived from the base, not from copy 1.
        assert_eq!(
            doc.nodes["longueur-2"].copied_from.as_deref(),
            Some("longueur")
        );
        assert_eq!(
            doc.nodes["toiture"]
                .repeater
                .as_ref()
                .unwrap()
                .template_node_ids,
            vec!["longueur", "rampant"]
        );
    }

    #[test]
    fn test_remove_repetition_deletes_unit_and_display_nodes() {
        let mut doc = roof_doc();
        add_repetition(&mut doc, "toiture").unwrap();
        assert!(doc.nodes.contains_key("disp-longueur-1"));

        let outcome = remove_repetition(&mut doc, "longueur-1").unwrap();

        assert!(!doc.nodes.contains_key("longueur-1"));
        assert!(!doc.nodes.contains_key("rampant-1"));
        assert!(!doc.nodes.contains_key("disp-longueur-1"));
        assert!(!doc.formulas.contains_key("f-rampant-1"));
        assert!(!doc.variables.contains_key("v-longueur-1"));
        assert!(outcome.removed_node_ids.contains(&"disp-longueur-1".to_string()));
        // The originals survive.
        assert!(doc.nodes.contains_key("longueur"));
        assert!(doc.formulas.contains_key("f-rampant"));
    }

    #[test]
    fn test_remove_repetition_strips_dangling_link_ids() {
        let mut doc = roof_doc();
        add_repetition(&mut doc, "toiture").unwrap();
        doc.nodes
            .get_mut("recap")
            .unwrap()
            .linked_variable_ids
            .insert("v-longueur-1".into());

        remove_repetition(&mut doc, "rampant-1").unwrap();
        assert!(!doc.nodes["recap"].linked_variable_ids.contains("v-longueur-1"));
    }

    #[test]
    fn test_remove_whole_unit_from_any_sibling_root() {
        let mut doc = roof_doc();
        add_repetition(&mut doc, "toiture").unwrap();
        add_repetition(&mut doc, "toiture").unwrap();

        // Removing via the second template's root takes the whole unit,
        // and only that unit.
        remove_repetition(&mut doc, "rampant-1").unwrap();
        assert!(!doc.nodes.contains_key("longueur-1"));
        assert!(doc.nodes.contains_key("longueur-2"));
        assert!(doc.nodes.contains_key("rampant-2"));
    }

    #[test]
    fn test_remove_rejects_a_non_copy() {
        let mut doc = roof_doc();
        assert!(matches!(
            remove_repetition(&mut doc, "longueur"),
            Err(RepeatError::NotARepetition { .. })
        ));
    }

    #[test]
    fn test_non_repeater_is_rejected() {
        let mut doc = roof_doc();
        assert!(matches!(
            add_repetition(&mut doc, "recap"),
            Err(RepeatError::NotARepeater { .. })
        ));
    }
}
