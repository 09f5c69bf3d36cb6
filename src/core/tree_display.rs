// src/core/tree_display.rs

use crate::models::{Node, NodeKind, TreeDocument};
use std::collections::HashMap;

/// Rendering switches for the ASCII tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayOptions {
    /// Print node ids next to labels.
    pub show_ids: bool,
    /// Stop descending below this depth (root is depth 0).
    pub max_depth: Option<usize>,
}

/// Renders the document as an ASCII tree, starting from `start_node_id`
/// when given, otherwise from every root node.
///
/// Repeaters are marked `(rep)`, copies carry their suffix, and a node
/// with unresolved references is flagged `(!)` so a quick `tree` run
/// doubles as a health glance.
pub fn render_tree(
    doc: &TreeDocument,
    start_node_id: Option<&str>,
    options: DisplayOptions,
) -> String {
    if doc.nodes.is_empty() {
        return "Document contains no nodes.\n".to_string();
    }

    // Relationship map first; children sorted by order then id, the
    // same ordering the engine itself uses.
    let mut children_map: HashMap<Option<&str>, Vec<&Node>> = HashMap::new();
    for node in doc.nodes.values() {
        children_map
            .entry(node.parent_id.as_deref())
            .or_default()
            .push(node);
    }
    for children in children_map.values_mut() {
        children.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    }

    let mut out = String::new();
    match start_node_id {
        Some(start) => match doc.nodes.get(start) {
            Some(node) => {
                out.push_str(&format_node(node, options));
                out.push('\n');
                render_children(node, &children_map, "", 1, options, &mut out);
            }
            None => {
                out.push_str(&format!("Node '{start}' not found in document.\n"));
            }
        },
        None => {
            let mut roots: Vec<&Node> = doc
                .nodes
                .values()
                .filter(|n| {
                    n.parent_id
                        .as_deref()
                        .is_none_or(|p| !doc.nodes.contains_key(p))
                })
                .collect();
            roots.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
            for root in roots {
                out.push_str(&format_node(root, options));
                out.push('\n');
                render_children(root, &children_map, "", 1, options, &mut out);
            }
        }
    }
    out
}

fn render_children(
    node: &Node,
    children_map: &HashMap<Option<&str>, Vec<&Node>>,
    prefix: &str,
    depth: usize,
    options: DisplayOptions,
    out: &mut String,
) {
    if options.max_depth.is_some_and(|max| depth > max) {
        return;
    }
    let Some(children) = children_map.get(&Some(node.id.as_str())) else {
        return;
    };
    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        let connector = if is_last { "└─ " } else { "├─ " };
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(&format_node(child, options));
        out.push('\n');

        let child_prefix = format!("{}{}", prefix, if is_last { "   " } else { "│  " });
        render_children(child, children_map, &child_prefix, depth + 1, options, out);
    }
}

fn format_node(node: &Node, options: DisplayOptions) -> String {
    let kind = match node.kind {
        NodeKind::Branch => "branch",
        NodeKind::Section => "section",
        NodeKind::Leaf => "leaf",
    };
    let mut line = format!("{} [{}]", node.label.as_deref().unwrap_or(&node.id), kind);
    if options.show_ids {
        line.push_str(&format!(" <{}>", node.id));
    }
    if node.repeater.is_some() {
        line.push_str(" (rep)");
    }
    if let Some(suffix) = node.copy_suffix {
        line.push_str(&format!(" (copy {suffix})"));
    }
    if !node.unresolved_refs.is_empty() {
        line.push_str(" (!)");
    }
    line
}

// MARK: --- UNIT TESTS ---
