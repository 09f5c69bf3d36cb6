// src/core/parser.rs

use crate::constants::MAX_SCAN_DEPTH;
use crate::core::refs::{NodeRef, RefKind, REFERENCE_RE};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Extracts every typed reference embedded in a string. A string may
/// carry several references (`"@value.a * @value.b"`).
pub fn scan_str(raw: &str, out: &mut BTreeSet<NodeRef>) {
    for caps in REFERENCE_RE.captures_iter(raw) {
        let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let id = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if let Some(reference) = NodeRef::parse(&format!("{prefix}{id}")) {
            out.insert(reference);
        }
    }
}

/// Scans an arbitrary JSON payload (formula tokens, a condition tree,
/// table metadata, node config) and returns the set of every reference
/// found, duplicates collapsed.
///
/// The walk is iterative (an explicit worklist instead of recursion),
/// so a pathologically deep payload degrades into a skipped branch at
/// the depth guard rather than a stack overflow. Object keys are scanned
/// too: the builder UI keys some instance maps by identifier.
pub fn scan_references(value: &Value) -> BTreeSet<NodeRef> {
    let mut found = BTreeSet::new();
    let mut worklist: Vec<(&Value, usize)> = vec![(value, 0)];

    while let Some((current, depth)) = worklist.pop() {
        if depth >= MAX_SCAN_DEPTH {
            log::warn!("reference scan: payload deeper than {MAX_SCAN_DEPTH}, branch skipped");
            continue;
        }
        match current {
            Value::String(s) => scan_str(s, &mut found),
            Value::Array(items) => {
                for item in items {
                    worklist.push((item, depth + 1));
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    scan_str(key, &mut found);
                    worklist.push((item, depth + 1));
                }
            }
            _ => {}
        }
    }
    found
}

/// Per-kind identifier maps used to rewrite references inside a payload.
///
/// An id absent from its map is left byte-for-byte untouched; that is
/// how shared/global references survive a copy unchanged.
#[derive(Debug, Clone, Copy)]
pub struct RefRewriter<'a> {
    pub nodes: &'a HashMap<String, String>,
    pub formulas: &'a HashMap<String, String>,
    pub conditions: &'a HashMap<String, String>,
    pub tables: &'a HashMap<String, String>,
}

impl<'a> RefRewriter<'a> {
    fn lookup(&self, kind: RefKind, id: &str) -> Option<&'a String> {
        match kind {
            RefKind::Field => self.nodes.get(id),
            RefKind::Formula => self.formulas.get(id),
            RefKind::Condition => self.conditions.get(id),
            RefKind::Table => self.tables.get(id),
        }
    }

    /// Maps a bare node id (no prefix grammar) through the node map.
    pub fn rewrite_plain_node_id(&self, id: &str) -> String {
        self.nodes.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    /// Rewrites every embedded reference whose id maps, preserving the
    /// original prefix spelling. A string that is exactly a mapped node
    /// id (a bare link target) is rewritten as well.
    pub fn rewrite_str(&self, raw: &str) -> String {
        if let Some(mapped) = self.nodes.get(raw) {
            return mapped.clone();
        }
        REFERENCE_RE
            .replace_all(raw, |caps: &regex::Captures<'_>| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let id = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                let kind = NodeRef::parse(&format!("{prefix}{id}")).map(|r| r.kind);
                match kind.and_then(|k| self.lookup(k, id)) {
                    Some(new_id) => format!("{prefix}{new_id}"),
                    None => format!("{prefix}{id}"),
                }
            })
            .into_owned()
    }

    /// Rewrites a whole JSON payload, strings and object keys included.
    pub fn rewrite_value(&self, value: &Value) -> Value {
        self.rewrite_value_at(value, 0)
    }

    fn rewrite_value_at(&self, value: &Value, depth: usize) -> Value {
        if depth >= MAX_SCAN_DEPTH {
            log::warn!("reference rewrite: payload deeper than {MAX_SCAN_DEPTH}, branch kept as-is");
            return value.clone();
        }
        match value {
            Value::String(s) => Value::String(self.rewrite_str(s)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.rewrite_value_at(item, depth + 1))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| {
                        (self.rewrite_str(key), self.rewrite_value_at(item, depth + 1))
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(id: &str) -> NodeRef {
        NodeRef::new(RefKind::Field, id)
    }

    #[test]
    fn test_scan_formula_tokens() {
        let tokens = json!(["@value.longueur-toiture", "*", "@value.largeur-toiture", 2]);
        let refs = scan_references(&tokens);
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&field("longueur-toiture")));
        assert!(refs.contains(&field("largeur-toiture")));
    }

    #[test]
    fn test_scan_condition_tree_with_mixed_kinds() {
        let condition_set = json!({
            "branches": [{
                "when": { "ref": "@value.surface", "op": "gt", "value": 10 },
                "then": { "tokens": ["node-formula:prix-m2"] }
            }],
            "fallback": { "tokens": ["condition:repli", "@table.grille-tarifs"] }
        });
        let refs = scan_references(&condition_set);
        assert!(refs.contains(&field("surface")));
        assert!(refs.contains(&NodeRef::new(RefKind::Formula, "prix-m2")));
        assert!(refs.contains(&NodeRef::new(RefKind::Condition, "repli")));
        assert!(refs.contains(&NodeRef::new(RefKind::Table, "grille-tarifs")));
    }

    #[test]
    fn test_scan_collapses_duplicates_and_scans_keys() {
        let payload = json!({
            "@table.grille": { "a": "@value.x" },
            "tokens": ["@value.x", "@value.x"]
        });
        let refs = scan_references(&payload);
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_scan_survives_deep_nesting() {
        let mut payload = json!("@value.leaf");
        for _ in 0..1_000 {
            payload = json!([payload]);
        }
        // Deeper than the guard: the branch is skipped, not overflowed.
        assert!(scan_references(&payload).is_empty());
    }

    fn maps_with_node(old: &str, new: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(old.to_string(), new.to_string());
        map
    }

    #[test]
    fn test_rewrite_maps_only_known_ids() {
        let nodes = maps_with_node("longueur-toiture", "longueur-toiture-1");
        let empty = HashMap::new();
        let rewriter = RefRewriter {
            nodes: &nodes,
            formulas: &empty,
            conditions: &empty,
            tables: &empty,
        };

        let tokens = json!(["@value.longueur-toiture", "+", "@value.shared-ref-42"]);
        let rewritten = rewriter.rewrite_value(&tokens);
        assert_eq!(
            rewritten,
            json!(["@value.longueur-toiture-1", "+", "@value.shared-ref-42"])
        );
    }

    #[test]
    fn test_rewrite_then_scan_round_trip() {
        // Rewriting under a suffix and re-scanning must yield exactly the
        // suffixed ids and no others.
        let nodes = maps_with_node("a", "a-1");
        let mut formulas = HashMap::new();
        formulas.insert("f".to_string(), "f-1".to_string());
        let empty = HashMap::new();
        let rewriter = RefRewriter {
            nodes: &nodes,
            formulas: &formulas,
            conditions: &empty,
            tables: &empty,
        };

        let payload = json!({ "tokens": ["@value.a", "node-formula:f", "@value.shared-ref-42"] });
        let refs = scan_references(&rewriter.rewrite_value(&payload));

        let expected: BTreeSet<NodeRef> = [
            field("a-1"),
            NodeRef::new(RefKind::Formula, "f-1"),
            field("shared-ref-42"),
        ]
        .into_iter()
        .collect();
        assert_eq!(refs, expected);
    }

    #[test]
    fn test_rewrite_bare_link_target() {
        let nodes = maps_with_node("target-node", "target-node-3");
        let empty = HashMap::new();
        let rewriter = RefRewriter {
            nodes: &nodes,
            formulas: &empty,
            conditions: &empty,
            tables: &empty,
        };
        let config = json!({ "link": { "target_node_id": "target-node" } });
        assert_eq!(
            rewriter.rewrite_value(&config),
            json!({ "link": { "target_node_id": "target-node-3" } })
        );
    }

    #[test]
    fn test_rewrite_preserves_legacy_spelling() {
        let mut tables = HashMap::new();
        tables.insert("t".to_string(), "t-2".to_string());
        let empty = HashMap::new();
        let rewriter = RefRewriter {
            nodes: &empty,
            formulas: &empty,
            conditions: &empty,
            tables: &tables,
        };
        assert_eq!(rewriter.rewrite_str("node-table:t"), "node-table:t-2");
        assert_eq!(rewriter.rewrite_str("table:t"), "table:t-2");
    }
}
