// src/cli/handlers/info.rs

use anyhow::{anyhow, Result};
use clap::Parser;
use colored::Colorize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::core::document_manager;
use crate::models::NodeKind;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Shows everything known about one node: links, capabilities, provenance."
)]
struct InfoArgs {
    /// The document file.
    file: PathBuf,

    /// The node to inspect.
    node_id: String,
}

pub fn handle(args: Vec<String>) -> Result<()> {
    let info_args = InfoArgs::try_parse_from(&args)?;

    let doc = document_manager::load_document(&info_args.file)?;
    let node = doc
        .nodes
        .get(&info_args.node_id)
        .ok_or_else(|| anyhow!("Node '{}' not found in document.", info_args.node_id))?;

    let kind = match node.kind {
        NodeKind::Branch => "branch",
        NodeKind::Section => "section",
        NodeKind::Leaf => "leaf",
    };

    println!("\n{}", format!("Node '{}'", node.id).cyan().bold());
    println!("  Kind:    {kind}");
    if let Some(label) = &node.label {
        println!("  Label:   {label}");
    }
    if let Some(parent) = &node.parent_id {
        println!("  Parent:  {parent}");
    }
    println!("  Order:   {}", node.order);
    if node.shared_reference {
        println!("  {}", "Shared reference (exempt from copying)".yellow());
    }
    if let Some(config) = &node.repeater {
        println!(
            "  Repeater: templates [{}]{}",
            config.template_node_ids.join(", "),
            config
                .max_items
                .map(|m| format!(", max {m}"))
                .unwrap_or_default()
        );
    }
    if let Some(source) = &node.copied_from {
        println!(
            "  Copy:    of '{}' (suffix {})",
            source,
            node.copy_suffix
                .map(|s| s.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
    }

    print_set("Owned formulas", &doc.formulas_of(&node.id));
    print_set("Owned conditions", &doc.conditions_of(&node.id));
    print_set("Owned tables", &doc.tables_of(&node.id));
    print_set("Owned variables", &doc.variables_of(&node.id));

    print_linked("Linked formulas", &node.linked_formula_ids);
    print_linked("Linked conditions", &node.linked_condition_ids);
    print_linked("Linked tables", &node.linked_table_ids);
    print_linked("Linked variables", &node.linked_variable_ids);

    if !node.unresolved_refs.is_empty() {
        println!("\n  {}", "Unresolved references:".red().bold());
        for r in &node.unresolved_refs {
            println!("    • {}", r.red());
        }
    }
    Ok(())
}

fn print_set(title: &str, ids: &[String]) {
    if !ids.is_empty() {
        println!("  {}: {}", title, ids.join(", "));
    }
}

fn print_linked(title: &str, ids: &BTreeSet<String>) {
    if !ids.is_empty() {
        let joined: Vec<&str> = ids.iter().map(String::as_str).collect();
        println!("  {}: {}", title, joined.join(", "));
    }
}
