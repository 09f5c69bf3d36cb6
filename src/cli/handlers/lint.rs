// src/cli/handlers/lint.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use crate::core::{
    aggregator,
    cache::{self, LintReport},
    document_manager,
};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Checks every node's links and references without modifying the document."
)]
struct LintArgs {
    /// The document file to lint.
    file: PathBuf,

    /// Recompute even when a valid cached report exists.
    #[arg(long, short)]
    force: bool,
}

pub fn handle(args: Vec<String>) -> Result<()> {
    let lint_args = LintArgs::try_parse_from(&args)?;

    if !lint_args.force {
        if let Some(report) = cache::read_lint_cache(&lint_args.file)? {
            print_report(&report, true);
            return Ok(());
        }
    }

    // The aggregation runs against a scratch copy; lint never touches
    // the document on disk.
    let doc = document_manager::load_document(&lint_args.file)?;
    let mut scratch = doc.clone();
    let reports = aggregator::aggregate_all(&mut scratch);
    let report = LintReport::from_aggregation(doc.nodes.len(), &reports);

    cache::write_lint_cache(&lint_args.file, &report)?;
    print_report(&report, false);
    Ok(())
}

fn print_report(report: &LintReport, cached: bool) {
    let suffix = if cached { " (cached)" } else { "" };
    println!(
        "\n{}",
        format!("Lint report for {} nodes{suffix}:", report.node_count).cyan()
    );

    if report.is_clean() {
        println!("{}", "  No problems found.".green());
        return;
    }

    if !report.unresolved.is_empty() {
        println!("\n  {}", "Unresolved references:".red().bold());
        for (node_id, refs) in &report.unresolved {
            for r in refs {
                println!("    • {node_id}: {}", r.red());
            }
        }
    }
    if !report.out_of_sync.is_empty() {
        println!(
            "\n  {}",
            "Nodes whose link sets are out of sync (run 'sync' to repair):".yellow()
        );
        for node_id in &report.out_of_sync {
            println!("    • {node_id}");
        }
    }
}
