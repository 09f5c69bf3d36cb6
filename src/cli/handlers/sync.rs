// src/cli/handlers/sync.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use crate::cli::handlers::commons;
use crate::core::aggregator;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Recomputes link sets and persists them back into the document."
)]
struct SyncArgs {
    /// The document file to synchronize.
    file: PathBuf,

    /// Synchronize only this node. Defaults to the whole document.
    node: Option<String>,
}

pub fn handle(args: Vec<String>) -> Result<()> {
    let sync_args = SyncArgs::try_parse_from(&args)?;

    let (changed, unresolved) = commons::with_document(&sync_args.file, |state| {
        let reports = match &sync_args.node {
            Some(node_id) => vec![aggregator::aggregate_dependencies(state, node_id)?],
            None => aggregator::aggregate_all(state),
        };
        let changed = reports.iter().filter(|r| r.changed).count();
        let unresolved: usize = reports.iter().map(|r| r.unresolved.len()).sum();
        Ok((changed, unresolved))
    })?;

    if changed == 0 {
        println!("{}", "Link sets already in sync.".green());
    } else {
        println!(
            "{}",
            format!("Synchronized link sets on {changed} node(s).").green()
        );
    }
    if unresolved > 0 {
        println!(
            "{}",
            format!("{unresolved} unresolved reference(s) recorded; see 'lint' for details.")
                .yellow()
        );
    }
    Ok(())
}
