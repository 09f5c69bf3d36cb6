// src/cli/handlers/cache.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use crate::core::cache;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Inspects or clears the lint cache stored next to a document."
)]
struct CacheArgs {
    /// The document file whose cache to inspect.
    file: PathBuf,

    /// Delete the cache instead of inspecting it.
    #[arg(long)]
    clear: bool,
}

pub fn handle(args: Vec<String>) -> Result<()> {
    let cache_args = CacheArgs::try_parse_from(&args)?;
    let path = cache::cache_path(&cache_args.file);

    if cache_args.clear {
        if cache::clear_lint_cache(&cache_args.file)? {
            println!("{}", format!("Removed '{}'.", path.display()).green());
        } else {
            println!("No lint cache to remove.");
        }
        return Ok(());
    }

    match cache::read_lint_cache(&cache_args.file)? {
        Some(report) => {
            println!(
                "{}",
                format!(
                    "Valid lint cache at '{}': {} nodes, {} unresolved, {} out of sync.",
                    path.display(),
                    report.node_count,
                    report.unresolved.values().map(|r| r.len()).sum::<usize>(),
                    report.out_of_sync.len()
                )
                .green()
            );
        }
        None => {
            println!(
                "{}",
                "Lint cache is missing or stale; 'lint' will recompute it.".yellow()
            );
        }
    }
    Ok(())
}
