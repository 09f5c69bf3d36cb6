// src/cli/handlers/add.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use crate::cli::handlers::commons;
use crate::core::repeater;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Adds one repetition under a repeater node."
)]
struct AddArgs {
    /// The document file to mutate.
    file: PathBuf,

    /// The repeater node to append a repetition to.
    repeater_id: String,
}

pub fn handle(args: Vec<String>) -> Result<()> {
    let add_args = AddArgs::try_parse_from(&args)?;

    let outcome = commons::with_document(&add_args.file, |state| {
        Ok(repeater::add_repetition(state, &add_args.repeater_id)?)
    })?;

    println!(
        "{}",
        format!(
            "Added repetition {} under '{}' ({} node(s) created).",
            outcome.suffix,
            add_args.repeater_id,
            outcome.duplicated_node_ids.len()
        )
        .green()
    );
    for root in &outcome.root_node_ids {
        println!("  • {root}");
    }
    Ok(())
}
