// src/cli/handlers/remove.rs

use anyhow::{anyhow, Result};
use clap::Parser;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::PathBuf;

use crate::cli::handlers::commons;
use crate::core::repeater;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Removes the repetition a copied node belongs to. This is destructive."
)]
struct RemoveArgs {
    /// The document file to mutate.
    file: PathBuf,

    /// Any root node of the repetition to remove (e.g. 'rampant-2').
    root_id: String,

    /// Skip the confirmation prompt.
    #[arg(long, short)]
    yes: bool,
}

pub fn handle(args: Vec<String>) -> Result<()> {
    let remove_args = RemoveArgs::try_parse_from(&args)?;

    if !remove_args.yes {
        println!(
            "\n{}",
            format!(
                "This deletes the whole repetition containing '{}', its capabilities and display nodes.",
                remove_args.root_id
            )
            .red()
            .bold()
        );
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Continue?")
            .default(false)
            .interact()?;
        if !confirmed {
            return Err(anyhow!("Operation cancelled by user."));
        }
    }

    let outcome = commons::with_document(&remove_args.file, |state| {
        Ok(repeater::remove_repetition(state, &remove_args.root_id)?)
    })?;

    println!(
        "{}",
        format!(
            "Removed {} node(s), {} formula(s), {} condition(s), {} table(s), {} variable(s).",
            outcome.removed_node_ids.len(),
            outcome.removed_formula_ids.len(),
            outcome.removed_condition_ids.len(),
            outcome.removed_table_ids.len(),
            outcome.removed_variable_ids.len()
        )
        .green()
    );
    Ok(())
}
