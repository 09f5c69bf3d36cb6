// src/bin/arbor.rs

use anyhow::{anyhow, Result};
use arbor::cli::{handlers, Cli};
use clap::Parser;
use colored::Colorize;

// --- Command Definition and Registry ---

/// Defines a command, its aliases, and its handler. The signature is
/// kept consistent across all commands for simplicity in the registry.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>) -> Result<()>,
}

/// The single source of truth for all commands. To add a new command,
/// add an entry here and a module under `cli/handlers`.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "add",
        aliases: &[],
        handler: handlers::add::handle,
    },
    CommandDefinition {
        name: "cache",
        aliases: &[],
        handler: handlers::cache::handle,
    },
    CommandDefinition {
        name: "info",
        aliases: &[],
        handler: handlers::info::handle,
    },
    CommandDefinition {
        name: "lint",
        aliases: &["check"],
        handler: handlers::lint::handle,
    },
    CommandDefinition {
        name: "remove",
        aliases: &["rm"],
        handler: handlers::remove::handle,
    },
    CommandDefinition {
        name: "sync",
        aliases: &[],
        handler: handlers::sync::handle,
    },
    CommandDefinition {
        name: "tree",
        aliases: &["ls"],
        handler: handlers::tree::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        eprintln!("\n{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Routes the raw argument list to the matching handler.
fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let mut args = cli.args.into_iter();
    let Some(action) = args.next() else {
        println!("Usage: arbor <command> <file> [args...]");
        println!("Commands: {}", command_names().join(", "));
        return Ok(());
    };

    match find_command(&action) {
        Some(command) => (command.handler)(args.collect()),
        None => Err(anyhow!(
            "Unknown command '{}'. Available commands: {}.",
            action,
            command_names().join(", ")
        )),
    }
}

fn command_names() -> Vec<&'static str> {
    COMMAND_REGISTRY.iter().map(|cmd| cmd.name).collect()
}
