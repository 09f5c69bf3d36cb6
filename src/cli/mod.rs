// src/cli/mod.rs

use clap::Parser;

pub mod handlers;

/// arbor: a dependency-resolution and deep-copy engine for form trees.
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// The command followed by its arguments. Parsing of the individual
    /// command's flags happens inside its handler.
    #[arg()]
    pub args: Vec<String>,
}
