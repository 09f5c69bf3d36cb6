// src/cli/handlers/tree.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use crate::core::{
    document_manager,
    tree_display::{self, DisplayOptions},
};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Displays a document's node hierarchy as a tree."
)]
struct TreeArgs {
    /// The document file to render.
    file: PathBuf,

    /// Render only the subtree under this node. Defaults to every root.
    node: Option<String>,

    /// Limit the depth of the tree display.
    #[arg(long, short)]
    depth: Option<usize>,

    /// Show node ids next to labels.
    #[arg(long, short)]
    ids: bool,
}

pub fn handle(args: Vec<String>) -> Result<()> {
    let tree_args = TreeArgs::try_parse_from(&args)?;

    let doc = document_manager::load_document(&tree_args.file)?;
    let options = DisplayOptions {
        show_ids: tree_args.ids,
        max_depth: tree_args.depth,
    };

    println!(
        "\n{}",
        format!("Tree of '{}':", tree_args.file.display()).cyan()
    );
    print!(
        "{}",
        tree_display::render_tree(&doc, tree_args.node.as_deref(), options)
    );
    Ok(())
}
