// src/cli/handlers/mod.rs

// One module per CLI command, plus shared plumbing in `commons`.

pub mod commons;

pub mod add;
pub mod cache;
pub mod info;
pub mod lint;
pub mod remove;
pub mod sync;
pub mod tree;
