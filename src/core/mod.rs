// src/core/mod.rs

pub mod aggregator;
pub mod cache;
pub mod copy_engine;
pub mod document_manager;
pub mod parser;
pub mod refs;
pub mod repeater;
pub mod tree_display;
