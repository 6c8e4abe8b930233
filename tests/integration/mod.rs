//! Integration tests for the kiln build core

mod build_pipeline;
mod cache_reload;
mod cli_contracts;
mod graph_hashing;
mod support;
