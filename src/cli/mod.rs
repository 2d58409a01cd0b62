//! CLI layer for paper-scout.
//!
//! Provides the command-line interface using clap: query planning, catalog
//! search, the interview, batch analysis and related-work comparison.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, QueryArgs};
