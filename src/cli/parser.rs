//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// paper-scout: find and analyze papers, repositories and model cards.
///
/// Interviews you about what you need, plans a multi-source search, filters
/// the results with an LLM and runs multi-agent analyses.
#[derive(Parser, Debug)]
#[command(name = "paper-scout")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Model for analysis agents (overrides `SCOUT_MODEL`).
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Directory containing prompt template files.
    #[arg(long, global = true)]
    pub prompt_dir: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Keyword search parameters shared by `plan` and `search`.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Search keywords.
    #[arg(required = true, num_args = 1..)]
    pub keywords: Vec<String>,

    /// Sources to query (paper, code, model-weights, model-code, all).
    #[arg(short, long, value_delimiter = ',', default_value = "paper")]
    pub sources: Vec<String>,

    /// Time window (yesterday, past_week, past_month, past_3months,
    /// past_year, a day count like `45d`, or `2024-01-01..2024-06-30`).
    #[arg(short, long, default_value = "past_year")]
    pub window: String,

    /// Maximum number of results (at most 2000).
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the per-source query plan for a keyword search.
    ///
    /// Pure and offline: no model or source is contacted.
    #[command(after_help = r#"Examples:
  paper-scout plan "retrieval-augmented generation" -w past_month -l 50
  paper-scout plan rag agents -s paper,code -l 100
  paper-scout --format json plan diffusion -s all | jq '.[].limit'
"#)]
    Plan {
        /// Query parameters.
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Search a catalog and filter the results against the keywords.
    #[command(after_help = r#"Examples:
  paper-scout search -c catalog.json "graph rag" -w past_3months
  paper-scout search -c catalog.json rag --no-filter
"#)]
    Search {
        /// JSON catalog file serving as the source connectors.
        #[arg(short, long, env = "SCOUT_CATALOG")]
        catalog: PathBuf,

        /// Query parameters.
        #[command(flatten)]
        query: QueryArgs,

        /// Skip the LLM filter pass.
        #[arg(long)]
        no_filter: bool,
    },

    /// Interactive interview, then a filtered catalog search.
    ///
    /// Reads replies from stdin; questions are written to stderr.
    Interview {
        /// JSON catalog file serving as the source connectors.
        #[arg(short, long, env = "SCOUT_CATALOG")]
        catalog: PathBuf,

        /// Skip the LLM filter pass.
        #[arg(long)]
        no_filter: bool,

        /// Maximum user turns before the search is planned.
        #[arg(long)]
        max_turns: Option<usize>,
    },

    /// Analyze catalog items with the multi-agent pipeline.
    #[command(after_help = r#"Examples:
  paper-scout analyze -c catalog.json paper:2401.00001
  paper-scout analyze -c catalog.json 2401.00001 org/repo --concurrency 2
  paper-scout analyze -c catalog.json 2401.00001 --vision --no-review
"#)]
    Analyze {
        /// JSON catalog file serving as the source connectors.
        #[arg(short, long, env = "SCOUT_CATALOG")]
        catalog: PathBuf,

        /// Item identifiers (`source:id` or bare id).
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,

        /// Add a vision leaf for items with images.
        #[arg(long)]
        vision: bool,

        /// Targets analyzed at once.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Skip the quality review of syntheses.
        #[arg(long)]
        no_review: bool,
    },

    /// Analyze one item, then compare it against related work.
    Related {
        /// JSON catalog file serving as the source connectors.
        #[arg(short, long, env = "SCOUT_CATALOG")]
        catalog: PathBuf,

        /// Item identifier (`source:id` or bare id).
        id: String,

        /// Add a vision leaf when the item has images.
        #[arg(long)]
        vision: bool,
    },

    /// Write default prompt templates to a directory.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  paper-scout init-prompts                   # ~/.config/paper-scout/prompts
  paper-scout init-prompts --dir ./prompts
"#)]
    InitPrompts {
        /// Target directory.
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plan_parses_sources_list() {
        let cli = Cli::try_parse_from([
            "paper-scout",
            "plan",
            "rag",
            "agents",
            "-s",
            "paper,code",
            "-l",
            "100",
        ])
        .unwrap_or_else(|e| unreachable!("{e}"));
        let Commands::Plan { query } = cli.command else {
            unreachable!()
        };
        assert_eq!(query.keywords, vec!["rag", "agents"]);
        assert_eq!(query.sources, vec!["paper", "code"]);
        assert_eq!(query.limit, 100);
    }

    #[test]
    fn test_global_format_after_subcommand() {
        let cli = Cli::try_parse_from(["paper-scout", "init-prompts", "--format", "json"])
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(cli.format, "json");
    }

    #[test]
    fn test_analyze_requires_ids() {
        assert!(Cli::try_parse_from(["paper-scout", "analyze", "-c", "x.json"]).is_err());
    }
}
