//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. Async work runs on a
//! runtime created per command; Ctrl-C cancels the running operation and
//! whatever finished before is still reported.

// Allow certain patterns that improve readability in CLI output formatting
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write as IoWrite};
use std::path::Path;

use chrono::Utc;

use crate::agent::config::{AgentConfig, AgentConfigBuilder};
use crate::agent::interview::InterviewState;
use crate::agent::orchestrator::AnalysisOptions;
use crate::agent::prompt::PromptSet;
use crate::cli::output::{
    OutputFormat, format_batch_event, format_batch_summary, format_plan, format_related,
    format_search_results,
};
use crate::cli::parser::{Cli, Commands, QueryArgs};
use crate::core::{
    CancellationToken, MAX_RESULT_LIMIT, ResultItem, SearchIntent, SourceKind, TimeWindow,
};
use crate::error::{CommandError, Result};
use crate::scout::{Scout, SearchResults};
use crate::search::{Catalog, SearchRunner, plan_intent};

/// Executes the CLI command.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Plan { query } => cmd_plan(query, format),
        Commands::Search {
            catalog,
            query,
            no_filter,
        } => cmd_search(cli, catalog, query, *no_filter, format),
        Commands::Interview {
            catalog,
            no_filter,
            max_turns,
        } => cmd_interview(cli, catalog, *no_filter, *max_turns, format),
        Commands::Analyze {
            catalog,
            ids,
            vision,
            concurrency,
            no_review,
        } => cmd_analyze(cli, catalog, ids, *vision, *concurrency, *no_review, format),
        Commands::Related {
            catalog,
            id,
            vision,
        } => cmd_related(cli, catalog, id, *vision, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Writes a progress line to stderr.
fn progress(line: &str) {
    let _ = writeln!(io::stderr(), "{line}");
}

/// Parses a comma list of source names; `all` selects every source.
fn parse_sources(names: &[String]) -> Result<BTreeSet<SourceKind>> {
    let mut sources = BTreeSet::new();
    for name in names {
        if name.trim().eq_ignore_ascii_case("all") {
            sources.extend(SourceKind::ALL);
            continue;
        }
        let source = SourceKind::parse(name).ok_or_else(|| {
            CommandError::InvalidArgument(format!(
                "unknown source '{name}' (expected paper, code, model-weights, model-code or all)"
            ))
        })?;
        sources.insert(source);
    }
    Ok(sources)
}

fn intent_from_args(query: &QueryArgs) -> Result<SearchIntent> {
    let window = TimeWindow::parse(&query.window).ok_or_else(|| {
        CommandError::InvalidArgument(format!("unrecognised time window '{}'", query.window))
    })?;
    if query.limit > MAX_RESULT_LIMIT {
        return Err(CommandError::InvalidArgument(format!(
            "limit {} exceeds the maximum of {MAX_RESULT_LIMIT}",
            query.limit
        ))
        .into());
    }
    let intent = SearchIntent::keywords(
        query.keywords.iter().cloned(),
        parse_sources(&query.sources)?,
        window,
        query.limit,
    );
    if intent.topics.is_empty() {
        return Err(CommandError::InvalidArgument("no non-empty keywords given".to_string()).into());
    }
    Ok(intent)
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    Ok(Catalog::load(path)?)
}

/// Explicit CLI values first; [`AgentConfigBuilder::from_env`] fills the rest.
fn config_builder(cli: &Cli) -> AgentConfigBuilder {
    let mut builder = AgentConfig::builder();
    if let Some(model) = &cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(dir) = &cli.prompt_dir {
        builder = builder.prompt_dir(dir.as_path());
    }
    builder.from_env()
}

fn build_config(builder: AgentConfigBuilder) -> Result<AgentConfig> {
    builder.build().map_err(|e| {
        CommandError::ExecutionFailed(format!("Agent configuration error: {e}")).into()
    })
}

fn build_scout(config: AgentConfig, catalog: &Catalog) -> Result<Scout> {
    Scout::new(config, catalog.registry()).map_err(|e| {
        CommandError::ExecutionFailed(format!("Provider creation failed: {e}")).into()
    })
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

/// Cancels `token` on Ctrl-C. Must be called inside the runtime.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            progress("Cancelling...");
            token.cancel();
        }
    });
}

fn resolve_items(catalog: &Catalog, ids: &[String]) -> Result<Vec<ResultItem>> {
    ids.iter()
        .map(|id| {
            catalog.find(id).cloned().ok_or_else(|| {
                CommandError::InvalidArgument(format!("no catalog item with id '{id}'")).into()
            })
        })
        .collect()
}

fn cmd_plan(query: &QueryArgs, format: OutputFormat) -> Result<String> {
    let intent = intent_from_args(query)?;
    let plan = plan_intent(&intent, Utc::now());
    Ok(format_plan(&intent, &plan, format))
}

fn cmd_search(
    cli: &Cli,
    catalog_path: &Path,
    query: &QueryArgs,
    no_filter: bool,
    format: OutputFormat,
) -> Result<String> {
    let intent = intent_from_args(query)?;
    let catalog = load_catalog(catalog_path)?;
    let plan = plan_intent(&intent, Utc::now());
    let rt = runtime()?;

    let results = if no_filter {
        // No model involved: no API key needed.
        let runner = SearchRunner::new(catalog.registry());
        rt.block_on(async {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(&cancel);
            SearchResults {
                search: runner.run(&plan, &cancel).await,
                filter: None,
            }
        })
    } else {
        let scout = build_scout(build_config(config_builder(cli))?, &catalog)?;
        rt.block_on(async {
            let cancel = scout.cancellation_token();
            cancel_on_ctrl_c(&cancel);
            scout.start_search(&intent, &plan, true, &cancel).await
        })
        .map_err(|e| CommandError::ExecutionFailed(format!("Search failed: {e}")))?
    };
    Ok(format_search_results(&results, format))
}

fn cmd_interview(
    cli: &Cli,
    catalog_path: &Path,
    no_filter: bool,
    max_turns: Option<usize>,
    format: OutputFormat,
) -> Result<String> {
    let catalog = load_catalog(catalog_path)?;
    let mut builder = config_builder(cli);
    if let Some(turns) = max_turns {
        builder = builder.interview_max_turns(turns);
    }
    let mut scout = build_scout(build_config(builder)?, &catalog)?;
    let rt = runtime()?;

    rt.block_on(async {
        let cancel = scout.cancellation_token();
        cancel_on_ctrl_c(&cancel);
        progress("What are you looking for? Describe your project and what you need.");

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        while scout.interview_state() == InterviewState::Collecting {
            let _ = write!(io::stderr(), "> ");
            let _ = io::stderr().flush();
            let Some(line) = lines.next().transpose()? else {
                return Err(CommandError::ExecutionFailed(
                    "input ended before the interview was complete".to_string(),
                )
                .into());
            };
            if line.trim().is_empty() {
                continue;
            }
            match scout.start_interview_turn(&line, &cancel).await {
                Ok(turn) if turn.state == InterviewState::Collecting => progress(&turn.reply),
                Ok(turn) => {
                    if !turn.reply.is_empty() {
                        progress(&turn.reply);
                    }
                }
                Err(e) if e.is_cancelled() || e.is_fatal() => {
                    return Err(CommandError::ExecutionFailed(format!("Interview failed: {e}")).into());
                }
                Err(e) => progress(&format!("That turn failed ({e}); please try again.")),
            }
        }

        let intent = scout
            .finalize_search(&cancel)
            .await
            .map_err(|e| CommandError::ExecutionFailed(format!("Search planning failed: {e}")))?;
        progress(&format!("Searching for: {}", intent.describe().replace('\n', "; ")));

        let plan = scout.plan_search(&intent);
        let results = scout
            .start_search(&intent, &plan, !no_filter, &cancel)
            .await
            .map_err(|e| CommandError::ExecutionFailed(format!("Search failed: {e}")))?;

        Ok(match format {
            OutputFormat::Text => format!(
                "{}\n\n{}",
                format_plan(&intent, &plan, format),
                format_search_results(&results, format)
            ),
            OutputFormat::Json => format.to_json(&serde_json::json!({
                "intent": intent,
                "plan": plan,
                "results": results,
            })),
        })
    })
}

fn cmd_analyze(
    cli: &Cli,
    catalog_path: &Path,
    ids: &[String],
    vision: bool,
    concurrency: Option<usize>,
    no_review: bool,
    format: OutputFormat,
) -> Result<String> {
    let catalog = load_catalog(catalog_path)?;
    let targets = resolve_items(&catalog, ids)?;
    let mut builder = config_builder(cli);
    if let Some(n) = concurrency {
        builder = builder.batch_concurrency(n);
    }
    if no_review {
        builder = builder.quality_review(false);
    }
    let scout = build_scout(build_config(builder)?, &catalog)?;
    let rt = runtime()?;

    let summary = rt.block_on(async {
        let cancel = scout.cancellation_token();
        cancel_on_ctrl_c(&cancel);
        let mut handle = scout.analyze(targets, AnalysisOptions { vision }, cancel);
        while let Some(event) = handle.next_event().await {
            if format != OutputFormat::Text {
                continue;
            }
            if let Some(line) = format_batch_event(&event) {
                progress(&line);
            }
        }
        handle.wait().await
    })?;
    Ok(format_batch_summary(&summary, format))
}

fn cmd_related(
    cli: &Cli,
    catalog_path: &Path,
    id: &str,
    vision: bool,
    format: OutputFormat,
) -> Result<String> {
    let catalog = load_catalog(catalog_path)?;
    let target = resolve_items(&catalog, &[id.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| CommandError::InvalidArgument(format!("no catalog item with id '{id}'")))?;
    let scout = build_scout(build_config(config_builder(cli))?, &catalog)?;
    let rt = runtime()?;

    let related = rt.block_on(async {
        let cancel = scout.cancellation_token();
        cancel_on_ctrl_c(&cancel);
        progress(&format!("Analyzing {}", target.target_id()));
        let analysis = scout
            .analyze_one(&target, AnalysisOptions { vision }, &cancel)
            .await?;
        progress("Searching related work");
        scout.find_related(&target, &analysis, &cancel).await
    })
    .map_err(|e| CommandError::ExecutionFailed(format!("Related analysis failed: {e}")))?;
    Ok(format_related(&related, format))
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(std::path::PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ))
            } else {
                let mut output = format!(
                    "Wrote {} prompt template(s) to: {}\n",
                    written.len(),
                    target_dir.display()
                );
                for path in &written {
                    output.push_str("  ");
                    output.push_str(
                        path.file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or("unknown"),
                    );
                    output.push('\n');
                }
                output.push_str("\nEdit these files to customize agent system prompts.\n");
                Ok(output)
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn query(args: &[&str]) -> QueryArgs {
        let mut argv = vec!["paper-scout", "plan"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap_or_else(|e| unreachable!("{e}")).command {
            Commands::Plan { query } => query,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_sources_all_expands() {
        let sources = parse_sources(&["all".to_string()]).unwrap_or_default();
        assert_eq!(sources.len(), 4);
        assert!(parse_sources(&["arxiv-ish".to_string()]).is_err());
    }

    #[test]
    fn test_intent_rejects_bad_window_and_limit() {
        assert!(intent_from_args(&query(&["rag", "-w", "someday"])).is_err());
        assert!(intent_from_args(&query(&["rag", "-l", "5000"])).is_err());
        assert!(intent_from_args(&query(&["rag", "-w", "past-month"])).is_ok());
    }

    #[test]
    fn test_plan_json_has_one_spec_per_source() {
        let out = cmd_plan(&query(&["rag", "-s", "paper,code", "-l", "10"]), OutputFormat::Json)
            .unwrap_or_default();
        let specs: serde_json::Value = serde_json::from_str(&out).unwrap_or_default();
        assert_eq!(specs.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_init_prompts_writes_then_skips() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let first = cmd_init_prompts(Some(dir.path()), OutputFormat::Text).unwrap_or_default();
        assert!(first.starts_with("Wrote"));
        let second = cmd_init_prompts(Some(dir.path()), OutputFormat::Text).unwrap_or_default();
        assert!(second.starts_with("All prompt templates already exist"));
    }
}
