//! Related-research analysis.
//!
//! Second-order analysis of an already analyzed target: keywords from its
//! report, a paper search over the past three years, a filter pass, then a
//! comparison task (technique and experimental-setup deltas) synthesized
//! into a report keyed to the original target.

use std::fmt::Write;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config::AgentConfig;
use super::filter::{FilterAgent, FilteredItem};
use super::finding::{ReportKind, SynthesizedReport};
use super::gateway::CompletionGateway;
use super::json::parse_lenient;
use super::message::TokenUsage;
use super::orchestrator::{LeafInput, Orchestrator};
use super::prompt::{PromptKind, PromptSet, build_keywords_prompt};
use super::role::AgentRole;
use super::task::{AnalysisTask, Subtask};
use super::traits::Agent;
use crate::core::{
    CancellationToken, ResultItem, SearchIntent, SourceKind, TimeWindow, ensure_active,
};
use crate::error::AgentError;
use crate::search::{SearchRunner, plan_intent};

/// Recency window of the related-work search, in days (three years).
pub const RELATED_WINDOW_DAYS: u32 = 1095;

/// Candidates fetched before filtering.
pub const RELATED_SEARCH_LIMIT: usize = 30;

/// Keywords kept from the keyword agent.
const MAX_KEYWORDS: usize = 8;

/// Related works shown to the comparison specialists.
const MAX_RELATED_IN_PROMPT: usize = 10;

/// Report characters shown to the keyword agent.
const KEYWORD_REPORT_CHARS: usize = 8_000;

const RELATED_SUMMARY_CHARS: usize = 400;

#[derive(Debug, Deserialize)]
struct RawKeywords {
    #[serde(default)]
    keywords: Vec<String>,
}

/// Agent that derives search keywords from a finished report.
pub struct KeywordAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

#[async_trait]
impl Agent for KeywordAgent {
    fn name(&self) -> &'static str {
        "keywords"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

impl KeywordAgent {
    /// Creates a keyword agent.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            model: config.planner_model.clone(),
            max_tokens: config.planner_max_tokens,
            system_prompt: prompts.get(PromptKind::Keywords).to_string(),
        }
    }

    /// Extracts keywords for `target` from its report text.
    ///
    /// Prose replies are read line by line; an unusable reply falls back to
    /// the target title.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] and fatal configuration faults.
    pub async fn extract(
        &self,
        gateway: &CompletionGateway,
        target: &ResultItem,
        report: &str,
        cancel: &CancellationToken,
    ) -> Result<(Vec<String>, TokenUsage), AgentError> {
        let excerpt: String = report.chars().take(KEYWORD_REPORT_CHARS).collect();
        let user_msg = build_keywords_prompt(&target.header(), &excerpt);
        let response = match self.execute(gateway, &user_msg, cancel).await {
            Ok(response) => response,
            Err(e) if e.is_cancelled() || e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(target = %target.target_id(), error = %e, "Keyword extraction failed, using title");
                return Ok((vec![target.title.clone()], TokenUsage::default()));
            }
        };

        let mut keywords = parse_lenient::<RawKeywords>(&response.content, "keywords")
            .map(|raw| raw.keywords)
            .unwrap_or_else(|_| keyword_lines(&response.content));
        keywords = dedupe_keywords(keywords);
        if keywords.is_empty() {
            keywords.push(target.title.clone());
        }
        Ok((keywords, response.usage))
    }
}

/// Leading list marker: bullet or `1.` / `1)` numbering.
static LIST_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*\u{2022}]|\d+[.)])\s+").ok());

/// Reads one keyword per line, stripping list markers and quotes.
fn keyword_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = match LIST_MARKER.as_ref() {
                Some(re) => re.replace(line, ""),
                None => line.into(),
            };
            line.trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == ',')
                .to_string()
        })
        .filter(|line| !line.is_empty() && !line.ends_with(':') && line.split_whitespace().count() <= 6)
        .collect()
}

fn dedupe_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for keyword in keywords {
        let keyword = keyword.trim().to_string();
        if keyword.is_empty() || out.iter().any(|k| k.eq_ignore_ascii_case(&keyword)) {
            continue;
        }
        out.push(keyword);
        if out.len() == MAX_KEYWORDS {
            break;
        }
    }
    out
}

/// Comparison of one target against recent related work.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedReport {
    /// The original target.
    pub target_id: String,
    /// Keywords used for the search.
    pub keywords: Vec<String>,
    /// Related works kept by the filter, best first.
    pub related: Vec<FilteredItem>,
    /// The filter degraded to the unranked candidate list.
    pub filter_degraded: bool,
    /// Comparison report, keyed to the original target.
    pub report: SynthesizedReport,
}

/// Runs the related-research analysis of `target`.
///
/// `analysis` is the target's own finished report.
///
/// # Errors
///
/// Returns [`AgentError::Cancelled`] when cancelled before the comparison
/// could start, and fatal configuration faults.
pub async fn find_related(
    orchestrator: &Orchestrator,
    runner: &SearchRunner,
    target: &ResultItem,
    analysis: &SynthesizedReport,
    cancel: &CancellationToken,
) -> Result<RelatedReport, AgentError> {
    ensure_active(cancel)?;
    let config = orchestrator.config();
    let prompts = orchestrator.prompts();
    let gateway = orchestrator.controller().gateway();
    let report_text = analysis.to_markdown();
    let mut usage = TokenUsage::default();

    let (keywords, keyword_usage) = KeywordAgent::new(config, prompts)
        .extract(gateway, target, &report_text, cancel)
        .await?;
    usage.accumulate(keyword_usage);

    let mut intent = SearchIntent::keywords(
        keywords.iter().cloned(),
        [SourceKind::Paper],
        TimeWindow::Days(RELATED_WINDOW_DAYS),
        RELATED_SEARCH_LIMIT,
    );
    intent
        .notes
        .insert("related to".to_string(), target.title.clone());

    let outcome = runner.run(&plan_intent(&intent, Utc::now()), cancel).await;
    if outcome.cancelled {
        return Err(AgentError::Cancelled);
    }
    let own_title = target.normalized_title();
    let candidates: Vec<ResultItem> = outcome
        .items
        .into_iter()
        .filter(|item| item.target_id() != target.target_id() && item.normalized_title() != own_title)
        .collect();

    let filtered = FilterAgent::new(config, prompts)
        .filter(gateway, &candidates, &intent, cancel)
        .await?;
    usage.accumulate(filtered.usage);
    info!(
        target = %target.target_id(),
        keywords = keywords.len(),
        candidates = candidates.len(),
        related = filtered.items.len(),
        "Related works selected"
    );

    let related_text = related_listing(&filtered.items);
    let task = AnalysisTask::fan_out(
        target.clone(),
        vec![
            Subtask::leaf(AgentRole::TechniqueComparison, None),
            Subtask::leaf(AgentRole::ExperimentComparison, None),
        ],
        Some(format!(
            "Comparison with {} related works from the past three years",
            filtered.items.len().min(MAX_RELATED_IN_PROMPT)
        )),
    );
    let mut report = orchestrator
        .run_task(
            &task,
            LeafInput::Comparison {
                report: &report_text,
                related: &related_text,
            },
            ReportKind::Related,
            cancel,
        )
        .await?;
    report.usage.accumulate(usage);

    Ok(RelatedReport {
        target_id: target.target_id(),
        keywords,
        related: filtered.items,
        filter_degraded: filtered.degraded,
        report,
    })
}

fn related_listing(related: &[FilteredItem]) -> String {
    if related.is_empty() {
        return "No related works were found in the past three years.".to_string();
    }
    let mut out = String::new();
    for (i, f) in related.iter().take(MAX_RELATED_IN_PROMPT).enumerate() {
        let _ = write!(out, "[{}] {}", i + 1, f.item.title);
        if let Some(date) = f.item.metadata.latest_date() {
            let _ = write!(out, " ({})", date.format("%Y-%m-%d"));
        }
        out.push('\n');
        let summary: String = f.item.summary.chars().take(RELATED_SUMMARY_CHARS).collect();
        if !summary.trim().is_empty() {
            let _ = writeln!(out, "    {}", summary.trim());
        }
    }
    out
}
