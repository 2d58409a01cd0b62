//! Result filter agent.
//!
//! One completion request grades a candidate set against the search intent.
//! Only candidates the model lists are kept. When the response cannot be
//! parsed the unfiltered set is returned with `degraded` set, so callers can
//! show an unranked list instead of nothing.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::gateway::CompletionGateway;
use super::json::parse_lenient;
use super::message::TokenUsage;
use super::prompt::{PromptKind, PromptSet, build_filter_prompt};
use super::traits::Agent;
use crate::core::{CancellationToken, Relevance, ResultItem, SearchIntent, ensure_active};
use crate::error::AgentError;

/// Summary characters per candidate in the filter prompt.
const FILTER_SUMMARY_CHARS: usize = 200;

/// A candidate kept by the filter.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredItem {
    /// The candidate.
    pub item: ResultItem,
    /// Grade assigned by the model.
    pub relevance: Relevance,
    /// Model's stated reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Output of one filter pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterResult {
    /// Kept candidates, best first.
    pub items: Vec<FilteredItem>,
    /// The response was unusable and `items` is the unranked input.
    pub degraded: bool,
    /// Tokens spent.
    pub usage: TokenUsage,
}

impl FilterResult {
    fn degraded(candidates: &[ResultItem], usage: TokenUsage) -> Self {
        Self {
            items: candidates
                .iter()
                .map(|item| FilteredItem {
                    item: item.clone(),
                    relevance: Relevance::default(),
                    reason: None,
                })
                .collect(),
            degraded: true,
            usage,
        }
    }

    /// The kept result items, in ranked order.
    #[must_use]
    pub fn result_items(&self) -> Vec<ResultItem> {
        self.items.iter().map(|f| f.item.clone()).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSelection {
    Wrapped { selected: Vec<RawPick> },
    Bare(Vec<RawPick>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPick {
    Index(usize),
    Graded {
        index: usize,
        #[serde(default)]
        relevance: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Agent that curates search results against an intent.
pub struct FilterAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

#[async_trait]
impl Agent for FilterAgent {
    fn name(&self) -> &'static str {
        "filter"
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

impl FilterAgent {
    /// Creates a filter agent.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            model: config.planner_model.clone(),
            max_tokens: config.planner_max_tokens,
            system_prompt: prompts.get(PromptKind::Filter).to_string(),
        }
    }

    /// Filters `candidates` against `intent`.
    ///
    /// Invalid or repeated indices and `none` grades are dropped. The
    /// result is ranked by grade, then by the model's order.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] on cancellation and fatal
    /// configuration faults; other failures degrade.
    pub async fn filter(
        &self,
        gateway: &CompletionGateway,
        candidates: &[ResultItem],
        intent: &SearchIntent,
        cancel: &CancellationToken,
    ) -> Result<FilterResult, AgentError> {
        ensure_active(cancel)?;
        if candidates.is_empty() {
            return Ok(FilterResult::default());
        }

        let lines: Vec<String> = candidates
            .iter()
            .enumerate()
            .map(|(i, item)| item.compact_json(i, FILTER_SUMMARY_CHARS))
            .collect();
        let user_msg = build_filter_prompt(&intent.describe(), &lines);

        let response = match self.execute(gateway, &user_msg, cancel).await {
            Ok(response) => response,
            Err(e) if e.is_cancelled() || e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Filter call failed, returning unfiltered results");
                return Ok(FilterResult::degraded(candidates, TokenUsage::default()));
            }
        };

        let selection = match parse_lenient::<RawSelection>(&response.content, "filter selection") {
            Ok(RawSelection::Wrapped { selected } | RawSelection::Bare(selected)) => selected,
            Err(e) => {
                warn!(error = %e, "Filter response unparseable, returning unfiltered results");
                return Ok(FilterResult::degraded(candidates, response.usage));
            }
        };

        let items = select(candidates, selection);
        info!(
            candidates = candidates.len(),
            kept = items.len(),
            "Filtered search results"
        );
        Ok(FilterResult {
            items,
            degraded: false,
            usage: response.usage,
        })
    }
}

fn select(candidates: &[ResultItem], selection: Vec<RawPick>) -> Vec<FilteredItem> {
    let mut seen = HashSet::new();
    let mut kept: Vec<(usize, FilteredItem)> = Vec::new();
    for pick in selection {
        let (index, relevance, reason) = match pick {
            RawPick::Index(index) => (index, Relevance::default(), None),
            RawPick::Graded {
                index,
                relevance,
                reason,
            } => (
                index,
                relevance.as_deref().map_or_else(Relevance::default, Relevance::parse),
                reason.filter(|r| !r.trim().is_empty()),
            ),
        };
        let Some(item) = candidates.get(index) else {
            debug!(index, "Filter referenced an unknown candidate");
            continue;
        };
        if !relevance.is_match() || !seen.insert(index) {
            continue;
        }
        kept.push((
            kept.len(),
            FilteredItem {
                item: item.clone(),
                relevance,
                reason,
            },
        ));
    }
    kept.sort_by_key(|(order, f)| (f.relevance, *order));
    kept.into_iter().map(|(_, f)| f).collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::message::ChatResponse;
    use crate::agent::testing::{ScriptedProvider, gateway, test_config};
    use crate::core::{SourceKind, TimeWindow};

    fn candidates() -> Vec<ResultItem> {
        (0..50)
            .map(|i| {
                let title = if i % 5 == 0 {
                    format!("Dense retrieval study {i}")
                } else {
                    format!("Image segmentation study {i}")
                };
                ResultItem::new(SourceKind::Paper, i.to_string(), title)
            })
            .collect()
    }

    fn intent() -> SearchIntent {
        SearchIntent::keywords(
            ["retrieval-augmented generation"],
            [SourceKind::Paper],
            TimeWindow::PastMonth,
            50,
        )
    }

    /// Selects every candidate line whose title mentions "retrieval".
    fn retrieval_mock() -> ScriptedProvider {
        ScriptedProvider::new(|req, _| {
            let prompt = &req.messages[1].content;
            let picks: Vec<serde_json::Value> = prompt
                .lines()
                .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
                .filter(|v| {
                    v["title"]
                        .as_str()
                        .is_some_and(|t| t.to_lowercase().contains("retrieval"))
                })
                .map(|v| serde_json::json!({"index": v["index"], "relevance": "high"}))
                .collect();
            Ok(ChatResponse::text(
                serde_json::json!({ "selected": picks }).to_string(),
                "stop",
            ))
        })
    }

    #[tokio::test]
    async fn test_keeps_only_confirmed_candidates() {
        let config = test_config();
        let provider = Arc::new(retrieval_mock());
        let agent = FilterAgent::new(&config, &PromptSet::defaults());
        let result = agent
            .filter(&gateway(&provider, &config), &candidates(), &intent(), &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("filter failed: {e}"));

        assert!(!result.degraded);
        assert_eq!(result.items.len(), 10);
        assert!(result.items.iter().all(|f| f.item.title.contains("retrieval")));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_degrades_to_input() {
        let config = test_config();
        let provider = Arc::new(ScriptedProvider::constant("I think items 1 and 2 look good"));
        let agent = FilterAgent::new(&config, &PromptSet::defaults());
        let input = candidates();
        let result = agent
            .filter(&gateway(&provider, &config), &input, &intent(), &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("filter failed: {e}"));

        assert!(result.degraded);
        assert_eq!(result.result_items(), input);
    }

    #[tokio::test]
    async fn test_ranks_by_grade_and_drops_invalid_picks() {
        let config = test_config();
        let provider = Arc::new(ScriptedProvider::constant(
            r#"{"selected": [
                {"index": 3, "relevance": "low"},
                {"index": 1, "relevance": "high", "reason": "same task"},
                {"index": 99, "relevance": "high"},
                {"index": 1, "relevance": "medium"},
                {"index": 2, "relevance": "none"},
                {"index": 4, "relevance": "medium"}
            ]}"#,
        ));
        let agent = FilterAgent::new(&config, &PromptSet::defaults());
        let result = agent
            .filter(&gateway(&provider, &config), &candidates(), &intent(), &CancellationToken::new())
            .await
            .unwrap_or_default();

        let ids: Vec<&str> = result.items.iter().map(|f| f.item.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4", "3"]);
        assert_eq!(result.items[0].reason.as_deref(), Some("same task"));
    }

    #[tokio::test]
    async fn test_empty_selection_excludes_everything() {
        let config = test_config();
        let provider = Arc::new(ScriptedProvider::constant(r#"{"selected": []}"#));
        let agent = FilterAgent::new(&config, &PromptSet::defaults());
        let result = agent
            .filter(&gateway(&provider, &config), &candidates(), &intent(), &CancellationToken::new())
            .await
            .unwrap_or_default();
        assert!(result.items.is_empty());
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn test_bare_index_array_is_accepted() {
        let config = test_config();
        let provider = Arc::new(ScriptedProvider::constant("```json\n[0, 5]\n```"));
        let agent = FilterAgent::new(&config, &PromptSet::defaults());
        let result = agent
            .filter(&gateway(&provider, &config), &candidates(), &intent(), &CancellationToken::new())
            .await
            .unwrap_or_default();
        assert_eq!(result.items.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_call() {
        let config = test_config();
        let provider = Arc::new(ScriptedProvider::constant("{}"));
        let agent = FilterAgent::new(&config, &PromptSet::defaults());
        let result = agent
            .filter(&gateway(&provider, &config), &[], &intent(), &CancellationToken::new())
            .await
            .unwrap_or_default();
        assert!(result.items.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let config = test_config();
        let provider = Arc::new(ScriptedProvider::constant("{}"));
        let agent = FilterAgent::new(&config, &PromptSet::defaults());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = agent
            .filter(&gateway(&provider, &config), &candidates(), &intent(), &cancel)
            .await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert_eq!(provider.calls(), 0);
    }
}
