//! Service facade.
//!
//! [`Scout`] is the surface a UI drives: the interview, search planning and
//! execution, batch analysis and related research. Every long operation
//! takes a [`CancellationToken`] obtained from [`Scout::cancellation_token`];
//! [`Scout::shutdown`] cancels all of them at once.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::agent::batch::{BatchCoordinator, BatchHandle};
use crate::agent::client::create_provider;
use crate::agent::config::AgentConfig;
use crate::agent::filter::{FilterAgent, FilterResult, FilteredItem};
use crate::agent::finding::SynthesizedReport;
use crate::agent::gateway::CompletionGateway;
use crate::agent::interview::{InterviewSession, InterviewState, TurnOutcome};
use crate::agent::orchestrator::{AnalysisOptions, Orchestrator};
use crate::agent::prompt::PromptSet;
use crate::agent::provider::LlmProvider;
use crate::agent::related::{RelatedReport, find_related};
use crate::core::{CancellationToken, Relevance, ResultItem, SearchIntent, TargetContent};
use crate::error::AgentError;
use crate::search::{ConnectorRegistry, QuerySpec, SearchOutcome, SearchRunner, plan_intent};

/// Results of one search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    /// Raw execution result.
    pub search: SearchOutcome,
    /// Filter pass, when one was requested and the search was not cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterResult>,
}

impl SearchResults {
    /// Items to show: the filter's selection, or every fetched item.
    #[must_use]
    pub fn curated(&self) -> Vec<FilteredItem> {
        self.filter.as_ref().map_or_else(
            || {
                self.search
                    .items
                    .iter()
                    .map(|item| FilteredItem {
                        item: item.clone(),
                        relevance: Relevance::default(),
                        reason: None,
                    })
                    .collect()
            },
            |f| f.items.clone(),
        )
    }

    /// The filter could not grade the candidates.
    #[must_use]
    pub fn filter_degraded(&self) -> bool {
        self.filter.as_ref().is_some_and(|f| f.degraded)
    }
}

/// Entry point for every user-facing operation.
pub struct Scout {
    config: AgentConfig,
    prompts: PromptSet,
    orchestrator: Arc<Orchestrator>,
    runner: SearchRunner,
    interview: InterviewSession,
    root: CancellationToken,
}

impl Scout {
    /// Creates a facade using the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] or
    /// [`AgentError::UnsupportedProvider`] if no provider can be built.
    pub fn new(config: AgentConfig, connectors: ConnectorRegistry) -> Result<Self, AgentError> {
        let provider = create_provider(&config)?;
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Ok(Self::with_provider(provider, config, prompts, connectors))
    }

    /// Creates a facade over an explicit provider.
    #[must_use]
    pub fn with_provider(
        provider: Arc<dyn LlmProvider>,
        config: AgentConfig,
        prompts: PromptSet,
        connectors: ConnectorRegistry,
    ) -> Self {
        let gateway = Arc::new(CompletionGateway::new(provider, &config));
        let orchestrator = Arc::new(Orchestrator::new(gateway, config.clone(), prompts.clone()));
        let interview = InterviewSession::new(&config, &prompts);
        Self {
            config,
            prompts,
            orchestrator,
            runner: SearchRunner::new(connectors),
            interview,
            root: CancellationToken::new(),
        }
    }

    /// Configuration snapshot.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// A fresh token for one operation; cancelled by [`Self::shutdown`].
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Cancels one operation.
    pub fn cancel(&self, token: &CancellationToken) {
        debug!("Cancellation requested");
        token.cancel();
    }

    /// Cancels every operation started from this facade.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// Current interview state.
    #[must_use]
    pub const fn interview_state(&self) -> InterviewState {
        self.interview.state()
    }

    /// Discards the current interview and starts a new one.
    pub fn reset_interview(&mut self) {
        self.interview = InterviewSession::new(&self.config, &self.prompts);
    }

    /// Submits one interview turn.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InterviewState`] once the interview is ready,
    /// and the gateway error when the turn failed (the user may retry).
    pub async fn start_interview_turn(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        let gateway = Arc::clone(self.orchestrator.controller().gateway());
        self.interview.submit_turn(&gateway, text, cancel).await
    }

    /// Derives the search intent from a ready interview.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InterviewState`] unless the interview is ready.
    pub async fn finalize_search(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<SearchIntent, AgentError> {
        let gateway = Arc::clone(self.orchestrator.controller().gateway());
        self.interview.finalize(&gateway, cancel).await
    }

    /// Plans a search for `intent` against the current time.
    #[must_use]
    pub fn plan_search(&self, intent: &SearchIntent) -> Vec<QuerySpec> {
        plan_intent(intent, Utc::now())
    }

    /// Runs `plan`, then optionally filters the results against `intent`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if cancelled during the filter
    /// pass, and fatal configuration faults. A cancelled search returns its
    /// partial results unfiltered.
    pub async fn start_search(
        &self,
        intent: &SearchIntent,
        plan: &[QuerySpec],
        filter: bool,
        cancel: &CancellationToken,
    ) -> Result<SearchResults, AgentError> {
        let search = self.runner.run(plan, cancel).await;
        if !filter || search.cancelled {
            return Ok(SearchResults { search, filter: None });
        }
        let filtered = FilterAgent::new(&self.config, &self.prompts)
            .filter(
                self.orchestrator.controller().gateway(),
                &search.items,
                intent,
                cancel,
            )
            .await?;
        Ok(SearchResults {
            search,
            filter: Some(filtered),
        })
    }

    /// Starts a batch analysis; progress arrives on the returned handle.
    #[must_use]
    pub fn analyze(
        &self,
        targets: Vec<ResultItem>,
        options: AnalysisOptions,
        cancel: CancellationToken,
    ) -> BatchHandle {
        BatchCoordinator::new(
            Arc::clone(&self.orchestrator),
            self.runner.connectors().clone(),
            self.config.batch_concurrency,
        )
        .run_batch(targets, options, cancel)
    }

    /// Analyzes a single target.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] or a configuration fault.
    pub async fn analyze_one(
        &self,
        target: &ResultItem,
        options: AnalysisOptions,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedReport, AgentError> {
        let content = self.fetch_content(target).await;
        self.orchestrator
            .plan_and_run(target, &content, options, cancel)
            .await
    }

    /// Compares an analyzed target against related work.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] or a configuration fault.
    pub async fn find_related(
        &self,
        target: &ResultItem,
        analysis: &SynthesizedReport,
        cancel: &CancellationToken,
    ) -> Result<RelatedReport, AgentError> {
        find_related(&self.orchestrator, &self.runner, target, analysis, cancel).await
    }

    async fn fetch_content(&self, target: &ResultItem) -> TargetContent {
        let Some(connector) = self.runner.connectors().get(target.source) else {
            return TargetContent::from_item(target);
        };
        match connector.fetch_content(target).await {
            Ok(content) => content,
            Err(e) => {
                warn!(target = %target.target_id(), error = %e, "Content fetch failed, analyzing metadata only");
                TargetContent::from_item(target)
            }
        }
    }
}
