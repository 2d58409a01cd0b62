//! Interview controller.
//!
//! A bounded-turn state machine (`Collecting → Ready → Closed`) that turns
//! free-form user replies into a [`SearchIntent`]. Each accepted user turn
//! costs one completion that extracts newly stated intent fields and either
//! asks a clarifying question or declares sufficiency.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::gateway::CompletionGateway;
use super::json::parse_lenient;
use super::message::Role;
use super::prompt::{PromptKind, PromptSet, build_interview_prompt, build_strategy_prompt};
use super::traits::Agent;
use crate::core::intent::normalize_topics;
use crate::core::{
    CancellationToken, IntentMode, MAX_RESULT_LIMIT, SearchIntent, SourceKind, TimeWindow,
};
use crate::error::AgentError;

/// Plain-text sufficiency marker accepted when the model ignores JSON mode.
const READY_MARKER: &str = "[READY]";

/// Result limit used when the user never states one.
pub const DEFAULT_LIMIT: usize = 20;

/// Absolute ceiling on user turns; configuration may only lower it.
pub const MAX_USER_TURNS: usize = 3;

/// Interview lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewState {
    /// Accepting user turns.
    Collecting,
    /// Enough is known; waiting for finalization.
    Ready,
    /// An intent was derived; no further turns are accepted.
    Closed,
}

impl fmt::Display for InterviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Collecting => "collecting",
            Self::Ready => "ready",
            Self::Closed => "closed",
        })
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker.
    pub role: Role,
    /// What was said.
    pub text: String,
}

/// Append-only conversation log owned by one interview session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationContext {
    turns: Vec<ConversationTurn>,
}

impl ConversationContext {
    fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            text: text.into(),
        });
    }

    /// All turns in order.
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Number of user turns.
    #[must_use]
    pub fn user_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::User).count()
    }

    /// Transcript as `user: ...` / `assistant: ...` lines, optionally with
    /// one pending user reply appended.
    fn transcript(&self, pending: Option<&str>) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            let _ = writeln!(out, "{}: {}", speaker(turn.role), turn.text);
        }
        if let Some(text) = pending {
            let _ = writeln!(out, "user: {text}");
        }
        out
    }
}

const fn speaker(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Debug, Default, Deserialize)]
struct IntentUpdates {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    time_window: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    notes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct InterviewReply {
    #[serde(default)]
    updates: IntentUpdates,
    #[serde(default)]
    question: String,
    #[serde(default)]
    sufficient: bool,
}

#[derive(Debug, Deserialize)]
struct StrategyReply {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    time_window: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    limit: Option<usize>,
}

/// Intent fields collected so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntentDraft {
    /// Topics mentioned so far.
    pub topics: BTreeSet<String>,
    /// Sources mentioned so far.
    pub sources: BTreeSet<SourceKind>,
    /// Time window, if stated.
    pub time_window: Option<TimeWindow>,
    /// Result limit, if stated.
    pub limit: Option<usize>,
    /// Profile notes (goal, scenario, constraints).
    pub notes: BTreeMap<String, String>,
}

impl IntentDraft {
    fn apply(&mut self, updates: IntentUpdates) {
        self.topics.extend(normalize_topics(updates.topics));
        self.sources
            .extend(updates.sources.iter().filter_map(|s| SourceKind::parse(s)));
        if let Some(window) = updates.time_window.as_deref().and_then(TimeWindow::parse) {
            self.time_window = Some(window);
        }
        if let Some(limit) = updates.limit.filter(|l| *l > 0) {
            self.limit = Some(limit.min(MAX_RESULT_LIMIT));
        }
        for (key, value) in updates.notes {
            if !value.trim().is_empty() {
                self.notes.insert(key, value.trim().to_string());
            }
        }
    }

    /// Summary of the collected fields for prompts.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "topics: {}",
            self.topics.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        let _ = writeln!(
            out,
            "sources: {}",
            self.sources
                .iter()
                .map(SourceKind::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        if let Some(window) = &self.time_window {
            let _ = writeln!(out, "time window: {window}");
        }
        if let Some(limit) = self.limit {
            let _ = writeln!(out, "limit: {limit}");
        }
        for (key, value) in &self.notes {
            let _ = writeln!(out, "{key}: {value}");
        }
        out
    }

    /// Completes the draft with defaults: every source, past year, 20 results.
    #[must_use]
    pub fn to_intent(&self) -> SearchIntent {
        SearchIntent {
            topics: self.topics.clone(),
            sources: if self.sources.is_empty() {
                SourceKind::ALL.into_iter().collect()
            } else {
                self.sources.clone()
            },
            time_window: self.time_window.unwrap_or_default(),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
            mode: IntentMode::InterviewDerived,
            notes: self.notes.clone(),
        }
    }
}

/// Reply to one accepted user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Clarifying question or closing summary for the user.
    pub reply: String,
    /// State after the turn.
    pub state: InterviewState,
    /// User turns accepted so far.
    pub turns_used: usize,
}

/// Agent that conducts one interview turn.
pub struct InterviewAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

#[async_trait]
impl Agent for InterviewAgent {
    fn name(&self) -> &'static str {
        "interviewer"
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

    fn temperature(&self) -> f32 {
        0.3
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Agent that turns the collected profile into a search strategy.
pub struct StrategyAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

#[async_trait]
impl Agent for StrategyAgent {
    fn name(&self) -> &'static str {
        "strategy"
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

/// One interview session.
pub struct InterviewSession {
    state: InterviewState,
    context: ConversationContext,
    draft: IntentDraft,
    max_turns: usize,
    interviewer: InterviewAgent,
    strategist: StrategyAgent,
}

impl InterviewSession {
    /// Starts a session in `Collecting`.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            state: InterviewState::Collecting,
            context: ConversationContext::default(),
            draft: IntentDraft::default(),
            max_turns: config.interview_max_turns.clamp(1, MAX_USER_TURNS),
            interviewer: InterviewAgent {
                model: config.planner_model.clone(),
                max_tokens: config.planner_max_tokens,
                system_prompt: prompts.get(PromptKind::Interview).to_string(),
            },
            strategist: StrategyAgent {
                model: config.planner_model.clone(),
                max_tokens: config.planner_max_tokens,
                system_prompt: prompts.get(PromptKind::Strategy).to_string(),
            },
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> InterviewState {
        self.state
    }

    /// Conversation so far.
    #[must_use]
    pub const fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Fields collected so far.
    #[must_use]
    pub const fn draft(&self) -> &IntentDraft {
        &self.draft
    }

    /// Submits one user reply.
    ///
    /// A failed completion leaves the session untouched: the turn is not
    /// counted and the user may retry.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InterviewState`] outside `Collecting` or for an
    /// empty reply, and the gateway error when the completion fails.
    pub async fn submit_turn(
        &mut self,
        gateway: &CompletionGateway,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        if self.state != InterviewState::Collecting {
            return Err(self.state_error("no further turns are accepted"));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(self.state_error("empty reply"));
        }

        let prompt = build_interview_prompt(
            &self.context.transcript(Some(text)),
            &self.draft.describe(),
        );
        let response = self.interviewer.execute(gateway, &prompt, cancel).await?;

        self.context.push(Role::User, text);
        let (reply, sufficient) = match parse_lenient::<InterviewReply>(&response.content, "interview reply") {
            Ok(parsed) => {
                self.draft.apply(parsed.updates);
                (parsed.question.trim().to_string(), parsed.sufficient)
            }
            Err(_) => {
                let raw = response.content.trim();
                let sufficient = raw.contains(READY_MARKER);
                (raw.replace(READY_MARKER, "").trim().to_string(), sufficient)
            }
        };
        self.context.push(Role::Assistant, reply.clone());

        let turns_used = self.context.user_turns();
        if sufficient || turns_used >= self.max_turns {
            info!(turns = turns_used, sufficient, "Interview ready");
            self.state = InterviewState::Ready;
        } else {
            debug!(turns = turns_used, "Interview collecting");
        }

        Ok(TurnOutcome {
            reply,
            state: self.state,
            turns_used,
        })
    }

    /// Derives the final intent and closes the session.
    ///
    /// The strategy completion refines keywords, window, sources and limit;
    /// when it fails or cannot be parsed the draft is used as is.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InterviewState`] unless the session is `Ready`,
    /// [`AgentError::Cancelled`], or a configuration fault.
    pub async fn finalize(
        &mut self,
        gateway: &CompletionGateway,
        cancel: &CancellationToken,
    ) -> Result<SearchIntent, AgentError> {
        if self.state != InterviewState::Ready {
            return Err(self.state_error("finalize needs a ready interview"));
        }

        let mut profile = self.draft.describe();
        let _ = write!(profile, "\nconversation:\n{}", self.context.transcript(None));
        let prompt = build_strategy_prompt(&profile);

        let mut intent = self.draft.to_intent();
        match self.strategist.execute(gateway, &prompt, cancel).await {
            Ok(response) => match parse_lenient::<StrategyReply>(&response.content, "search strategy") {
                Ok(strategy) => apply_strategy(&mut intent, strategy),
                Err(e) => warn!(error = %e, "Unparseable strategy, using interview draft"),
            },
            Err(e) if e.is_cancelled() || e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, "Strategy call failed, using interview draft"),
        }

        self.state = InterviewState::Closed;
        info!(topics = intent.topics.len(), limit = intent.limit, "Interview closed");
        Ok(intent)
    }

    fn state_error(&self, message: &str) -> AgentError {
        AgentError::InterviewState {
            state: self.state.to_string(),
            message: message.to_string(),
        }
    }
}

fn apply_strategy(intent: &mut SearchIntent, strategy: StrategyReply) {
    let keywords = normalize_topics(strategy.keywords);
    if !keywords.is_empty() {
        intent.topics = keywords;
    }
    let sources: BTreeSet<SourceKind> = strategy
        .sources
        .iter()
        .filter_map(|s| SourceKind::parse(s))
        .collect();
    if !sources.is_empty() {
        intent.sources = sources;
    }
    if let Some(window) = strategy.time_window.as_deref().and_then(TimeWindow::parse) {
        intent.time_window = window;
    }
    if let Some(limit) = strategy.limit.filter(|l| *l > 0) {
        intent.limit = limit.min(MAX_RESULT_LIMIT);
    }
}
