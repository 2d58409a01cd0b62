//! Planning ("brain") agent.
//!
//! Reads a target's content and produces an [`AnalysisTask`]: which roles
//! from the target's fixed role set apply, and target-specific instructions
//! for each.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::gateway::CompletionGateway;
use super::json::parse_lenient;
use super::message::TokenUsage;
use super::prompt::{PromptKind, PromptSet, build_brain_prompt};
use super::role::{AgentRole, role_set};
use super::task::{AnalysisTask, Subtask};
use super::traits::Agent;
use crate::core::{CancellationToken, ResultItem, TargetContent};
use crate::error::AgentError;

/// Characters of target content shown to the planner.
const PLAN_CONTENT_CHARS: usize = 6_000;

#[derive(Debug, Default, Deserialize)]
struct RawPlan {
    #[serde(default)]
    focus: Option<String>,
    #[serde(default)]
    subtasks: Vec<RawSubtask>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    role: String,
    #[serde(default)]
    instructions: Option<String>,
}

/// Agent that plans the analysis of one target.
pub struct BrainAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl BrainAgent {
    /// Creates a planner from the configuration and prompt set.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            model: config.planner_model.clone(),
            max_tokens: config.planner_max_tokens,
            system_prompt: prompts.get(PromptKind::Brain).to_string(),
        }
    }

    /// Plans the analysis of `target`.
    ///
    /// An unusable plan (failed call, unparseable output, no known roles)
    /// falls back to the target's full role set with no extra framing.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] on cancellation and configuration
    /// faults such as [`AgentError::Auth`]; other failures fall back.
    pub async fn plan(
        &self,
        gateway: &CompletionGateway,
        target: &ResultItem,
        content: &TargetContent,
        cancel: &CancellationToken,
    ) -> Result<(AnalysisTask, TokenUsage), AgentError> {
        let allowed = role_set(target.target_kind());
        let names: Vec<&str> = allowed.iter().map(AgentRole::as_str).collect();
        let excerpt: String = content.text.chars().take(PLAN_CONTENT_CHARS).collect();
        let user_msg = build_brain_prompt(&target.header(), &excerpt, &names);

        let response = match self.execute(gateway, &user_msg, cancel).await {
            Ok(response) => response,
            Err(e) if e.is_cancelled() || e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(target = %target.target_id(), error = %e, "Planner call failed, using full role set");
                return Ok((fallback_task(target), TokenUsage::default()));
            }
        };

        let task = match parse_lenient::<RawPlan>(&response.content, "analysis plan") {
            Ok(raw) => task_from_plan(target, raw, allowed),
            Err(e) => {
                warn!(target = %target.target_id(), error = %e, "Unparseable plan, using full role set");
                fallback_task(target)
            }
        };
        debug!(
            target = %target.target_id(),
            roles = ?task.leaves().map(|s| s.role).collect::<Vec<_>>(),
            "Analysis planned"
        );
        Ok((task, response.usage))
    }
}

/// Every role of the target's set, no framing.
#[must_use]
pub fn fallback_task(target: &ResultItem) -> AnalysisTask {
    let leaves = role_set(target.target_kind())
        .iter()
        .map(|&role| Subtask::leaf(role, None))
        .collect();
    AnalysisTask::fan_out(target.clone(), leaves, None)
}

/// Keeps planned roles that belong to `allowed`, first mention wins.
fn task_from_plan(target: &ResultItem, raw: RawPlan, allowed: &[AgentRole]) -> AnalysisTask {
    let mut seen = BTreeSet::new();
    let leaves: Vec<Subtask> = raw
        .subtasks
        .into_iter()
        .filter_map(|s| {
            let role = AgentRole::parse(&s.role)?;
            if !allowed.contains(&role) || !seen.insert(role) {
                debug!(role = %s.role, "Dropping role outside the allowed set");
                return None;
            }
            let instructions = s.instructions.filter(|i| !i.trim().is_empty());
            Some(Subtask::leaf(role, instructions))
        })
        .collect();

    if leaves.is_empty() {
        return fallback_task(target);
    }
    let focus = raw.focus.filter(|f| !f.trim().is_empty());
    AnalysisTask::fan_out(target.clone(), leaves, focus)
}

#[async_trait]
impl Agent for BrainAgent {
    fn name(&self) -> &'static str {
        "brain"
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
