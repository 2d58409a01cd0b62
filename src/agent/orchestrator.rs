//! Analysis orchestrator.
//!
//! Coordinates one target's analysis: plan → concurrent specialist leaves
//! (plus the optional vision leaf) → join barrier → synthesis. A failing
//! role becomes an `unavailable` section; cancellation keeps the findings
//! already completed.

use std::fmt::Write;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::analyst::{SpecialistAgent, VisionAgent, target_prompt};
use super::brain::BrainAgent;
use super::config::AgentConfig;
use super::continuation::ContinuationController;
use super::finding::{
    AgentFinding, ReportKind, Section, SectionOutcome, SkipReason, SynthesizedReport,
};
use super::gateway::CompletionGateway;
use super::message::TokenUsage;
use super::prompt::{PromptSet, build_comparison_prompt};
use super::role::{AgentRole, RoleRegistry};
use super::synthesizer::{ReportSynthesizer, attributed_sections};
use super::task::{AnalysisTask, Subtask};
use crate::core::{CancellationToken, ResultItem, TargetContent, TargetKind, ensure_active};
use crate::error::{AgentError, ErrorKind};

/// Per-run analysis switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Add a vision leaf when the target has images.
    pub vision: bool,
}

/// Input shared by every leaf of one task.
#[derive(Debug, Clone, Copy)]
pub enum LeafInput<'a> {
    /// The target's own content.
    Target(&'a TargetContent),
    /// A finished report compared against related work.
    Comparison {
        /// Report of the original target.
        report: &'a str,
        /// Numbered list of related works.
        related: &'a str,
    },
}

struct LeafResult {
    section: Section,
    usage: TokenUsage,
    fatal: Option<AgentError>,
}

impl LeafResult {
    fn outcome(role: AgentRole, outcome: SectionOutcome) -> Self {
        Self {
            section: Section { role, outcome },
            usage: TokenUsage::default(),
            fatal: None,
        }
    }
}

/// Runs the plan → dispatch → synthesis pipeline for single targets.
///
/// Holds only read-only configuration; one orchestrator is shared by every
/// concurrent target of a batch.
pub struct Orchestrator {
    controller: ContinuationController,
    config: AgentConfig,
    prompts: PromptSet,
    roles: RoleRegistry,
    vision: Option<VisionAgent>,
}

impl Orchestrator {
    /// Creates an orchestrator over a shared gateway.
    #[must_use]
    pub fn new(gateway: Arc<CompletionGateway>, config: AgentConfig, prompts: PromptSet) -> Self {
        let controller = ContinuationController::new(gateway, config.max_continuations);
        let roles = RoleRegistry::new(&config, &prompts);
        let vision = roles
            .get(AgentRole::Vision)
            .cloned()
            .map(|profile| VisionAgent::new(profile, config.vision_override));
        Self {
            controller,
            config,
            prompts,
            roles,
            vision,
        }
    }

    /// The continuation controller every agent call goes through.
    #[must_use]
    pub const fn controller(&self) -> &ContinuationController {
        &self.controller
    }

    /// Configuration snapshot this orchestrator was built with.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Prompt set in use.
    #[must_use]
    pub const fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    /// Whether vision leaves can run with the configured model.
    #[must_use]
    pub fn vision_supported(&self) -> bool {
        self.vision.as_ref().is_some_and(VisionAgent::supported)
    }

    /// Plans and runs the full analysis of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if cancellation is observed before
    /// any leaf ran, and configuration faults (e.g. [`AgentError::Auth`])
    /// when no leaf succeeded. Role failures are reported in the report.
    pub async fn plan_and_run(
        &self,
        target: &ResultItem,
        content: &TargetContent,
        options: AnalysisOptions,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedReport, AgentError> {
        ensure_active(cancel)?;
        let brain = BrainAgent::new(&self.config, &self.prompts);
        let (mut task, plan_usage) = brain
            .plan(self.controller.gateway(), target, content, cancel)
            .await?;

        if options.vision && !content.images.is_empty() {
            task.add_leaf(Subtask::leaf(AgentRole::Vision, None));
        }

        let kind = match target.target_kind() {
            TargetKind::Paper => ReportKind::Paper,
            TargetKind::Repository => ReportKind::Repository,
        };
        let mut report = self
            .run_task(&task, LeafInput::Target(content), kind, cancel)
            .await?;
        report.usage.accumulate(plan_usage);
        Ok(report)
    }

    /// Executes a validated task graph wave by wave.
    ///
    /// Every subtask in a wave runs concurrently; the synthesis subtask only
    /// starts once all of its dependencies have a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTaskGraph`] for a malformed graph, or a
    /// fatal error when no leaf produced a finding.
    pub async fn run_task(
        &self,
        task: &AnalysisTask,
        input: LeafInput<'_>,
        kind: ReportKind,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedReport, AgentError> {
        let waves = task.waves()?;
        let target_id = task.target.target_id();
        let mut sections: Vec<Section> = Vec::with_capacity(task.subtasks.len());
        let mut synthesis: Option<SectionOutcome> = None;
        let mut reviewed = false;
        let mut usage = TokenUsage::default();
        let mut fatal: Option<AgentError> = None;

        for wave in waves {
            let leaves: Vec<&Subtask> = wave
                .iter()
                .map(|&i| &task.subtasks[i])
                .filter(|s| s.role != AgentRole::Synthesis)
                .collect();
            debug!(
                target = %target_id,
                roles = ?leaves.iter().map(|s| s.role).collect::<Vec<_>>(),
                "Dispatching wave"
            );

            let results = join_all(
                leaves
                    .iter()
                    .map(|s| self.run_leaf(s, &task.target, input, &sections, cancel)),
            )
            .await;
            for result in results {
                usage.accumulate(result.usage);
                if fatal.is_none() {
                    fatal = result.fatal;
                }
                sections.push(result.section);
            }

            let Some(join) = wave
                .iter()
                .map(|&i| &task.subtasks[i])
                .find(|s| s.role == AgentRole::Synthesis)
            else {
                continue;
            };

            if sections.iter().all(|s| s.outcome.finding().is_none())
                && let Some(e) = fatal.take()
            {
                return Err(e);
            }

            let inputs: Vec<Section> = sections
                .iter()
                .filter(|s| join.depends_on.contains(&s.role))
                .cloned()
                .collect();
            let (outcome, was_reviewed, synth_usage) =
                self.run_synthesis(task, &inputs, kind, cancel).await;
            usage.accumulate(synth_usage);
            reviewed = was_reviewed;
            synthesis = Some(outcome);
        }

        sections.sort_by_key(|s| s.role.order());
        let synthesis = synthesis.unwrap_or(SectionOutcome::Unavailable {
            reason: "task has no synthesis step".to_string(),
            kind: ErrorKind::Other,
        });
        let status = SynthesizedReport::derive_status(&sections, &synthesis);
        info!(
            target = %target_id,
            status = %status,
            sections = sections.len(),
            total_tokens = usage.total_tokens,
            "Analysis finished"
        );

        Ok(SynthesizedReport {
            target_id,
            title: task.target.title.clone(),
            kind,
            focus: task.focus.clone(),
            sections,
            synthesis,
            reviewed,
            status,
            usage,
        })
    }

    async fn run_leaf(
        &self,
        subtask: &Subtask,
        target: &ResultItem,
        input: LeafInput<'_>,
        prior: &[Section],
        cancel: &CancellationToken,
    ) -> LeafResult {
        let role = subtask.role;
        if cancel.is_cancelled() {
            return LeafResult::outcome(role, SectionOutcome::Cancelled);
        }
        if !self.config.request_delay.is_zero() {
            tokio::time::sleep(self.config.request_delay).await;
        }
        let instructions = subtask.instructions.as_deref();

        let result = if role == AgentRole::Vision {
            let LeafInput::Target(content) = input else {
                return LeafResult::outcome(role, unavailable("vision needs target content"));
            };
            match &self.vision {
                Some(vision) if vision.supported() => {
                    vision
                        .analyze(&self.controller, target, content, instructions, cancel)
                        .await
                }
                _ => {
                    info!(target = %target.target_id(), model = %self.config.model, "Model lacks vision support, skipping vision leaf");
                    return LeafResult::outcome(
                        role,
                        SectionOutcome::Skipped {
                            reason: SkipReason::UnsupportedModel,
                        },
                    );
                }
            }
        } else {
            let Some(profile) = self.roles.get(role) else {
                return LeafResult::outcome(role, unavailable("no profile for role"));
            };
            let mut prompt = match input {
                LeafInput::Target(content) => target_prompt(target, &content.text, instructions),
                LeafInput::Comparison { report, related } => {
                    let mut p = build_comparison_prompt(&target.header(), report, related);
                    if let Some(focus) = instructions {
                        let _ = write!(p, "\n\n<focus>\n{focus}\n</focus>");
                    }
                    p
                }
            };
            append_prior_findings(&mut prompt, subtask, prior);
            SpecialistAgent::new(profile.clone())
                .analyze(&self.controller, target, &prompt, cancel)
                .await
        };

        match result {
            Ok((finding, out)) => LeafResult {
                section: Section {
                    role,
                    outcome: SectionOutcome::Completed(finding),
                },
                usage: out.usage,
                fatal: None,
            },
            Err(AgentError::Cancelled) => LeafResult::outcome(role, SectionOutcome::Cancelled),
            Err(e) => {
                warn!(target = %target.target_id(), role = %role, error = %e, "Subtask failed, marking section unavailable");
                let outcome = SectionOutcome::Unavailable {
                    reason: e.to_string(),
                    kind: e.kind(),
                };
                let mut result = LeafResult::outcome(role, outcome);
                result.fatal = e.is_fatal().then_some(e);
                result
            }
        }
    }

    async fn run_synthesis(
        &self,
        task: &AnalysisTask,
        sections: &[Section],
        kind: ReportKind,
        cancel: &CancellationToken,
    ) -> (SectionOutcome, bool, TokenUsage) {
        if cancel.is_cancelled() {
            return (SectionOutcome::Cancelled, false, TokenUsage::default());
        }
        if sections.iter().all(|s| s.outcome.finding().is_none()) {
            return (
                unavailable("no findings to synthesize"),
                false,
                TokenUsage::default(),
            );
        }

        let mut header = task.target.header();
        if let Some(focus) = &task.focus {
            let _ = writeln!(header, "Focus: {focus}");
        }
        let synthesizer = ReportSynthesizer::new(&self.config, &self.prompts, kind);
        match synthesizer
            .run(&self.controller, &header, &attributed_sections(sections), cancel)
            .await
        {
            Ok(out) => (
                SectionOutcome::Completed(AgentFinding {
                    role: AgentRole::Synthesis,
                    target_id: task.target.target_id(),
                    text: out.text.text,
                    truncated: out.text.truncated,
                    continuation_count: out.text.continuations,
                }),
                out.reviewed,
                out.text.usage,
            ),
            Err(AgentError::Cancelled) => (SectionOutcome::Cancelled, false, TokenUsage::default()),
            Err(e) => {
                warn!(target = %task.target.target_id(), error = %e, "Synthesis failed");
                (
                    SectionOutcome::Unavailable {
                        reason: e.to_string(),
                        kind: e.kind(),
                    },
                    false,
                    TokenUsage::default(),
                )
            }
        }
    }
}

fn unavailable(reason: &str) -> SectionOutcome {
    SectionOutcome::Unavailable {
        reason: reason.to_string(),
        kind: ErrorKind::Other,
    }
}

/// Adds the findings a subtask depends on to its prompt.
fn append_prior_findings(prompt: &mut String, subtask: &Subtask, prior: &[Section]) {
    let deps: Vec<&Section> = prior
        .iter()
        .filter(|s| subtask.depends_on.contains(&s.role))
        .collect();
    if deps.is_empty() {
        return;
    }
    prompt.push_str("\n\n<prior_findings>\n");
    for section in deps {
        let _ = write!(
            prompt,
            "<section analyst=\"{}\">\n{}\n</section>\n",
            section.role,
            section.outcome.synthesis_body()
        );
    }
    prompt.push_str("</prior_findings>");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::finding::ReportStatus;
    use crate::agent::message::ChatResponse;
    use crate::agent::testing::{ScriptedProvider, gateway, test_config};
    use crate::core::{ImageAttachment, SourceKind};

    const PAPER_PLAN: &str = r#"{"focus": "retrieval", "subtasks": [
        {"role": "method"}, {"role": "experiment"}, {"role": "reviewer"}]}"#;

    fn paper() -> ResultItem {
        ResultItem::new(SourceKind::Paper, "2401.1", "Retrieval at Scale")
    }

    fn orchestrator(provider: &Arc<ScriptedProvider>, config: AgentConfig) -> Orchestrator {
        Orchestrator::new(gateway(provider, &config), config, PromptSet::defaults())
    }

    fn by_agent(req: &crate::agent::message::ChatRequest) -> Result<ChatResponse, AgentError> {
        let text = match req.agent.as_str() {
            "brain" => PAPER_PLAN.to_string(),
            "synthesizer" => "# Paper Analysis Report".to_string(),
            other => format!("{other} finding"),
        };
        Ok(ChatResponse::text(text, "stop"))
    }

    #[tokio::test]
    async fn test_failed_role_yields_partial_report() {
        let provider = Arc::new(ScriptedProvider::new(|req, _| {
            if req.agent == "experiment" {
                return Err(AgentError::Network {
                    message: "connection reset".to_string(),
                });
            }
            by_agent(req)
        }));
        let orch = orchestrator(&provider, test_config());
        let report = orch
            .plan_and_run(&paper(), &TargetContent::text("body"), AnalysisOptions::default(), &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("analysis failed: {e}"));

        assert_eq!(report.populated_count(), 2);
        assert_eq!(report.unavailable_count(), 1);
        assert_eq!(report.status, ReportStatus::Partial);
        assert_eq!(report.synthesis_text(), Some("# Paper Analysis Report"));
        assert_eq!(report.focus.as_deref(), Some("retrieval"));
        // Retries were spent on the failing role only.
        assert_eq!(provider.requests_for("experiment").len(), 4);
    }

    #[tokio::test]
    async fn test_synthesis_sees_every_leaf() {
        let provider = Arc::new(ScriptedProvider::new(|req, _| {
            if req.agent == "reviewer" {
                return Err(AgentError::ApiRequest {
                    message: "rejected".to_string(),
                    status: Some(400),
                });
            }
            by_agent(req)
        }));
        let orch = orchestrator(&provider, test_config());
        let _ = orch
            .plan_and_run(&paper(), &TargetContent::text("body"), AnalysisOptions::default(), &CancellationToken::new())
            .await;

        let synth = provider.requests_for("synthesizer");
        assert_eq!(synth.len(), 1);
        let prompt = &synth[0].messages[1].content;
        assert!(prompt.contains("method finding"));
        assert!(prompt.contains("experiment finding"));
        assert!(prompt.contains("Reviewer Assessment (reviewer)"));
        assert!(prompt.contains("[unavailable:"));
    }

    #[tokio::test]
    async fn test_vision_skipped_on_text_only_model() {
        let provider = Arc::new(ScriptedProvider::new(|req, _| by_agent(req)));
        let mut config = test_config();
        config.model = "gpt-3.5-turbo".to_string();
        let orch = orchestrator(&provider, config);
        let content = TargetContent {
            text: "body".to_string(),
            images: vec![ImageAttachment {
                url: "data:image/png;base64,AA".to_string(),
                caption: None,
            }],
        };

        let report = orch
            .plan_and_run(&paper(), &content, AnalysisOptions { vision: true }, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("analysis failed: {e}"));
        let vision = report.section(AgentRole::Vision).map(|s| s.outcome.clone());
        assert_eq!(
            vision,
            Some(SectionOutcome::Skipped {
                reason: SkipReason::UnsupportedModel
            })
        );
        assert!(provider.requests_for("vision").is_empty());
        assert_eq!(report.status, ReportStatus::Complete);
    }

    #[tokio::test]
    async fn test_vision_leaf_runs_on_multimodal_model() {
        let provider = Arc::new(ScriptedProvider::new(|req, _| by_agent(req)));
        let orch = orchestrator(&provider, test_config());
        let content = TargetContent {
            text: "body".to_string(),
            images: vec![ImageAttachment {
                url: "https://example.org/fig1.png".to_string(),
                caption: Some("Figure 1".to_string()),
            }],
        };

        let report = orch
            .plan_and_run(&paper(), &content, AnalysisOptions { vision: true }, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("analysis failed: {e}"));
        assert_eq!(report.populated_count(), 4);
        let vision = provider.requests_for("vision");
        assert_eq!(vision.len(), 1);
        assert!(vision[0].has_images());
        let synth = provider.requests_for("synthesizer");
        assert!(synth[0].messages[1].content.contains("vision finding"));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_completed_sections() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let provider = Arc::new(ScriptedProvider::new(move |req, _| {
            if req.agent == "reviewer" {
                trigger.cancel();
            }
            by_agent(req)
        }));
        let orch = orchestrator(&provider, test_config());
        let report = orch
            .plan_and_run(&paper(), &TargetContent::text("body"), AnalysisOptions::default(), &cancel)
            .await
            .unwrap_or_else(|e| panic!("analysis failed: {e}"));

        assert_eq!(report.status, ReportStatus::Cancelled);
        assert_eq!(report.synthesis, SectionOutcome::Cancelled);
        let reviewer = report.section(AgentRole::Reviewer).map(|s| s.outcome.clone());
        assert_eq!(reviewer, Some(SectionOutcome::Cancelled));
        assert!(report.populated_count() >= 1);
        assert!(provider.requests_for("synthesizer").is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_everywhere_fails_target() {
        let provider = Arc::new(ScriptedProvider::new(|req, _| {
            if req.agent == "brain" {
                return by_agent(req);
            }
            Err(AgentError::Auth {
                message: "invalid key".to_string(),
            })
        }));
        let orch = orchestrator(&provider, test_config());
        let result = orch
            .plan_and_run(&paper(), &TargetContent::text("body"), AnalysisOptions::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AgentError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_dependent_leaf_receives_prior_findings() {
        let provider = Arc::new(ScriptedProvider::new(|req, _| by_agent(req)));
        let orch = orchestrator(&provider, test_config());
        let mut reviewer = Subtask::leaf(AgentRole::Reviewer, None);
        reviewer.depends_on.insert(AgentRole::Method);
        let mut task = AnalysisTask::fan_out(paper(), vec![Subtask::leaf(AgentRole::Method, None)], None);
        task.subtasks.insert(1, reviewer);
        if let Some(s) = task.subtasks.last_mut() {
            s.depends_on.insert(AgentRole::Reviewer);
        }

        let content = TargetContent::text("body");
        let report = orch
            .run_task(&task, LeafInput::Target(&content), ReportKind::Paper, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("analysis failed: {e}"));
        assert_eq!(report.populated_count(), 2);
        let review = provider.requests_for("reviewer");
        assert!(review[0].messages[1].content.contains("<prior_findings>"));
        assert!(review[0].messages[1].content.contains("method finding"));
    }
}
