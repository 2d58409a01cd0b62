//! Synthesizer agent for combining findings into a report.
//!
//! Takes the findings of every leaf subtask (completed or not) and produces
//! one markdown report that keeps per-role attribution. An optional quality
//! review can request one improvement pass.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::continuation::{ContinuationController, ContinuedText};
use super::finding::{ReportKind, Section};
use super::message::user_message;
use super::prompt::{
    PromptKind, PromptSet, build_improve_prompt, build_review_prompt, build_synthesis_prompt,
};
use super::traits::Agent;
use crate::core::CancellationToken;
use crate::error::AgentError;

/// Marker a reviewer puts on the first line to request revision.
pub const NEEDS_REVISION: &str = "NEEDS_REVISION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Write(ReportKind),
    Review,
    Improve,
}

/// Agent for one synthesis step (write, review or improve).
pub struct SynthesizerAgent {
    step: Step,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl SynthesizerAgent {
    /// Creates the writer for `kind` reports.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet, kind: ReportKind) -> Self {
        let prompt = match kind {
            ReportKind::Paper => PromptKind::PaperSynthesis,
            ReportKind::Repository => PromptKind::RepositorySynthesis,
            ReportKind::Related => PromptKind::RelatedSynthesis,
        };
        Self::with_step(config, prompts.get(prompt), Step::Write(kind))
    }

    fn with_step(config: &AgentConfig, system_prompt: &str, step: Step) -> Self {
        let model = match step {
            Step::Write(_) | Step::Improve => config.synthesizer_model.clone(),
            Step::Review => config.planner_model.clone(),
        };
        Self {
            step,
            model,
            max_tokens: config.synthesizer_max_tokens,
            system_prompt: system_prompt.to_string(),
        }
    }
}

#[async_trait]
impl Agent for SynthesizerAgent {
    fn name(&self) -> &'static str {
        match self.step {
            Step::Write(_) => "synthesizer",
            Step::Review => "quality_review",
            Step::Improve => "improver",
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        match self.step {
            Step::Review => 0.0,
            Step::Write(_) | Step::Improve => 0.1,
        }
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Result of the synthesis step.
#[derive(Debug, Clone, Default)]
pub struct SynthesisOutput {
    /// Final report text with continuation accounting.
    pub text: ContinuedText,
    /// Whether a quality review completed.
    pub reviewed: bool,
    /// Whether the improvement pass replaced the first draft.
    pub revised: bool,
}

/// Writer plus optional reviewer and improver.
pub struct ReportSynthesizer {
    writer: SynthesizerAgent,
    review: Option<(SynthesizerAgent, SynthesizerAgent)>,
}

impl ReportSynthesizer {
    /// Builds the synthesizer for `kind`; the review pass follows
    /// `config.quality_review`.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet, kind: ReportKind) -> Self {
        let review = config.quality_review.then(|| {
            (
                SynthesizerAgent::with_step(config, prompts.get(PromptKind::Review), Step::Review),
                SynthesizerAgent::with_step(config, prompts.get(PromptKind::Improve), Step::Improve),
            )
        });
        Self {
            writer: SynthesizerAgent::new(config, prompts, kind),
            review,
        }
    }

    /// Writes the report from `sections`, then reviews it if enabled.
    ///
    /// Review or improvement failures keep the first draft.
    ///
    /// # Errors
    ///
    /// Returns the writer's error or [`AgentError::Cancelled`].
    pub async fn run(
        &self,
        controller: &ContinuationController,
        header: &str,
        sections: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<SynthesisOutput, AgentError> {
        let prompt = build_synthesis_prompt(header, sections);
        let draft = self
            .writer
            .execute_continued(controller, user_message(&prompt), cancel)
            .await?;
        debug!(sections = sections.len(), truncated = draft.truncated, "Synthesis drafted");

        let mut output = SynthesisOutput {
            text: draft,
            ..SynthesisOutput::default()
        };
        let Some((reviewer, improver)) = &self.review else {
            return Ok(output);
        };

        let review = match reviewer
            .execute(controller.gateway(), &build_review_prompt(header, &output.text.text), cancel)
            .await
        {
            Ok(review) => review,
            Err(e) => {
                warn!(error = %e, "Quality review failed, keeping unreviewed report");
                return Ok(output);
            }
        };
        output.reviewed = true;
        output.text.usage.accumulate(review.usage);

        if !needs_revision(&review.content) {
            debug!("Quality review approved the report");
            return Ok(output);
        }

        info!("Quality review requested revision");
        let prompt = build_improve_prompt(header, review.content.trim(), &output.text.text);
        match improver
            .execute_continued(controller, user_message(&prompt), cancel)
            .await
        {
            Ok(mut improved) if !improved.text.trim().is_empty() => {
                improved.usage.accumulate(output.text.usage);
                output.text = improved;
                output.revised = true;
            }
            Ok(_) => warn!("Improvement pass returned nothing, keeping draft"),
            Err(e) => warn!(error = %e, "Improvement pass failed, keeping draft"),
        }
        Ok(output)
    }
}

fn needs_revision(review: &str) -> bool {
    review
        .lines()
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.trim().trim_matches(['*', '#', ' ']).starts_with(NEEDS_REVISION))
}

/// Synthesis prompt sections for `sections`, titled with their role.
#[must_use]
pub fn attributed_sections(sections: &[Section]) -> Vec<(String, String)> {
    sections
        .iter()
        .map(|s| {
            (
                format!("{} ({})", s.role.title(), s.role),
                s.outcome.synthesis_body(),
            )
        })
        .collect()
}
