//! Findings and synthesized reports.
//!
//! A report is assembled once, after the join barrier, from the immutable
//! findings of every leaf subtask plus the synthesis step.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use super::message::TokenUsage;
use super::role::AgentRole;
use crate::error::ErrorKind;

/// Output of one specialist or vision invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFinding {
    /// Role that produced the finding.
    pub role: AgentRole,
    /// Target the finding is about.
    pub target_id: String,
    /// Written finding.
    pub text: String,
    /// `true` when the continuation budget ran out.
    pub truncated: bool,
    /// Continuation requests that were needed.
    pub continuation_count: u32,
}

/// Why a section was skipped without calling the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The configured model cannot take image input.
    UnsupportedModel,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedModel => f.write_str("unsupported-model"),
        }
    }
}

/// Terminal outcome of one subtask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome {
    /// The agent produced a finding.
    Completed(AgentFinding),
    /// The agent failed after its retry budget.
    Unavailable {
        /// Error description.
        reason: String,
        /// Error classification.
        kind: ErrorKind,
    },
    /// The subtask was not attempted.
    Skipped {
        /// Why.
        reason: SkipReason,
    },
    /// Cancellation was observed before the subtask finished.
    Cancelled,
}

impl SectionOutcome {
    /// The finding, if the subtask completed.
    #[must_use]
    pub const fn finding(&self) -> Option<&AgentFinding> {
        match self {
            Self::Completed(finding) => Some(finding),
            _ => None,
        }
    }

    /// Short label used in logs and summaries.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Completed(f) if f.truncated => "completed (truncated)".to_string(),
            Self::Completed(_) => "completed".to_string(),
            Self::Unavailable { kind, .. } => format!("unavailable ({kind})"),
            Self::Skipped { reason } => format!("skipped: {reason}"),
            Self::Cancelled => "cancelled".to_string(),
        }
    }

    /// Body handed to the synthesizer for this section.
    #[must_use]
    pub fn synthesis_body(&self) -> String {
        match self {
            Self::Completed(f) if f.truncated => {
                format!("{}\n[note: this finding was truncated]", f.text)
            }
            Self::Completed(f) => f.text.clone(),
            Self::Unavailable { reason, .. } => format!("[unavailable: {reason}]"),
            Self::Skipped { reason } => format!("[skipped: {reason}]"),
            Self::Cancelled => "[cancelled]".to_string(),
        }
    }
}

/// One attributed section of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Role the section belongs to.
    pub role: AgentRole,
    /// Outcome of that role's subtask.
    pub outcome: SectionOutcome,
}

/// Which synthesizer produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Deep analysis of a paper.
    Paper,
    /// Deep analysis of a repository or model card.
    Repository,
    /// Related-research comparison.
    Related,
}

/// Overall status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Every attempted section and the synthesis completed.
    Complete,
    /// At least one section or the synthesis is unavailable.
    Partial,
    /// Cancellation interrupted the run; completed sections are kept.
    Cancelled,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Combined analysis of one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedReport {
    /// Target identifier.
    pub target_id: String,
    /// Target title.
    pub title: String,
    /// Report kind.
    pub kind: ReportKind,
    /// Planner's one-line focus statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    /// Leaf sections in role order.
    pub sections: Vec<Section>,
    /// The synthesis step.
    pub synthesis: SectionOutcome,
    /// Whether the synthesis went through the quality review.
    #[serde(default)]
    pub reviewed: bool,
    /// Overall status.
    pub status: ReportStatus,
    /// Usage summed over every call for this report.
    #[serde(default)]
    pub usage: TokenUsage,
}

impl SynthesizedReport {
    /// Derives the status from the sections and synthesis.
    #[must_use]
    pub fn derive_status(sections: &[Section], synthesis: &SectionOutcome) -> ReportStatus {
        let outcomes = || sections.iter().map(|s| &s.outcome).chain(Some(synthesis));
        if outcomes().any(|o| matches!(o, SectionOutcome::Cancelled)) {
            ReportStatus::Cancelled
        } else if outcomes().any(|o| matches!(o, SectionOutcome::Unavailable { .. })) {
            ReportStatus::Partial
        } else {
            ReportStatus::Complete
        }
    }

    /// The section for `role`, if present.
    #[must_use]
    pub fn section(&self, role: AgentRole) -> Option<&Section> {
        self.sections.iter().find(|s| s.role == role)
    }

    /// Number of sections with a finding.
    #[must_use]
    pub fn populated_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| s.outcome.finding().is_some())
            .count()
    }

    /// Number of unavailable sections.
    #[must_use]
    pub fn unavailable_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| matches!(s.outcome, SectionOutcome::Unavailable { .. }))
            .count()
    }

    /// The synthesized text, if the synthesis completed.
    #[must_use]
    pub fn synthesis_text(&self) -> Option<&str> {
        self.synthesis.finding().map(|f| f.text.as_str())
    }

    /// Renders the report as markdown.
    ///
    /// The synthesis comes first, followed by every specialist section under
    /// its own heading so attribution stays visible.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n", self.title);
        let _ = writeln!(out, "_Target: `{}` · status: {}_\n", self.target_id, self.status);
        if let Some(focus) = &self.focus {
            let _ = writeln!(out, "> {focus}\n");
        }

        match &self.synthesis {
            SectionOutcome::Completed(f) => {
                out.push_str(f.text.trim());
                out.push_str("\n\n");
                if f.truncated {
                    out.push_str("_The synthesis was truncated._\n\n");
                }
            }
            other => {
                let _ = writeln!(out, "_Synthesis {}._\n", other.label());
            }
        }

        if !self.sections.is_empty() {
            out.push_str("---\n\n## Specialist Findings\n\n");
        }
        for section in &self.sections {
            let _ = writeln!(out, "### {} ({})\n", section.role.title(), section.role);
            match &section.outcome {
                SectionOutcome::Completed(f) => {
                    out.push_str(f.text.trim());
                    out.push_str("\n\n");
                    if f.truncated {
                        out.push_str("_This section was truncated._\n\n");
                    }
                }
                other => {
                    let _ = writeln!(out, "_{}_\n", other.label());
                }
            }
        }
        out
    }
}
