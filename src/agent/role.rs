//! Agent roles and their configuration records.
//!
//! A role is a tag; everything that differs between roles (prompt, model,
//! token budget, section title) lives in a [`RoleProfile`] looked up from a
//! [`RoleRegistry`]. Adding a role means adding a tag and a profile.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::AgentConfig;
use super::prompt::{PromptKind, PromptSet};
use crate::core::TargetKind;

/// Role of one subtask in an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Core method of a paper.
    Method,
    /// Experimental evidence of a paper.
    Experiment,
    /// Critical review of a paper.
    Reviewer,
    /// Architecture of a repository.
    Architecture,
    /// Core code of a repository.
    Code,
    /// Usage of a repository.
    Usage,
    /// Visual evidence from extracted images.
    Vision,
    /// Technique deltas against related work.
    TechniqueComparison,
    /// Experimental-setup deltas against related work.
    ExperimentComparison,
    /// Join step combining all findings.
    Synthesis,
}

const PAPER_ROLES: [AgentRole; 3] = [AgentRole::Method, AgentRole::Experiment, AgentRole::Reviewer];
const REPOSITORY_ROLES: [AgentRole; 3] = [AgentRole::Architecture, AgentRole::Code, AgentRole::Usage];

/// The fixed specialist role set for a kind of target.
#[must_use]
pub const fn role_set(kind: TargetKind) -> &'static [AgentRole] {
    match kind {
        TargetKind::Paper => &PAPER_ROLES,
        TargetKind::Repository => &REPOSITORY_ROLES,
    }
}

impl AgentRole {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Experiment => "experiment",
            Self::Reviewer => "reviewer",
            Self::Architecture => "architecture",
            Self::Code => "code",
            Self::Usage => "usage",
            Self::Vision => "vision",
            Self::TechniqueComparison => "technique_comparison",
            Self::ExperimentComparison => "experiment_comparison",
            Self::Synthesis => "synthesis",
        }
    }

    /// Parses a role name as emitted by the planning agent.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "method" | "methods" => Some(Self::Method),
            "experiment" | "experiments" => Some(Self::Experiment),
            "reviewer" | "review" => Some(Self::Reviewer),
            "architecture" => Some(Self::Architecture),
            "code" => Some(Self::Code),
            "usage" => Some(Self::Usage),
            "vision" => Some(Self::Vision),
            "technique_comparison" => Some(Self::TechniqueComparison),
            "experiment_comparison" => Some(Self::ExperimentComparison),
            "synthesis" => Some(Self::Synthesis),
            _ => None,
        }
    }

    /// Section title in rendered reports.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Method => "Method Analysis",
            Self::Experiment => "Experiment Analysis",
            Self::Reviewer => "Reviewer Assessment",
            Self::Architecture => "Architecture Analysis",
            Self::Code => "Code Analysis",
            Self::Usage => "Usage Analysis",
            Self::Vision => "Visual Analysis",
            Self::TechniqueComparison => "Technique Comparison",
            Self::ExperimentComparison => "Experimental Setup Comparison",
            Self::Synthesis => "Synthesis",
        }
    }

    /// Report order: specialists, then vision, then synthesis.
    #[must_use]
    pub const fn order(&self) -> u8 {
        *self as u8
    }

    const fn prompt_kind(self) -> Option<PromptKind> {
        match self {
            Self::Method => Some(PromptKind::Method),
            Self::Experiment => Some(PromptKind::Experiment),
            Self::Reviewer => Some(PromptKind::Reviewer),
            Self::Architecture => Some(PromptKind::Architecture),
            Self::Code => Some(PromptKind::Code),
            Self::Usage => Some(PromptKind::Usage),
            Self::Vision => Some(PromptKind::Vision),
            Self::TechniqueComparison => Some(PromptKind::TechniqueComparison),
            Self::ExperimentComparison => Some(PromptKind::ExperimentComparison),
            Self::Synthesis => None,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration record for one specialist role.
#[derive(Debug, Clone)]
pub struct RoleProfile {
    /// Role tag.
    pub role: AgentRole,
    /// System prompt.
    pub system_prompt: String,
    /// Model identifier.
    pub model: String,
    /// Response token budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Role tag → profile mapping.
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    profiles: HashMap<AgentRole, RoleProfile>,
}

impl RoleRegistry {
    /// Builds profiles for every specialist role.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        let profiles = [
            AgentRole::Method,
            AgentRole::Experiment,
            AgentRole::Reviewer,
            AgentRole::Architecture,
            AgentRole::Code,
            AgentRole::Usage,
            AgentRole::Vision,
            AgentRole::TechniqueComparison,
            AgentRole::ExperimentComparison,
        ]
        .into_iter()
        .filter_map(|role| {
            role.prompt_kind().map(|kind| {
                (
                    role,
                    RoleProfile {
                        role,
                        system_prompt: prompts.get(kind).to_string(),
                        model: config.model.clone(),
                        max_tokens: config.analyst_max_tokens,
                        temperature: config.temperature,
                    },
                )
            })
        })
        .collect();
        Self { profiles }
    }

    /// Profile for `role`, if it is a specialist role.
    #[must_use]
    pub fn get(&self, role: AgentRole) -> Option<&RoleProfile> {
        self.profiles.get(&role)
    }

    /// Inserts or replaces a profile.
    pub fn insert(&mut self, profile: RoleProfile) {
        self.profiles.insert(profile.role, profile);
    }
}
