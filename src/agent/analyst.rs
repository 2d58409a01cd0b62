//! Specialist and vision analysts.
//!
//! Each analyst is a stateless function of (content slice, shared context,
//! role instructions) implemented as one continuation-wrapped completion
//! call with the role's fixed system prompt.

use async_trait::async_trait;
use tracing::debug;

use super::capabilities::ModelCapabilities;
use super::continuation::{ContinuationController, ContinuedText};
use super::finding::AgentFinding;
use super::message::{user_message, user_message_with_images};
use super::prompt::{build_analyst_prompt, build_vision_prompt};
use super::role::{AgentRole, RoleProfile};
use super::traits::Agent;
use crate::core::{CancellationToken, ResultItem, TargetContent};
use crate::error::AgentError;

/// Characters of target content given to one specialist.
pub const ANALYST_CONTENT_CHARS: usize = 24_000;

/// Images sent to the vision analyst per target.
pub const MAX_VISION_IMAGES: usize = 3;

/// Characters of textual context accompanying the images.
const VISION_CONTEXT_CHARS: usize = 2_000;

fn finding_from(role: AgentRole, target: &ResultItem, out: &ContinuedText) -> AgentFinding {
    AgentFinding {
        role,
        target_id: target.target_id(),
        text: out.text.clone(),
        truncated: out.truncated,
        continuation_count: out.continuations,
    }
}

/// Text analyst for one role.
pub struct SpecialistAgent {
    profile: RoleProfile,
}

impl SpecialistAgent {
    /// Creates an analyst from a role profile.
    #[must_use]
    pub const fn new(profile: RoleProfile) -> Self {
        Self { profile }
    }

    /// Role this analyst plays.
    #[must_use]
    pub const fn role(&self) -> AgentRole {
        self.profile.role
    }

    /// Runs the role on a prepared user prompt.
    ///
    /// # Errors
    ///
    /// Returns the gateway error of the first call, or
    /// [`AgentError::Cancelled`].
    pub async fn analyze(
        &self,
        controller: &ContinuationController,
        target: &ResultItem,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<(AgentFinding, ContinuedText), AgentError> {
        let out = self
            .execute_continued(controller, user_message(prompt), cancel)
            .await?;
        debug!(
            role = %self.role(),
            target = %target.target_id(),
            continuations = out.continuations,
            truncated = out.truncated,
            "Specialist finished"
        );
        Ok((finding_from(self.role(), target, &out), out))
    }
}

/// User prompt for a specialist reading the target's own content.
#[must_use]
pub fn target_prompt(target: &ResultItem, content: &str, instructions: Option<&str>) -> String {
    let slice: String = content.chars().take(ANALYST_CONTENT_CHARS).collect();
    build_analyst_prompt(&target.header(), &slice, instructions.unwrap_or(""))
}

#[async_trait]
impl Agent for SpecialistAgent {
    fn name(&self) -> &'static str {
        self.profile.role.as_str()
    }

    fn model(&self) -> &str {
        &self.profile.model
    }

    fn system_prompt(&self) -> &str {
        &self.profile.system_prompt
    }

    fn temperature(&self) -> f32 {
        self.profile.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.profile.max_tokens
    }
}

/// Analyst for extracted images.
///
/// Only dispatched when the model declares multimodal support; callers
/// check [`VisionAgent::supported`] and mark the section skipped otherwise.
pub struct VisionAgent {
    profile: RoleProfile,
    capabilities: ModelCapabilities,
}

impl VisionAgent {
    /// Creates the vision analyst, detecting capability from the profile's model.
    #[must_use]
    pub fn new(profile: RoleProfile, vision_override: Option<bool>) -> Self {
        let capabilities = ModelCapabilities::for_model(&profile.model, vision_override);
        Self {
            profile,
            capabilities,
        }
    }

    /// Whether the configured model accepts images.
    #[must_use]
    pub const fn supported(&self) -> bool {
        self.capabilities.supports_vision
    }

    /// Analyzes up to [`MAX_VISION_IMAGES`] images of `content`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnsupportedCapability`] without issuing a call
    /// when the model lacks vision support, otherwise as
    /// [`SpecialistAgent::analyze`].
    pub async fn analyze(
        &self,
        controller: &ContinuationController,
        target: &ResultItem,
        content: &TargetContent,
        instructions: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(AgentFinding, ContinuedText), AgentError> {
        if !self.supported() {
            return Err(AgentError::UnsupportedCapability {
                capability: "vision".to_string(),
                model: self.profile.model.clone(),
            });
        }

        let images: Vec<_> = content.images.iter().take(MAX_VISION_IMAGES).cloned().collect();
        let context: String = content.text.chars().take(VISION_CONTEXT_CHARS).collect();
        let prompt = build_vision_prompt(&context, images.len(), instructions.unwrap_or(""));
        let out = self
            .execute_continued(controller, user_message_with_images(&prompt, images), cancel)
            .await?;
        Ok((finding_from(AgentRole::Vision, target, &out), out))
    }
}

#[async_trait]
impl Agent for VisionAgent {
    fn name(&self) -> &'static str {
        AgentRole::Vision.as_str()
    }

    fn model(&self) -> &str {
        &self.profile.model
    }

    fn system_prompt(&self) -> &str {
        &self.profile.system_prompt
    }

    fn temperature(&self) -> f32 {
        self.profile.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.profile.max_tokens
    }
}
