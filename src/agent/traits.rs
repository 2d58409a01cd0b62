//! Agent trait definition.
//!
//! Every LLM-backed agent (planner, interviewer, filter, specialists,
//! synthesizer) implements this trait, which turns the agent's fixed
//! configuration into a [`ChatRequest`] and runs it through the gateway.

use async_trait::async_trait;

use super::continuation::{ContinuationController, ContinuedText};
use super::gateway::CompletionGateway;
use super::message::{ChatMessage, ChatRequest, TokenUsage, system_message, user_message};
use crate::core::CancellationToken;
use crate::error::AgentError;

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Trait implemented by all agents in the system.
///
/// Agents are stateless request/response workers: a fixed system prompt and
/// model configuration, no memory between invocations.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Builds the request for a single user message.
    fn build_request(&self, user_msg: &str) -> ChatRequest {
        self.build_request_with(user_message(user_msg))
    }

    /// Builds the request around an already constructed user message.
    fn build_request_with(&self, user_msg: ChatMessage) -> ChatRequest {
        ChatRequest {
            agent: self.name().to_string(),
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_msg],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
            stream: false,
        }
    }

    /// Executes the agent with the given user message.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on gateway failures or cancellation.
    async fn execute(
        &self,
        gateway: &CompletionGateway,
        user_msg: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse, AgentError> {
        let request = self.build_request(user_msg);
        let response = gateway.complete(&request, cancel).await?;

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }

    /// Executes the agent through the continuation controller.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the first call fails or on cancellation.
    async fn execute_continued(
        &self,
        controller: &ContinuationController,
        user_msg: ChatMessage,
        cancel: &CancellationToken,
    ) -> Result<ContinuedText, AgentError> {
        let request = self.build_request_with(user_msg);
        controller.complete_with_continuation(&request, cancel).await
    }
}
