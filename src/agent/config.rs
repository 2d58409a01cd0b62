//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! A built [`AgentConfig`] is never mutated; operations started later pick up
//! a freshly built one.

use std::path::PathBuf;
use std::time::Duration;

use super::interview::MAX_USER_TURNS;
use crate::error::AgentError;

/// Default maximum outstanding completion requests.
const DEFAULT_MAX_CONCURRENCY: usize = 8;
/// Default number of targets analyzed at once in a batch.
const DEFAULT_BATCH_CONCURRENCY: usize = 3;
/// Default specialist max tokens.
const DEFAULT_ANALYST_MAX_TOKENS: u32 = 4096;
/// Default synthesizer max tokens.
const DEFAULT_SYNTHESIZER_MAX_TOKENS: u32 = 4096;
/// Default planner (brain, interview, filter) max tokens.
const DEFAULT_PLANNER_MAX_TOKENS: u32 = 2048;
/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.3;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default max retries for transient failures.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default initial retry backoff in milliseconds.
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
/// Default continuation budget per completion.
const DEFAULT_MAX_CONTINUATIONS: u32 = 3;

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for specialist and vision agents.
    pub model: String,
    /// Model for planning agents (brain, interview, strategy, filter, keywords).
    pub planner_model: String,
    /// Model for synthesis and quality review.
    pub synthesizer_model: String,
    /// Maximum outstanding completion requests across the process.
    pub max_concurrency: usize,
    /// Maximum targets analyzed concurrently by the batch coordinator.
    pub batch_concurrency: usize,
    /// Maximum tokens for specialist responses.
    pub analyst_max_tokens: u32,
    /// Maximum tokens for planner responses.
    pub planner_max_tokens: u32,
    /// Maximum tokens for synthesizer responses.
    pub synthesizer_max_tokens: u32,
    /// Sampling temperature for free-text agents.
    pub temperature: f32,
    /// Upper bound for a single completion call.
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures.
    pub max_retries: u32,
    /// Initial backoff between retries (doubled each attempt).
    pub retry_backoff: Duration,
    /// Maximum continuation requests after a truncated response.
    pub max_continuations: u32,
    /// Maximum user turns before the interview is forced to `Ready`.
    pub interview_max_turns: usize,
    /// Forces multimodal support on or off, overriding name detection.
    pub vision_override: Option<bool>,
    /// Runs the review/improve pass after synthesis.
    pub quality_review: bool,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to compiled-in defaults.
    pub prompt_dir: Option<PathBuf>,
    /// Minimum delay between API requests.
    ///
    /// Applied after acquiring the concurrency permit.
    pub request_delay: Duration,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    planner_model: Option<String>,
    synthesizer_model: Option<String>,
    max_concurrency: Option<usize>,
    batch_concurrency: Option<usize>,
    analyst_max_tokens: Option<u32>,
    planner_max_tokens: Option<u32>,
    synthesizer_max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff: Option<Duration>,
    max_continuations: Option<u32>,
    interview_max_turns: Option<usize>,
    vision_override: Option<bool>,
    quality_review: Option<bool>,
    prompt_dir: Option<PathBuf>,
    request_delay: Option<Duration>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("SCOUT_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("SCOUT_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("SCOUT_BASE_URL"))
                .ok();
        }
        if self.model.is_none() {
            self.model = std::env::var("SCOUT_MODEL").ok();
        }
        if self.planner_model.is_none() {
            self.planner_model = std::env::var("SCOUT_PLANNER_MODEL").ok();
        }
        if self.synthesizer_model.is_none() {
            self.synthesizer_model = std::env::var("SCOUT_SYNTHESIZER_MODEL").ok();
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = env_parse("SCOUT_MAX_CONCURRENCY");
        }
        if self.batch_concurrency.is_none() {
            self.batch_concurrency = env_parse("SCOUT_BATCH_CONCURRENCY");
        }
        if self.vision_override.is_none() {
            self.vision_override = env_parse("SCOUT_VISION");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("SCOUT_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the specialist model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the planner model.
    #[must_use]
    pub fn planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = Some(model.into());
        self
    }

    /// Sets the synthesizer model.
    #[must_use]
    pub fn synthesizer_model(mut self, model: impl Into<String>) -> Self {
        self.synthesizer_model = Some(model.into());
        self
    }

    /// Sets the maximum outstanding requests.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the number of targets analyzed concurrently.
    #[must_use]
    pub const fn batch_concurrency(mut self, n: usize) -> Self {
        self.batch_concurrency = Some(n);
        self
    }

    /// Sets the specialist max tokens.
    #[must_use]
    pub const fn analyst_max_tokens(mut self, n: u32) -> Self {
        self.analyst_max_tokens = Some(n);
        self
    }

    /// Sets the planner max tokens.
    #[must_use]
    pub const fn planner_max_tokens(mut self, n: u32) -> Self {
        self.planner_max_tokens = Some(n);
        self
    }

    /// Sets the synthesizer max tokens.
    #[must_use]
    pub const fn synthesizer_max_tokens(mut self, n: u32) -> Self {
        self.synthesizer_max_tokens = Some(n);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the initial retry backoff.
    #[must_use]
    pub const fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    /// Sets the continuation budget.
    #[must_use]
    pub const fn max_continuations(mut self, n: u32) -> Self {
        self.max_continuations = Some(n);
        self
    }

    /// Sets the interview turn ceiling; values above
    /// [`MAX_USER_TURNS`] are clamped to it.
    #[must_use]
    pub const fn interview_max_turns(mut self, n: usize) -> Self {
        self.interview_max_turns = Some(n);
        self
    }

    /// Forces multimodal support on or off.
    #[must_use]
    pub const fn vision_override(mut self, enabled: bool) -> Self {
        self.vision_override = Some(enabled);
        self
    }

    /// Enables or disables the post-synthesis review pass.
    #[must_use]
    pub const fn quality_review(mut self, enabled: bool) -> Self {
        self.quality_review = Some(enabled);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the minimum delay between API requests.
    #[must_use]
    pub const fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// Concurrency values are floored at 1.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AgentError::ApiKeyMissing)?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            model: self.model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            planner_model: self.planner_model.unwrap_or_else(|| "gpt-4o".to_string()),
            synthesizer_model: self
                .synthesizer_model
                .unwrap_or_else(|| "gpt-4o".to_string()),
            max_concurrency: self
                .max_concurrency
                .unwrap_or(DEFAULT_MAX_CONCURRENCY)
                .max(1),
            batch_concurrency: self
                .batch_concurrency
                .unwrap_or(DEFAULT_BATCH_CONCURRENCY)
                .max(1),
            analyst_max_tokens: self
                .analyst_max_tokens
                .unwrap_or(DEFAULT_ANALYST_MAX_TOKENS),
            planner_max_tokens: self
                .planner_max_tokens
                .unwrap_or(DEFAULT_PLANNER_MAX_TOKENS),
            synthesizer_max_tokens: self
                .synthesizer_max_tokens
                .unwrap_or(DEFAULT_SYNTHESIZER_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_backoff: self
                .retry_backoff
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS)),
            max_continuations: self.max_continuations.unwrap_or(DEFAULT_MAX_CONTINUATIONS),
            interview_max_turns: self
                .interview_max_turns
                .unwrap_or(MAX_USER_TURNS)
                .clamp(1, MAX_USER_TURNS),
            vision_override: self.vision_override,
            quality_review: self.quality_review.unwrap_or(true),
            prompt_dir: self.prompt_dir,
            request_delay: self.request_delay.unwrap_or(Duration::ZERO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.batch_concurrency, DEFAULT_BATCH_CONCURRENCY);
        assert_eq!(config.max_continuations, 3);
        assert_eq!(config.interview_max_turns, 3);
        assert!(config.quality_review);
        assert!(config.vision_override.is_none());
    }

    #[test]
    fn test_interview_turns_clamped_to_ceiling() {
        let build = |n| {
            AgentConfig::builder()
                .api_key("test-key")
                .interview_max_turns(n)
                .build()
                .map(|c| c.interview_max_turns)
                .unwrap_or_default()
        };
        assert_eq!(build(5), MAX_USER_TURNS);
        assert_eq!(build(0), 1);
        assert_eq!(build(2), 2);
    }

    #[test]
    fn test_builder_missing_api_key() {
        assert!(matches!(
            AgentConfig::builder().build(),
            Err(AgentError::ApiKeyMissing)
        ));
        assert!(AgentConfig::builder().api_key("  ").build().is_err());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .provider("custom")
            .model("gpt-4o")
            .max_concurrency(0)
            .batch_concurrency(5)
            .timeout(Duration::from_secs(30))
            .vision_override(false)
            .quality_review(false)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "custom");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.batch_concurrency, 5);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.vision_override, Some(false));
        assert!(!config.quality_review);
    }
}
