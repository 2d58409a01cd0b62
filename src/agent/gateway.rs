//! Completion gateway: the single path from agents to the provider.
//!
//! Bounds outstanding requests with a semaphore, applies the per-call
//! timeout, retries transient failures with exponential backoff and checks
//! the cancellation token immediately before and after every outbound call.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::{ChatRequest, ChatResponse};
use super::provider::{ChunkStream, LlmProvider};
use crate::core::{CancellationToken, ensure_active};
use crate::error::AgentError;

/// Shared wrapper around an [`LlmProvider`].
///
/// Cloned configuration is captured at construction; the gateway never
/// changes it while requests are outstanding.
pub struct CompletionGateway {
    provider: Arc<dyn LlmProvider>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    request_delay: Duration,
}

impl CompletionGateway {
    /// Creates a gateway bounded by `config.max_concurrency`.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            timeout: config.timeout,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            request_delay: config.request_delay,
        }
    }

    /// Name of the underlying provider.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Issues a blocking completion.
    ///
    /// Timeouts count as transient failures and consume a retry attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if the token fires, the last
    /// transient error once the retry budget is spent, or any
    /// non-retryable error immediately.
    pub async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, AgentError> {
        let mut attempt: u32 = 0;
        let mut backoff = self.retry_backoff;

        loop {
            match self.attempt(request, cancel).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        agent = %request.agent,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Transient completion failure, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(AgentError::Cancelled),
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, AgentError> {
        ensure_active(cancel)?;
        let _permit = tokio::select! {
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            permit = self.semaphore.acquire() => permit.map_err(|e| AgentError::Orchestration {
                message: format!("Semaphore acquire failed: {e}"),
            })?,
        };

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        ensure_active(cancel)?;
        debug!(agent = %request.agent, model = %request.model, "Issuing completion");

        let outcome = tokio::select! {
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.provider.chat(request)) => outcome,
        };

        ensure_active(cancel)?;
        outcome.unwrap_or(Err(AgentError::Timeout {
            seconds: self.timeout.as_secs(),
        }))
    }

    /// Issues a streaming completion.
    ///
    /// The concurrency permit is held until the stream is dropped; the
    /// stream ends early once the token fires.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the stream cannot be opened.
    pub async fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, AgentError> {
        ensure_active(cancel)?;
        let permit = tokio::select! {
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|e| AgentError::Orchestration {
                    message: format!("Semaphore acquire failed: {e}"),
                })?
            }
        };
        ensure_active(cancel)?;

        let stream = tokio::time::timeout(self.timeout, self.provider.chat_stream(request))
            .await
            .unwrap_or(Err(AgentError::Timeout {
                seconds: self.timeout.as_secs(),
            }))?;

        let guarded = stream
            .map(move |chunk| {
                let _held = &permit;
                chunk
            })
            .take_until(cancel.clone().cancelled_owned());
        Ok(Box::pin(guarded))
    }
}

impl std::fmt::Debug for CompletionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionGateway")
            .field("provider", &self.provider.name())
            .field("available_permits", &self.semaphore.available_permits())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::user_message;
    use crate::agent::testing::{ScriptedProvider, gateway, test_config};

    fn request() -> ChatRequest {
        ChatRequest {
            agent: "test".to_string(),
            model: "gpt-4o-mini".to_string(),
            messages: vec![user_message("hi")],
            temperature: None,
            max_tokens: None,
            json_mode: false,
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_retries_network_errors() {
        let provider = Arc::new(ScriptedProvider::new(|_, n| {
            if n < 2 {
                Err(AgentError::Network {
                    message: "reset".to_string(),
                })
            } else {
                Ok(ChatResponse::text("ok", "stop"))
            }
        }));
        let gw = gateway(&provider, &test_config());
        let response = gw.complete(&request(), &CancellationToken::new()).await;
        assert_eq!(response.map(|r| r.content).unwrap_or_default(), "ok");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| {
            Err(AgentError::Network {
                message: "down".to_string(),
            })
        }));
        let gw = gateway(&provider, &test_config());
        let result = gw.complete(&request(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(AgentError::Network { .. })));
        // One initial attempt plus three retries.
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| {
            Err(AgentError::Auth {
                message: "bad key".to_string(),
            })
        }));
        let gw = gateway(&provider, &test_config());
        let result = gw.complete(&request(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(AgentError::Auth { .. })));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_call_issues_nothing() {
        let provider = Arc::new(ScriptedProvider::constant("unused"));
        let gw = gateway(&provider, &test_config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = gw.complete(&request(), &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_consumes_retry_attempts() {
        let provider = Arc::new(
            ScriptedProvider::constant("slow").with_latency(Duration::from_millis(200)),
        );
        let config = AgentConfig::builder()
            .api_key("k")
            .timeout(Duration::from_millis(10))
            .max_retries(1)
            .retry_backoff(Duration::from_millis(1))
            .build()
            .unwrap_or_else(|_| unreachable!());
        let gw = gateway(&provider, &config);
        let result = gw.complete(&request(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(AgentError::Timeout { .. })));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let provider = Arc::new(
            ScriptedProvider::constant("ok").with_latency(Duration::from_millis(20)),
        );
        let config = AgentConfig::builder()
            .api_key("k")
            .max_concurrency(2)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let gw = gateway(&provider, &config);
        let cancel = CancellationToken::new();
        let calls = (0..6).map(|_| {
            let gw = Arc::clone(&gw);
            let cancel = cancel.clone();
            tokio::spawn(async move { gw.complete(&request(), &cancel).await })
        });
        let results = futures_util::future::join_all(calls).await;
        assert!(results.iter().all(|r| matches!(r, Ok(Ok(_)))));
        assert_eq!(provider.calls(), 6);
        assert!(provider.peak_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_stream_collects_chunks() {
        let provider = Arc::new(ScriptedProvider::constant("a streamed reply"));
        let gw = gateway(&provider, &test_config());
        let stream = gw.stream(&request(), &CancellationToken::new()).await;
        let chunks: Vec<_> = match stream {
            Ok(s) => s.collect().await,
            Err(_) => Vec::new(),
        };
        let text: String = chunks.into_iter().filter_map(Result::ok).collect();
        assert_eq!(text, "a streamed reply");
    }
}
