//! Scripted provider doubles shared by the agent tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::config::AgentConfig;
use super::gateway::CompletionGateway;
use super::message::{ChatRequest, ChatResponse};
use super::provider::{ChunkStream, LlmProvider};
use crate::error::AgentError;

type Responder = dyn Fn(&ChatRequest, usize) -> Result<ChatResponse, AgentError> + Send + Sync;

/// Provider that answers every request with a closure.
///
/// The closure receives the request and the zero-based call number. The
/// provider records every request and the peak number of concurrent calls.
pub struct ScriptedProvider {
    responder: Box<Responder>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest, usize) -> Result<ChatResponse, AgentError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with the same text and `"stop"` to everything.
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(ChatResponse::text(text.clone(), "stop")))
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// Requests issued by the named agent.
    pub fn requests_for(&self, agent: &str) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.agent == agent)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(request, n)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, AgentError> {
        let response = self.chat(request).await?;
        let chunks: Vec<Result<String, AgentError>> = response
            .content
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

/// Config with fast retries and no review pass unless a test opts in.
pub fn test_config() -> AgentConfig {
    AgentConfig::builder()
        .api_key("test-key")
        .model("gpt-4o-mini")
        .retry_backoff(Duration::from_millis(1))
        .timeout(Duration::from_secs(5))
        .quality_review(false)
        .build()
        .unwrap_or_else(|_| unreachable!())
}

/// Gateway over a scripted provider.
pub fn gateway(provider: &Arc<ScriptedProvider>, config: &AgentConfig) -> Arc<CompletionGateway> {
    let provider: Arc<dyn LlmProvider> = provider.clone();
    Arc::new(CompletionGateway::new(provider, config))
}
