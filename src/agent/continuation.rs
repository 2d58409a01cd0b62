//! Continuation controller.
//!
//! Wraps a completion in a bounded loop: while the response looks truncated
//! and the budget allows, ask the model to continue from an anchor (the tail
//! of what it already wrote) and merge the reply after an overlap check.

use std::sync::Arc;

use tracing::{debug, warn};

use super::gateway::CompletionGateway;
use super::message::{ChatRequest, ChatResponse, TokenUsage, assistant_message, user_message};
use crate::core::{CancellationToken, ensure_active};
use crate::error::AgentError;

/// Characters of accumulated output sent back as the anchor.
const ANCHOR_CHARS: usize = 200;
/// Minimum overlap (bytes) accepted as proof of a seamless continuation.
const MIN_OVERLAP: usize = 12;
/// Largest prefix of a continuation searched for overlap.
const MAX_OVERLAP_WINDOW: usize = 4096;

/// Decides whether a response was cut short.
///
/// Any `Fn(&ChatResponse) -> bool` is a detector, so tests and callers can
/// plug in their own heuristic.
pub trait TruncationDetector: Send + Sync {
    /// Returns `true` if `response` looks truncated.
    fn is_truncated(&self, response: &ChatResponse) -> bool;
}

impl<F> TruncationDetector for F
where
    F: Fn(&ChatResponse) -> bool + Send + Sync,
{
    fn is_truncated(&self, response: &ChatResponse) -> bool {
        self(response)
    }
}

/// Trusts the provider's `"length"` finish reason.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinishReasonDetector;

impl TruncationDetector for FinishReasonDetector {
    fn is_truncated(&self, response: &ChatResponse) -> bool {
        response.hit_length_limit()
    }
}

/// Looks for output that ends mid-structure: an unclosed code fence, or a
/// JSON document whose brackets never close.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralDetector;

impl TruncationDetector for StructuralDetector {
    fn is_truncated(&self, response: &ChatResponse) -> bool {
        let text = response.content.trim();
        if text.is_empty() {
            return false;
        }
        if text.matches("```").count() % 2 == 1 {
            return true;
        }
        let starts_json = text.starts_with('{') || text.starts_with('[');
        starts_json && json_depth(text) > 0
    }
}

/// Combines the finish-reason hint with the structural check.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDetector;

impl TruncationDetector for DefaultDetector {
    fn is_truncated(&self, response: &ChatResponse) -> bool {
        FinishReasonDetector.is_truncated(response) || StructuralDetector.is_truncated(response)
    }
}

/// Net bracket depth at the end of `text`, ignoring brackets inside strings.
fn json_depth(text: &str) -> i64 {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Result of merging a continuation into accumulated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    /// Merged text.
    pub text: String,
    /// Bytes of the continuation dropped as overlap.
    pub overlap: usize,
    /// `true` when no overlap was found and a separator was inserted.
    pub discontinuity: bool,
}

/// Appends `next` to `acc` without duplicating text.
///
/// The longest prefix of `next` that is also a suffix of `acc` is dropped,
/// provided it is at least [`MIN_OVERLAP`] bytes or covers all of `acc`.
/// Without such an overlap a newline separator is inserted and the merge is
/// flagged as a possible discontinuity.
#[must_use]
pub fn merge_continuation(acc: &str, next: &str) -> Merge {
    if next.is_empty() {
        return Merge {
            text: acc.to_string(),
            overlap: 0,
            discontinuity: false,
        };
    }
    if acc.is_empty() {
        return Merge {
            text: next.to_string(),
            overlap: 0,
            discontinuity: false,
        };
    }

    let window = acc.len().min(next.len()).min(MAX_OVERLAP_WINDOW);
    let overlap = (1..=window)
        .rev()
        .filter(|&k| next.is_char_boundary(k))
        .find(|&k| acc.ends_with(&next[..k]))
        .filter(|&k| k >= MIN_OVERLAP || k == acc.len());

    match overlap {
        Some(k) => Merge {
            text: format!("{acc}{}", &next[k..]),
            overlap: k,
            discontinuity: false,
        },
        None => Merge {
            text: format!("{acc}\n{next}"),
            overlap: 0,
            discontinuity: true,
        },
    }
}

/// Output of a continuation-wrapped completion.
#[derive(Debug, Clone, Default)]
pub struct ContinuedText {
    /// Accumulated text.
    pub text: String,
    /// `true` when the budget ran out (or a continuation failed) while the
    /// output still looked truncated.
    pub truncated: bool,
    /// Continuation requests issued.
    pub continuations: u32,
    /// Merges that fell back to a separator.
    pub discontinuities: u32,
    /// Usage summed over every call.
    pub usage: TokenUsage,
}

/// Bounded continue-on-truncation loop over a [`CompletionGateway`].
#[derive(Clone)]
pub struct ContinuationController {
    gateway: Arc<CompletionGateway>,
    detector: Arc<dyn TruncationDetector>,
    max_continuations: u32,
}

impl ContinuationController {
    /// Creates a controller with the [`DefaultDetector`].
    #[must_use]
    pub fn new(gateway: Arc<CompletionGateway>, max_continuations: u32) -> Self {
        Self {
            gateway,
            detector: Arc::new(DefaultDetector),
            max_continuations,
        }
    }

    /// Replaces the truncation heuristic.
    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn TruncationDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// The underlying gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<CompletionGateway> {
        &self.gateway
    }

    /// Runs `request`, continuing while the output looks truncated.
    ///
    /// A failed continuation call keeps what was accumulated and reports it
    /// with `truncated = true`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first call, or [`AgentError::Cancelled`]
    /// if cancellation is observed at any step.
    pub async fn complete_with_continuation(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ContinuedText, AgentError> {
        let first = self.gateway.complete(request, cancel).await?;
        let mut truncated = self.detector.is_truncated(&first);
        let mut out = ContinuedText {
            text: first.content,
            usage: first.usage,
            ..ContinuedText::default()
        };

        while truncated && out.continuations < self.max_continuations {
            ensure_active(cancel)?;
            out.continuations += 1;
            debug!(
                agent = %request.agent,
                continuation = out.continuations,
                max = self.max_continuations,
                "Response truncated, requesting continuation"
            );

            let follow_up = continuation_request(request, &out.text);
            let response = match self.gateway.complete(&follow_up, cancel).await {
                Ok(response) => response,
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => {
                    warn!(agent = %request.agent, error = %e, "Continuation failed, keeping partial output");
                    out.truncated = true;
                    return Ok(out);
                }
            };

            out.usage.accumulate(response.usage);
            let merge = merge_continuation(&out.text, &response.content);
            if merge.discontinuity {
                out.discontinuities += 1;
                warn!(
                    agent = %request.agent,
                    continuation = out.continuations,
                    "No overlap with prior output, inserted separator (possible discontinuity)"
                );
            }
            out.text = merge.text;
            truncated = self.detector.is_truncated(&ChatResponse {
                content: out.text.clone(),
                usage: response.usage,
                finish_reason: response.finish_reason,
            });
        }

        out.truncated = truncated;
        if truncated {
            warn!(
                agent = %request.agent,
                continuations = out.continuations,
                "Continuation budget exhausted, output still truncated"
            );
        }
        Ok(out)
    }
}

impl std::fmt::Debug for ContinuationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationController")
            .field("max_continuations", &self.max_continuations)
            .finish_non_exhaustive()
    }
}

/// The original conversation plus the partial answer and a continue request
/// anchored on its tail.
fn continuation_request(original: &ChatRequest, partial: &str) -> ChatRequest {
    let anchor = tail_chars(partial, ANCHOR_CHARS);
    let mut request = original.clone();
    request.messages.push(assistant_message(partial));
    request.messages.push(user_message(&format!(
        "Your previous answer was cut off. Continue exactly where you stopped.\n\
         Start your reply by repeating the anchor below verbatim, then keep writing.\n\
         Do not restart, summarize or repeat anything before the anchor.\n\
         <anchor>{anchor}</anchor>"
    )));
    request
}

fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    text.char_indices()
        .nth(count - n)
        .map_or(text, |(i, _)| &text[i..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::system_message;
    use crate::agent::testing::{ScriptedProvider, gateway, test_config};
    use test_case::test_case;

    fn request() -> ChatRequest {
        ChatRequest {
            agent: "method".to_string(),
            model: "gpt-4o-mini".to_string(),
            messages: vec![system_message("s"), user_message("analyze")],
            temperature: None,
            max_tokens: Some(64),
            json_mode: false,
            stream: false,
        }
    }

    fn response(content: &str, finish: &str) -> ChatResponse {
        ChatResponse::text(content, finish)
    }

    #[test_case("The method works.", "stop", false ; "complete prose")]
    #[test_case("The method works and", "length", true ; "length hint")]
    #[test_case("```rust\nfn main() {", "stop", true ; "open code fence")]
    #[test_case("```rust\nfn main() {}\n```", "stop", false ; "closed code fence")]
    #[test_case("{\"sections\": [\"a\", \"b\"", "stop", true ; "open json")]
    #[test_case("{\"note\": \"a ] in a string\"}", "stop", false ; "bracket inside string")]
    #[test_case("", "stop", false ; "empty")]
    fn test_default_detector(content: &str, finish: &str, expected: bool) {
        assert_eq!(DefaultDetector.is_truncated(&response(content, finish)), expected);
    }

    #[test]
    fn test_merge_drops_overlap() {
        let merged = merge_continuation(
            "The encoder uses six layers of attention",
            "six layers of attention with residual connections.",
        );
        assert!(!merged.discontinuity);
        assert_eq!(
            merged.text,
            "The encoder uses six layers of attention with residual connections."
        );
        assert_eq!(merged.overlap, "six layers of attention".len());
    }

    #[test]
    fn test_merge_short_overlap_is_discontinuity() {
        let merged = merge_continuation("ends with the", "the next part");
        assert!(merged.discontinuity);
        assert_eq!(merged.text, "ends with the\nthe next part");
    }

    #[test]
    fn test_merge_whole_restart_is_deduplicated() {
        let merged = merge_continuation("Short", "Short answer, finished.");
        assert!(!merged.discontinuity);
        assert_eq!(merged.text, "Short answer, finished.");
    }

    #[test]
    fn test_merge_respects_char_boundaries() {
        let merged = merge_continuation("研究方法包括检索增强生成", "检索增强生成和重排序");
        assert!(!merged.discontinuity);
        assert_eq!(merged.text, "研究方法包括检索增强生成和重排序");
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 3), "ab");
        assert_eq!(tail_chars("日本語テキスト", 2), "スト");
    }

    /// Provider whose first `k` replies hit the length limit; each reply
    /// echoes the anchor so merges are seamless.
    fn truncating_provider(k: usize) -> ScriptedProvider {
        ScriptedProvider::new(move |req, n| {
            let anchor = req
                .messages
                .last()
                .and_then(|m| m.content.split_once("<anchor>"))
                .and_then(|(_, rest)| rest.split_once("</anchor>"))
                .map(|(a, _)| a.to_string())
                .unwrap_or_default();
            let finish = if n < k { "length" } else { "stop" };
            Ok(ChatResponse::text(format!("{anchor} part {n} of the answer"), finish))
        })
    }

    #[test_case(0 ; "no truncation")]
    #[test_case(1 ; "one truncation")]
    #[test_case(3 ; "budget exactly")]
    #[tokio::test]
    async fn test_k_truncations_within_budget(k: usize) {
        let provider = std::sync::Arc::new(truncating_provider(k));
        let controller = ContinuationController::new(gateway(&provider, &test_config()), 3);
        let out = controller
            .complete_with_continuation(&request(), &CancellationToken::new())
            .await
            .unwrap_or_default();
        assert!(!out.truncated);
        assert_eq!(out.continuations as usize, k);
        assert_eq!(provider.calls(), k + 1);
        assert_eq!(out.discontinuities, 0);
        assert!(out.text.contains(&format!("part {k} of the answer")));
    }

    #[test_case(4 ; "one over budget")]
    #[test_case(10 ; "far over budget")]
    #[tokio::test]
    async fn test_k_truncations_over_budget(k: usize) {
        let provider = std::sync::Arc::new(truncating_provider(k));
        let controller = ContinuationController::new(gateway(&provider, &test_config()), 3);
        let out = controller
            .complete_with_continuation(&request(), &CancellationToken::new())
            .await
            .unwrap_or_default();
        assert!(out.truncated);
        assert_eq!(out.continuations, 3);
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_failed_continuation_keeps_partial() {
        let provider = std::sync::Arc::new(ScriptedProvider::new(|_, n| {
            if n == 0 {
                Ok(ChatResponse::text("partial output", "length"))
            } else {
                Err(AgentError::ApiRequest {
                    message: "bad request".to_string(),
                    status: Some(400),
                })
            }
        }));
        let controller = ContinuationController::new(gateway(&provider, &test_config()), 3);
        let out = controller
            .complete_with_continuation(&request(), &CancellationToken::new())
            .await
            .unwrap_or_default();
        assert!(out.truncated);
        assert_eq!(out.text, "partial output");
    }

    #[tokio::test]
    async fn test_custom_detector() {
        let provider = std::sync::Arc::new(ScriptedProvider::new(|_, n| {
            Ok(ChatResponse::text(format!("chunk {n}..."), "stop"))
        }));
        let detector: Arc<dyn TruncationDetector> =
            Arc::new(|r: &ChatResponse| r.content.ends_with("..."));
        let controller = ContinuationController::new(gateway(&provider, &test_config()), 2)
            .with_detector(detector);
        let out = controller
            .complete_with_continuation(&request(), &CancellationToken::new())
            .await
            .unwrap_or_default();
        assert!(out.truncated);
        assert_eq!(out.continuations, 2);
        assert_eq!(out.discontinuities, 2);
    }
}
