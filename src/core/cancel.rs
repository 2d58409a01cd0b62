//! Cooperative cancellation.
//!
//! One [`CancellationToken`] is created per user-initiated search or batch
//! and passed explicitly to every suspension point. Components call
//! [`ensure_active`] immediately before issuing an outbound request and
//! immediately after it returns.

pub use tokio_util::sync::CancellationToken;

use crate::error::AgentError;

/// Returns [`AgentError::Cancelled`] if the token has been cancelled.
///
/// # Errors
///
/// Returns [`AgentError::Cancelled`] when `token.is_cancelled()`.
pub fn ensure_active(token: &CancellationToken) -> Result<(), AgentError> {
    if token.is_cancelled() {
        Err(AgentError::Cancelled)
    } else {
        Ok(())
    }
}
