//! Error types for paper-scout.
//!
//! [`AgentError`] carries the orchestration taxonomy (network, auth, parse,
//! capability, cancellation). [`Error`] wraps it together with CLI-level
//! failures for the binary.

use std::fmt;

use thiserror::Error;

/// Result alias used by the CLI layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Agent or orchestration failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while executing CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A command could not be completed.
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    /// An argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors raised by the agent system.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured.
    #[error("no API key configured (set OPENAI_API_KEY or SCOUT_API_KEY)")]
    ApiKeyMissing,

    /// Unknown provider name.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name that was requested.
        name: String,
    },

    /// Transport-level failure (connection reset, DNS, 5xx, rate limit).
    #[error("network error: {message}")]
    Network {
        /// Error description.
        message: String,
    },

    /// A completion call exceeded its time bound.
    #[error("request timed out after {seconds}s")]
    Timeout {
        /// Configured bound in seconds.
        seconds: u64,
    },

    /// Credential rejected by the provider.
    #[error("authentication failed: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Provider rejected the request for a non-transient reason.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error description.
        message: String,
        /// HTTP status code, when known.
        status: Option<u16>,
    },

    /// Model output did not match the expected structure.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// Parse diagnostic.
        message: String,
        /// Raw response content.
        content: String,
    },

    /// A capability (e.g. vision) is not supported by the configured model.
    #[error("model '{model}' does not support {capability}")]
    UnsupportedCapability {
        /// Capability that was requested.
        capability: String,
        /// Model identifier.
        model: String,
    },

    /// The operation observed its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Streaming response failure.
    #[error("stream error: {message}")]
    Stream {
        /// Error description.
        message: String,
    },

    /// An analysis task graph violated its invariants.
    #[error("invalid task graph: {message}")]
    InvalidTaskGraph {
        /// Violation description.
        message: String,
    },

    /// An interview operation was attempted in the wrong state.
    #[error("interview is {state}: {message}")]
    InterviewState {
        /// Current state name.
        state: String,
        /// What was attempted.
        message: String,
    },

    /// A source connector failed.
    #[error("{source_name} connector failed: {message}")]
    Connector {
        /// Source tag.
        source_name: String,
        /// Error description.
        message: String,
    },

    /// General orchestration failure.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Error description.
        message: String,
    },
}

/// Coarse classification of an [`AgentError`], used for outcome reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient transport failure or timeout.
    Network,
    /// Credential or configuration fault.
    Auth,
    /// Structurally invalid model output.
    Parse,
    /// Capability not supported by the model.
    UnsupportedCapability,
    /// Cooperative cancellation.
    Cancelled,
    /// Anything else.
    Other,
}

impl AgentError {
    /// Returns `true` for failures worth retrying with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Returns `true` if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` for configuration-level faults that should abort
    /// the surrounding operation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::ApiKeyMissing | Self::UnsupportedProvider { .. }
        )
    }

    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::Stream { .. } => {
                ErrorKind::Network
            }
            Self::Auth { .. } | Self::ApiKeyMissing | Self::UnsupportedProvider { .. } => {
                ErrorKind::Auth
            }
            Self::ResponseParse { .. } => ErrorKind::Parse,
            Self::UnsupportedCapability { .. } => ErrorKind::UnsupportedCapability,
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Parse => "parse",
            Self::UnsupportedCapability => "unsupported_capability",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}
