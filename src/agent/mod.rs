//! Multi-agent analysis system.
//!
//! Every model call goes through one [`CompletionGateway`] (bounded
//! concurrency, retries, timeouts) and, for free-text output, the
//! [`ContinuationController`] that stitches truncated responses together.
//!
//! # Architecture
//!
//! ```text
//! Interview → SearchIntent → planner → runner → FilterAgent
//!
//! Target → Orchestrator
//!   ├── BrainAgent (plans an AnalysisTask from the role set)
//!   ├── Concurrent leaves: SpecialistAgent per role (+ VisionAgent)
//!   ├── Join barrier
//!   └── ReportSynthesizer (+ quality review) → SynthesizedReport
//!
//! BatchCoordinator: many targets, bounded, cancellable, with events
//! Related research: keywords → 3-year search → filter → comparison task
//! ```

pub mod analyst;
pub mod batch;
pub mod brain;
pub mod capabilities;
pub mod client;
pub mod config;
pub mod continuation;
pub mod filter;
pub mod finding;
pub mod gateway;
pub mod interview;
pub mod json;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod related;
pub mod role;
pub mod synthesizer;
pub mod task;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchCoordinator, BatchEvent, BatchHandle, BatchSummary, TargetOutcome, TargetStatus};
pub use capabilities::ModelCapabilities;
pub use config::AgentConfig;
pub use continuation::{ContinuationController, ContinuedText, TruncationDetector};
pub use filter::{FilterAgent, FilterResult, FilteredItem};
pub use finding::{AgentFinding, ReportKind, ReportStatus, Section, SectionOutcome, SynthesizedReport};
pub use gateway::CompletionGateway;
pub use interview::{InterviewSession, InterviewState, TurnOutcome};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::{AnalysisOptions, Orchestrator};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use related::{RelatedReport, find_related};
pub use role::{AgentRole, RoleProfile, RoleRegistry};
pub use task::{AnalysisTask, Subtask};
pub use traits::Agent;
