//! # paper-scout
//!
//! Multi-agent discovery and analysis of research papers, code
//! repositories and model cards.
//!
//! A conversational [interview](agent::InterviewSession) turns a vague need
//! into a [`SearchIntent`](core::SearchIntent). The [planner](search::plan)
//! splits it into per-source paginated queries, the
//! [runner](search::SearchRunner) executes them with backfill, and an LLM
//! [filter](agent::FilterAgent) keeps what is relevant. Selected items are
//! analyzed by a task graph of role agents whose findings are merged into a
//! single report, optionally reviewed and compared against related work.
//!
//! [`Scout`] ties the pieces together behind one cancellable API.

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;
pub mod scout;
pub mod search;

pub use error::{AgentError, Error, Result};
pub use scout::{Scout, SearchResults};
