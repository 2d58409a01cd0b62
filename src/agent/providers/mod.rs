//! Concrete [`LlmProvider`](super::provider::LlmProvider) backends.

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;
