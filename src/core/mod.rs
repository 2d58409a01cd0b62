//! Core data model shared by the interview, search and analysis layers.
//!
//! Nothing here talks to a model or a network; these are the value types
//! that flow between components.

pub mod cancel;
pub mod intent;
pub mod item;
pub mod relevance;

pub use cancel::{CancellationToken, ensure_active};
pub use intent::{
    DateRange, IntentMode, MAX_RESULT_LIMIT, MAX_WINDOW_DAYS, SearchIntent, SourceKind, TimeWindow,
};
pub use item::{ImageAttachment, ItemMetadata, ResultItem, TargetContent, TargetKind};
pub use relevance::Relevance;
