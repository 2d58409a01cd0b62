//! Source connector boundary.
//!
//! Every source (paper repository, code host, the two model hubs) is an
//! interchangeable instance of [`SourceConnector`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{DateRange, ResultItem, SourceKind, TargetContent};
use crate::error::AgentError;

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Items on this page.
    pub items: Vec<ResultItem>,
    /// Token for the next page, `None` when the source is exhausted.
    pub next_page_token: Option<String>,
}

/// A searchable source.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Source this connector serves.
    fn source(&self) -> SourceKind;

    /// Fetches one page of results.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Connector`] when the source cannot be queried.
    async fn search(
        &self,
        query: &str,
        window: &DateRange,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<SearchPage, AgentError>;

    /// Fetches the analyzable content of an item.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Connector`] when the content cannot be fetched.
    async fn fetch_content(&self, item: &ResultItem) -> Result<TargetContent, AgentError>;
}

/// Connectors keyed by source.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: BTreeMap<SourceKind, Arc<dyn SourceConnector>>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connector under its own source, replacing any previous one.
    pub fn insert(&mut self, connector: Arc<dyn SourceConnector>) {
        self.connectors.insert(connector.source(), connector);
    }

    /// Connector for `source`.
    #[must_use]
    pub fn get(&self, source: SourceKind) -> Option<&Arc<dyn SourceConnector>> {
        self.connectors.get(&source)
    }

    /// Sources with a connector.
    pub fn sources(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.connectors.keys().copied()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("sources", &self.connectors.keys().collect::<Vec<_>>())
            .finish()
    }
}
