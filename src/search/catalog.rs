//! JSON catalog connector.
//!
//! Serves result items from a local JSON file, one connector per source.
//! Matching is case-insensitive: an item matches when every word of any
//! `OR`-separated query term appears in its title or summary.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::connector::{ConnectorRegistry, SearchPage, SourceConnector};
use crate::core::{DateRange, ImageAttachment, ResultItem, SourceKind, TargetContent};
use crate::error::AgentError;

/// One catalog record: an item plus optional analyzable content.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// The item itself.
    #[serde(flatten)]
    pub item: ResultItem,
    /// Full text (paper body, readme, key files).
    #[serde(default)]
    pub content: Option<String>,
    /// Extracted images.
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
}

/// All entries of a catalog file.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog from entries.
    #[must_use]
    pub const fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Loads a JSON array of entries.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Connector`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path).map_err(|e| catalog_error(path, &e))?;
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(&raw).map_err(|e| catalog_error(path, &e))?;
        debug!(path = %path.display(), entries = entries.len(), "Loaded catalog");
        Ok(Self { entries })
    }

    /// Entries in file order.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Looks an item up by `source:id` or bare id.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&ResultItem> {
        self.entries
            .iter()
            .map(|e| &e.item)
            .find(|item| item.target_id() == key || item.id == key)
    }

    /// One connector per source present in the catalog.
    #[must_use]
    pub fn registry(&self) -> ConnectorRegistry {
        let mut registry = ConnectorRegistry::new();
        for source in SourceKind::ALL {
            let entries: Vec<CatalogEntry> = self
                .entries
                .iter()
                .filter(|e| e.item.source == source)
                .cloned()
                .collect();
            if !entries.is_empty() {
                registry.insert(Arc::new(CatalogConnector::new(source, entries)));
            }
        }
        registry
    }
}

fn catalog_error(path: &Path, e: &dyn std::fmt::Display) -> AgentError {
    AgentError::Connector {
        source_name: "catalog".to_string(),
        message: format!("{}: {e}", path.display()),
    }
}

/// Connector over the catalog entries of one source.
pub struct CatalogConnector {
    source: SourceKind,
    entries: Vec<CatalogEntry>,
    by_id: HashMap<String, usize>,
}

impl CatalogConnector {
    /// Creates a connector serving `entries` as `source`.
    #[must_use]
    pub fn new(source: SourceKind, entries: Vec<CatalogEntry>) -> Self {
        let by_id = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.item.id.clone(), i))
            .collect();
        Self {
            source,
            entries,
            by_id,
        }
    }
}

fn matches(item: &ResultItem, terms: &[Vec<String>]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let haystack = format!("{} {}", item.title, item.summary).to_lowercase();
    terms
        .iter()
        .any(|words| words.iter().all(|w| haystack.contains(w.as_str())))
}

fn query_terms(query: &str) -> Vec<Vec<String>> {
    query
        .split(" OR ")
        .map(|term| {
            term.split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
        })
        .filter(|words| !words.is_empty())
        .collect()
}

#[async_trait]
impl SourceConnector for CatalogConnector {
    fn source(&self) -> SourceKind {
        self.source
    }

    async fn search(
        &self,
        query: &str,
        window: &DateRange,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<SearchPage, AgentError> {
        let offset = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| AgentError::Connector {
                source_name: self.source.to_string(),
                message: format!("invalid page token '{token}'"),
            })?,
            None => 0,
        };
        let terms = query_terms(query);
        let hits: Vec<&ResultItem> = self
            .entries
            .iter()
            .map(|e| &e.item)
            .filter(|item| item.metadata.latest_date().is_none_or(|d| window.contains(d)))
            .filter(|item| matches(item, &terms))
            .collect();

        let items: Vec<ResultItem> = hits
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|&item| item.clone())
            .collect();
        let consumed = offset + items.len();
        let next_page_token = (consumed < hits.len() && !items.is_empty()).then(|| consumed.to_string());
        Ok(SearchPage {
            items,
            next_page_token,
        })
    }

    async fn fetch_content(&self, item: &ResultItem) -> Result<TargetContent, AgentError> {
        let Some(entry) = self.by_id.get(&item.id).map(|&i| &self.entries[i]) else {
            return Err(AgentError::Connector {
                source_name: self.source.to_string(),
                message: format!("unknown item '{}'", item.id),
            });
        };
        let text = entry
            .content
            .clone()
            .unwrap_or_else(|| TargetContent::from_item(item).text);
        Ok(TargetContent {
            text,
            images: entry.images.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::io::Write;

    use chrono::{TimeZone, Utc};

    use super::*;

    const CATALOG: &str = r#"[
        {"source": "paper", "id": "1", "title": "Dense Retrieval for QA", "summary": "retrieval", "content": "full text", "metadata": {"published": "2025-05-20T00:00:00Z"}},
        {"source": "paper", "id": "2", "title": "Sparse Retrieval", "metadata": {"published": "2019-01-01T00:00:00Z"}},
        {"source": "paper", "id": "3", "title": "Image Generation"},
        {"source": "code", "id": "org/rag", "title": "org/rag", "summary": "A retrieval toolkit"}
    ]"#;

    fn catalog() -> Catalog {
        let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|_| unreachable!());
        file.write_all(CATALOG.as_bytes()).unwrap_or_else(|_| unreachable!());
        Catalog::load(file.path()).unwrap_or_else(|e| panic!("load failed: {e}"))
    }

    fn all_time() -> DateRange {
        DateRange::trailing_days(Utc::now(), 365 * 50)
    }

    #[tokio::test]
    async fn test_search_matches_terms_and_pages() {
        let registry = catalog().registry();
        let papers = registry.get(SourceKind::Paper).cloned().unwrap_or_else(|| unreachable!());

        let first = papers
            .search("retrieval", &all_time(), None, 1)
            .await
            .unwrap_or_default();
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.next_page_token.as_deref(), Some("1"));

        let second = papers
            .search("retrieval", &all_time(), first.next_page_token.as_deref(), 1)
            .await
            .unwrap_or_default();
        assert_eq!(second.items[0].id, "2");
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_window_excludes_old_items() {
        let registry = catalog().registry();
        let papers = registry.get(SourceKind::Paper).cloned().unwrap_or_else(|| unreachable!());
        let window = DateRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_else(|| unreachable!()),
            end: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).single().unwrap_or_else(|| unreachable!()),
        };
        let page = papers
            .search("sparse OR dense", &window, None, 10)
            .await
            .unwrap_or_default();
        let ids: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[tokio::test]
    async fn test_fetch_content_prefers_full_text() {
        let catalog = catalog();
        let registry = catalog.registry();
        let papers = registry.get(SourceKind::Paper).cloned().unwrap_or_else(|| unreachable!());
        let item = catalog.find("paper:1").cloned().unwrap_or_else(|| unreachable!());
        let content = papers.fetch_content(&item).await.unwrap_or_default();
        assert_eq!(content.text, "full text");

        let bare = catalog.find("3").cloned().unwrap_or_else(|| unreachable!());
        let content = papers.fetch_content(&bare).await.unwrap_or_default();
        assert!(content.text.contains("Image Generation"));
    }

    #[test]
    fn test_registry_has_one_connector_per_source() {
        let sources: Vec<SourceKind> = catalog().registry().sources().collect();
        assert_eq!(sources, vec![SourceKind::Paper, SourceKind::Code]);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|_| unreachable!());
        file.write_all(b"{not json").unwrap_or_else(|_| unreachable!());
        assert!(matches!(Catalog::load(file.path()), Err(AgentError::Connector { .. })));
    }
}
