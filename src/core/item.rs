//! Candidate result items and the content fetched for analysis.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::intent::SourceKind;

/// Publication and popularity metadata of an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// First publication date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    /// Last update date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    /// Popularity metric (stars, downloads, likes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u64>,
    /// Landing page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ItemMetadata {
    /// The most recent known date (update, then publication).
    #[must_use]
    pub fn latest_date(&self) -> Option<DateTime<Utc>> {
        self.updated.or(self.published)
    }
}

/// One search result produced by a source connector.
///
/// Read-only once produced; the filter and the orchestrator only borrow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Source the item came from.
    pub source: SourceKind,
    /// Identifier unique within the source.
    pub id: String,
    /// Title or full repository name.
    pub title: String,
    /// Abstract or description.
    #[serde(default)]
    pub summary: String,
    /// Authors or owners.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Dates, popularity and url.
    #[serde(default)]
    pub metadata: ItemMetadata,
    /// Locators for raw content (pdf url, readme path, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_refs: Vec<String>,
}

impl ResultItem {
    /// Creates an item with only the required fields set.
    #[must_use]
    pub fn new(source: SourceKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source,
            id: id.into(),
            title: title.into(),
            summary: String::new(),
            authors: Vec::new(),
            metadata: ItemMetadata::default(),
            content_refs: Vec::new(),
        }
    }

    /// Kind of analysis this item receives.
    #[must_use]
    pub const fn target_kind(&self) -> TargetKind {
        self.source.target_kind()
    }

    /// Identifier unique across sources.
    #[must_use]
    pub fn target_id(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }

    /// Lower-cased, whitespace-collapsed title used for de-duplication.
    #[must_use]
    pub fn normalized_title(&self) -> String {
        self.title
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Compact one-line JSON description used in filter prompts.
    ///
    /// Carries metadata only; the summary is cut to `max_summary` chars.
    #[must_use]
    pub fn compact_json(&self, index: usize, max_summary: usize) -> String {
        let summary: String = self.summary.chars().take(max_summary).collect();
        serde_json::json!({
            "index": index,
            "source": self.source.as_str(),
            "title": self.title,
            "date": self
                .metadata
                .latest_date()
                .map(|d| d.format("%Y-%m-%d").to_string()),
            "popularity": self.metadata.popularity,
            "summary": summary,
        })
        .to_string()
    }

    /// Multi-line header describing the item for analysis prompts.
    #[must_use]
    pub fn header(&self) -> String {
        let mut out = format!("Title: {}\nSource: {}\n", self.title, self.source);
        if !self.authors.is_empty() {
            let _ = writeln!(out, "Authors: {}", self.authors.join(", "));
        }
        if let Some(date) = self.metadata.published {
            let _ = writeln!(out, "Published: {}", date.format("%Y-%m-%d"));
        }
        if let Some(stars) = self.metadata.popularity {
            let _ = writeln!(out, "Popularity: {stars}");
        }
        if let Some(url) = &self.metadata.url {
            let _ = writeln!(out, "URL: {url}");
        }
        if !self.summary.is_empty() {
            let _ = writeln!(out, "Summary: {}", self.summary);
        }
        out
    }
}

/// Kind of analysis target, which fixes its specialist role set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Paper-type target.
    Paper,
    /// Repository or model-card target.
    Repository,
}

/// An image extracted from a target (figure, diagram, screenshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// `data:` URL or remote URL.
    pub url: String,
    /// Optional caption or alt text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Content fetched for one target before analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetContent {
    /// Text handed to every specialist (abstract, readme, key files).
    pub text: String,
    /// Extracted images for the vision agent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl TargetContent {
    /// Text-only content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    /// Content synthesized from an item's own metadata, used when a
    /// connector cannot fetch anything richer.
    #[must_use]
    pub fn from_item(item: &ResultItem) -> Self {
        Self::text(item.header())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id_and_kind() {
        let item = ResultItem::new(SourceKind::Code, "org/repo", "org/repo");
        assert_eq!(item.target_id(), "code:org/repo");
        assert_eq!(item.target_kind(), TargetKind::Repository);
        let paper = ResultItem::new(SourceKind::Paper, "2401.00001", "A paper");
        assert_eq!(paper.target_kind(), TargetKind::Paper);
    }

    #[test]
    fn test_compact_json_truncates_summary() {
        let mut item = ResultItem::new(SourceKind::Paper, "1", "Dense Retrieval");
        item.summary = "x".repeat(500);
        let line = item.compact_json(4, 10);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap_or_default();
        assert_eq!(value["index"], 4);
        assert_eq!(value["title"], "Dense Retrieval");
        assert_eq!(value["summary"].as_str().map(str::len), Some(10));
    }

    #[test]
    fn test_normalized_title() {
        let item = ResultItem::new(SourceKind::Paper, "1", "  Attention   Is All\nYou Need ");
        assert_eq!(item.normalized_title(), "attention is all you need");
    }

    #[test]
    fn test_item_deserialization_defaults() {
        let json = r#"{"source": "model-weights", "id": "org/model", "title": "org/model"}"#;
        let item: ResultItem = serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert!(item.summary.is_empty());
        assert!(item.metadata.url.is_none());
        assert_eq!(item.source, SourceKind::ModelWeights);
    }
}
