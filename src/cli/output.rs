//! Output formatting for CLI commands.

use std::fmt::Write;

use serde::Serialize;

use crate::agent::batch::{BatchEvent, BatchSummary, TargetOutcome, TargetStatus};
use crate::agent::filter::FilteredItem;
use crate::agent::related::RelatedReport;
use crate::core::SearchIntent;
use crate::scout::SearchResults;
use crate::search::QuerySpec;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognised is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes a value as pretty JSON.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// Formats a query plan.
#[must_use]
pub fn format_plan(intent: &SearchIntent, plan: &[QuerySpec], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!(
                "Query: {}\nWindow: {}\n\n",
                intent.query_text(),
                intent.time_window
            );
            if plan.is_empty() {
                out.push_str("No query specs (limit is zero or no sources).\n");
            }
            for spec in plan {
                let pages: Vec<String> = spec.pages.iter().map(|p| p.size.to_string()).collect();
                let _ = writeln!(
                    out,
                    "{:<14} limit={:<5} pages=[{}]  {}..{}",
                    spec.source.as_str(),
                    spec.limit,
                    pages.join(", "),
                    spec.window.start.format("%Y-%m-%d"),
                    spec.window.end.format("%Y-%m-%d"),
                );
            }
            out
        }
        OutputFormat::Json => format.to_json(plan),
    }
}

fn format_item_line(out: &mut String, rank: usize, filtered: &FilteredItem, show_relevance: bool) {
    let item = &filtered.item;
    let _ = write!(out, "{rank:>3}. [{}] {}", item.target_id(), item.title);
    if let Some(date) = item.metadata.latest_date() {
        let _ = write!(out, " ({})", date.format("%Y-%m-%d"));
    }
    if show_relevance {
        let _ = write!(out, " - {}", filtered.relevance);
    }
    out.push('\n');
    if let Some(reason) = &filtered.reason {
        let _ = writeln!(out, "       {reason}");
    }
}

/// Formats search results.
#[must_use]
pub fn format_search_results(results: &SearchResults, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let curated = results.curated();
            let mut out = String::new();
            let filtered = results.filter.is_some() && !results.filter_degraded();
            for (i, item) in curated.iter().enumerate() {
                format_item_line(&mut out, i + 1, item, filtered);
            }
            if curated.is_empty() {
                out.push_str("No matching results.\n");
            }
            let _ = write!(out, "\n---\nFetched: {}", results.search.items.len());
            if results.filter.is_some() {
                let _ = write!(out, " | Kept: {}", curated.len());
            }
            if results.filter_degraded() {
                out.push_str(" | Filter degraded: unranked results");
            }
            if results.search.cancelled {
                out.push_str(" | Cancelled: partial results");
            }
            out.push('\n');
            for (source, report) in &results.search.sources {
                if let Some(error) = &report.error {
                    let _ = writeln!(out, "Source {source} failed: {error}");
                }
            }
            out
        }
        OutputFormat::Json => format.to_json(results),
    }
}

/// One-line progress message for a batch event, or `None` for events not
/// worth showing.
#[must_use]
pub fn format_batch_event(event: &BatchEvent) -> Option<String> {
    match event {
        BatchEvent::Status { target_id, status } => Some(format!("[{status}] {target_id}")),
        BatchEvent::Finished { .. } => None,
    }
}

/// Formats the outcomes of a batch.
#[must_use]
pub fn format_batch_summary(summary: &BatchSummary, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for (target_id, outcome) in &summary.outcomes {
                match outcome {
                    TargetOutcome::Done { report } => {
                        out.push_str(&report.to_markdown());
                        out.push_str("\n\n");
                    }
                    TargetOutcome::Cancelled {
                        report: Some(report),
                    } => {
                        let _ = writeln!(out, "{target_id}: cancelled (partial report)\n");
                        out.push_str(&report.to_markdown());
                        out.push_str("\n\n");
                    }
                    TargetOutcome::Cancelled { report: None } => {
                        let _ = writeln!(out, "{target_id}: cancelled\n");
                    }
                    TargetOutcome::Failed { error, kind } => {
                        let _ = writeln!(out, "{target_id}: failed ({kind}): {error}\n");
                    }
                }
            }
            let _ = writeln!(
                out,
                "---\nDone: {} | Failed: {} | Cancelled: {}",
                summary.count(TargetStatus::Done),
                summary.count(TargetStatus::Failed),
                summary.count(TargetStatus::Cancelled),
            );
            out
        }
        OutputFormat::Json => format.to_json(summary),
    }
}

/// Formats a related-research report.
#[must_use]
pub fn format_related(related: &RelatedReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!(
                "Related work for {}\nKeywords: {}\n\n",
                related.target_id,
                related.keywords.join(", ")
            );
            for (i, item) in related.related.iter().enumerate() {
                format_item_line(&mut out, i + 1, item, !related.filter_degraded);
            }
            if related.filter_degraded {
                out.push_str("(filter degraded: unranked related works)\n");
            }
            out.push('\n');
            out.push_str(&related.report.to_markdown());
            out.push('\n');
            out
        }
        OutputFormat::Json => format.to_json(related),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::*;
    use crate::core::{SourceKind, TimeWindow};
    use crate::search::plan;

    #[test]
    fn test_format_parse_defaults_to_text() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Text);
    }

    #[test]
    fn test_plan_text_lists_each_source() {
        let sources: BTreeSet<_> = [SourceKind::Paper, SourceKind::Code].into_iter().collect();
        let intent = SearchIntent::keywords(["rag"], sources.iter().copied(), TimeWindow::PastWeek, 70);
        let specs = plan("rag", TimeWindow::PastWeek, &sources, 70, Utc::now());
        let text = format_plan(&intent, &specs, OutputFormat::Text);
        assert!(text.contains("paper"));
        assert!(text.contains("pages=[30, 5]"));
    }
}
