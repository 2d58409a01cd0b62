//! Search intent: what the user wants to find, where, and from when.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on the number of results one search session may request.
pub const MAX_RESULT_LIMIT: usize = 2000;

/// A searchable source family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Paper repository (preprints).
    Paper,
    /// Code-hosting platform.
    Code,
    /// Model hub serving weights and model cards.
    ModelWeights,
    /// Model hub serving model code.
    ModelCode,
}

impl SourceKind {
    /// All source kinds in planning order.
    pub const ALL: [Self; 4] = [Self::Paper, Self::Code, Self::ModelWeights, Self::ModelCode];

    /// Largest page a single request to this source may ask for.
    #[must_use]
    pub const fn max_page_size(self) -> usize {
        match self {
            Self::Paper | Self::ModelWeights => 50,
            Self::Code | Self::ModelCode => 30,
        }
    }

    /// Kind of analysis target items from this source produce.
    #[must_use]
    pub const fn target_kind(self) -> super::TargetKind {
        match self {
            Self::Paper => super::TargetKind::Paper,
            Self::Code | Self::ModelWeights | Self::ModelCode => super::TargetKind::Repository,
        }
    }

    /// Parses a source name, accepting the common platform names as aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "paper" | "papers" | "arxiv" => Some(Self::Paper),
            "code" | "repo" | "repository" | "github" => Some(Self::Code),
            "model-weights" | "weights" | "huggingface" | "hf" => Some(Self::ModelWeights),
            "model-code" | "modelscope" | "ms" => Some(Self::ModelCode),
            _ => None,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Code => "code",
            Self::ModelWeights => "model-weights",
            Self::ModelCode => "model-code",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest trailing window accepted, in days (100 years).
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// A closed date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Inclusive end.
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Range covering the `days` days up to `now`.
    #[must_use]
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now
                .checked_sub_signed(Duration::days(i64::from(days)))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: now,
        }
    }

    /// Returns `true` if `at` falls within the range.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Time window for a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    /// The last day.
    Yesterday,
    /// The last 7 days.
    PastWeek,
    /// The last 30 days.
    PastMonth,
    /// The last 90 days.
    PastThreeMonths,
    /// The last 365 days.
    #[default]
    PastYear,
    /// An explicit trailing number of days.
    Days(u32),
    /// An explicit date range.
    Range(DateRange),
}

impl TimeWindow {
    /// Trailing day count, or `None` for explicit ranges.
    #[must_use]
    pub const fn days(&self) -> Option<u32> {
        match self {
            Self::Yesterday => Some(1),
            Self::PastWeek => Some(7),
            Self::PastMonth => Some(30),
            Self::PastThreeMonths => Some(90),
            Self::PastYear => Some(365),
            Self::Days(d) => Some(*d),
            Self::Range(_) => None,
        }
    }

    /// Resolves the window to concrete bounds relative to `now`.
    #[must_use]
    pub fn resolve(&self, now: DateTime<Utc>) -> DateRange {
        match self {
            Self::Range(range) => *range,
            other => DateRange::trailing_days(now, other.days().unwrap_or(365)),
        }
    }

    /// Parses `past_month`, `past-month`, `past month`, `30d`, `30 days`
    /// or `2024-01-01..2024-06-30`.
    ///
    /// Day counts above [`MAX_WINDOW_DAYS`] and reversed ranges are rejected.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if let Some((start, end)) = trimmed.split_once("..") {
            let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d").ok()?;
            let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").ok()?;
            if start > end {
                return None;
            }
            return Some(Self::Range(DateRange {
                start: start.and_hms_opt(0, 0, 0)?.and_utc(),
                end: end.and_hms_opt(23, 59, 59)?.and_utc(),
            }));
        }

        let normalized = trimmed.to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "yesterday" | "past_day" => Some(Self::Yesterday),
            "past_week" | "week" => Some(Self::PastWeek),
            "past_month" | "month" => Some(Self::PastMonth),
            "past_3months" | "past_3_months" | "past_three_months" => Some(Self::PastThreeMonths),
            "past_year" | "year" => Some(Self::PastYear),
            other => {
                let digits = other
                    .trim_end_matches("days")
                    .trim_end_matches('d')
                    .trim_end_matches('_');
                digits
                    .parse::<u32>()
                    .ok()
                    .filter(|d| (1..=MAX_WINDOW_DAYS).contains(d))
                    .map(Self::Days)
            }
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yesterday => f.write_str("yesterday"),
            Self::PastWeek => f.write_str("past week"),
            Self::PastMonth => f.write_str("past month"),
            Self::PastThreeMonths => f.write_str("past 3 months"),
            Self::PastYear => f.write_str("past year"),
            Self::Days(d) => write!(f, "past {d} days"),
            Self::Range(r) => write!(
                f,
                "{}..{}",
                r.start.format("%Y-%m-%d"),
                r.end.format("%Y-%m-%d")
            ),
        }
    }
}

/// How an intent was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentMode {
    /// Elicited through the interview.
    InterviewDerived,
    /// Typed directly as keywords.
    KeywordDirect,
}

/// Structured description of a search.
///
/// Produced once per search session and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIntent {
    /// Topics / keywords to search for.
    pub topics: BTreeSet<String>,
    /// Sources to query.
    pub sources: BTreeSet<SourceKind>,
    /// Publication / update window.
    pub time_window: TimeWindow,
    /// Maximum number of results (at most [`MAX_RESULT_LIMIT`]).
    pub limit: usize,
    /// Origin of the intent.
    pub mode: IntentMode,
    /// Free-form profile notes gathered during the interview.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notes: BTreeMap<String, String>,
}

impl SearchIntent {
    /// Builds a keyword-direct intent.
    #[must_use]
    pub fn keywords<I, S>(
        keywords: I,
        sources: impl IntoIterator<Item = SourceKind>,
        time_window: TimeWindow,
        limit: usize,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: normalize_topics(keywords),
            sources: sources.into_iter().collect(),
            time_window,
            limit: limit.min(MAX_RESULT_LIMIT),
            mode: IntentMode::KeywordDirect,
            notes: BTreeMap::new(),
        }
    }

    /// Query string sent to connectors.
    #[must_use]
    pub fn query_text(&self) -> String {
        self.topics
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// Human-readable summary used in prompts.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = format!(
            "topics: {}\nsources: {}\ntime window: {}\nlimit: {}",
            self.topics.iter().cloned().collect::<Vec<_>>().join(", "),
            self.sources
                .iter()
                .map(SourceKind::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            self.time_window,
            self.limit
        );
        for (key, value) in &self.notes {
            let _ = write!(out, "\n{key}: {value}");
        }
        out
    }
}

/// Trims, drops empties and de-duplicates topic strings.
pub(crate) fn normalize_topics<I, S>(topics: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    topics
        .into_iter()
        .map(Into::into)
        .map(|t| t.trim().trim_matches(['"', '\'']).trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_window_parse_bounds() {
        assert_eq!(TimeWindow::parse("36500d"), Some(TimeWindow::Days(MAX_WINDOW_DAYS)));
        assert_eq!(TimeWindow::parse("36501d"), None);
        assert_eq!(TimeWindow::parse("0d"), None);
        assert_eq!(TimeWindow::parse("2024-06-30..2024-01-01"), None);
        assert!(TimeWindow::parse("2024-06-30..2024-06-30").is_some());
    }

    #[test]
    fn test_time_window_parse_variants() {
        assert_eq!(TimeWindow::parse("past_month"), Some(TimeWindow::PastMonth));
        assert_eq!(TimeWindow::parse("Past Month"), Some(TimeWindow::PastMonth));
        assert_eq!(TimeWindow::parse("past-3-months"), Some(TimeWindow::PastThreeMonths));
        assert_eq!(TimeWindow::parse("1095d"), Some(TimeWindow::Days(1095)));
        assert_eq!(TimeWindow::parse("14 days"), Some(TimeWindow::Days(14)));
        assert_eq!(TimeWindow::parse("soon"), None);
        assert!(matches!(
            TimeWindow::parse("2024-01-01..2024-03-31"),
            Some(TimeWindow::Range(_))
        ));
    }

    #[test]
    fn test_past_month_bounds() {
        let now = Utc
            .with_ymd_and_hms(2025, 3, 31, 12, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!());
        let range = TimeWindow::PastMonth.resolve(now);
        assert_eq!(range.end, now);
        assert_eq!(range.end - range.start, Duration::days(30));
        assert!(range.contains(now - Duration::days(29)));
        assert!(!range.contains(now - Duration::days(31)));
    }

    #[test]
    fn test_source_aliases() {
        assert_eq!(SourceKind::parse("arxiv"), Some(SourceKind::Paper));
        assert_eq!(SourceKind::parse("GitHub"), Some(SourceKind::Code));
        assert_eq!(SourceKind::parse("model_weights"), Some(SourceKind::ModelWeights));
        assert_eq!(SourceKind::parse("modelscope"), Some(SourceKind::ModelCode));
        assert_eq!(SourceKind::parse("forum"), None);
    }

    #[test]
    fn test_keyword_intent_clamps_limit() {
        let intent = SearchIntent::keywords(
            [" rag ", "", "rag"],
            [SourceKind::Paper],
            TimeWindow::PastWeek,
            10_000,
        );
        assert_eq!(intent.limit, MAX_RESULT_LIMIT);
        assert_eq!(intent.topics.len(), 1);
        assert_eq!(intent.mode, IntentMode::KeywordDirect);
        assert_eq!(intent.query_text(), "rag");
    }

    #[test]
    fn test_time_window_serialization() {
        let json = serde_json::to_string(&TimeWindow::PastMonth).unwrap_or_default();
        assert_eq!(json, "\"past_month\"");
        let json = serde_json::to_string(&TimeWindow::Days(3)).unwrap_or_default();
        assert_eq!(json, "{\"days\":3}");
    }
}
