//! Search planner.
//!
//! Pure conversion of (query, window, sources, limit) into per-source query
//! specs. The limit is split evenly across sources (earlier sources take
//! the remainder) and each source quota is split into pages no larger than
//! the source's maximum page size.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{DateRange, MAX_RESULT_LIMIT, SearchIntent, SourceKind, TimeWindow};

/// One page request within a query spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based page index.
    pub index: usize,
    /// Items requested on this page.
    pub size: usize,
}

/// Query against one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Source to query.
    pub source: SourceKind,
    /// Query string.
    pub query: String,
    /// Resolved date bounds.
    pub window: DateRange,
    /// Items requested from this source.
    pub limit: usize,
    /// Page split of `limit`.
    pub pages: Vec<PageRequest>,
}

/// Plans a search for a finalized intent.
#[must_use]
pub fn plan_intent(intent: &SearchIntent, now: DateTime<Utc>) -> Vec<QuerySpec> {
    plan(
        &intent.query_text(),
        intent.time_window,
        &intent.sources,
        intent.limit,
        now,
    )
}

/// Plans a search.
///
/// Sources are taken in [`SourceKind`] order; sources whose share is zero
/// get no spec. The sum of spec limits equals `min(limit, 2000)`.
#[must_use]
pub fn plan(
    query: &str,
    window: TimeWindow,
    sources: &BTreeSet<SourceKind>,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<QuerySpec> {
    let limit = limit.min(MAX_RESULT_LIMIT);
    let range = window.resolve(now);
    sources
        .iter()
        .zip(split_quota(limit, sources.len()))
        .filter(|(_, quota)| *quota > 0)
        .map(|(&source, quota)| QuerySpec {
            source,
            query: query.to_string(),
            window: range,
            limit: quota,
            pages: paginate(quota, source.max_page_size()),
        })
        .collect()
}

/// Splits `limit` into `n` near-equal shares, remainder to the front.
#[must_use]
pub fn split_quota(limit: usize, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let base = limit / n;
    let extra = limit % n;
    (0..n).map(|i| base + usize::from(i < extra)).collect()
}

/// Splits a quota into pages of at most `max_page` items.
#[must_use]
pub fn paginate(quota: usize, max_page: usize) -> Vec<PageRequest> {
    let max_page = max_page.max(1);
    (0..quota.div_ceil(max_page))
        .map(|index| PageRequest {
            index,
            size: (quota - index * max_page).min(max_page),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!())
    }

    #[test]
    fn test_single_paper_source_past_month() {
        let intent = SearchIntent::keywords(
            ["retrieval-augmented generation"],
            [SourceKind::Paper],
            TimeWindow::PastMonth,
            50,
        );
        let specs = plan_intent(&intent, now());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].source, SourceKind::Paper);
        assert_eq!(specs[0].limit, 50);
        assert_eq!(specs[0].query, "retrieval-augmented generation");
        assert_eq!(specs[0].window.end, now());
        assert_eq!(specs[0].window.start, now() - Duration::days(30));
        assert_eq!(specs[0].pages, vec![PageRequest { index: 0, size: 50 }]);
    }

    #[test]
    fn test_remainder_goes_to_first_sources() {
        let sources: BTreeSet<_> = [SourceKind::Paper, SourceKind::Code, SourceKind::ModelWeights]
            .into_iter()
            .collect();
        let specs = plan("q", TimeWindow::PastYear, &sources, 100, now());
        let limits: Vec<usize> = specs.iter().map(|s| s.limit).collect();
        assert_eq!(limits, vec![34, 33, 33]);
    }

    #[test]
    fn test_code_pages_capped_at_thirty() {
        let sources: BTreeSet<_> = [SourceKind::Code].into_iter().collect();
        let specs = plan("q", TimeWindow::PastWeek, &sources, 70, now());
        let sizes: Vec<usize> = specs[0].pages.iter().map(|p| p.size).collect();
        assert_eq!(sizes, vec![30, 30, 10]);
    }

    #[test]
    fn test_zero_share_sources_are_skipped() {
        let sources: BTreeSet<_> = SourceKind::ALL.into_iter().collect();
        let specs = plan("q", TimeWindow::PastWeek, &sources, 2, now());
        assert_eq!(specs.len(), 2);
        assert!(plan("q", TimeWindow::PastWeek, &BTreeSet::new(), 10, now()).is_empty());
    }

    #[test]
    fn test_huge_day_window_is_rejected_and_never_overflows() {
        assert_eq!(TimeWindow::parse("99999999d"), None);
        let sources: BTreeSet<_> = [SourceKind::Paper].into_iter().collect();
        let window = TimeWindow::parse("99999999d").unwrap_or_default();
        let specs = plan("q", window, &sources, 10, now());
        assert_eq!(specs[0].window.start, now() - Duration::days(365));

        let widest = plan("q", TimeWindow::Days(u32::MAX), &sources, 10, now());
        assert_eq!(widest[0].window.start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(widest[0].window.end, now());
    }

    fn source_set() -> impl Strategy<Value = BTreeSet<SourceKind>> {
        proptest::sample::subsequence(SourceKind::ALL.to_vec(), 1..=4)
            .prop_map(|v| v.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_quota_sums_to_limit(limit in 0usize..3000, sources in source_set()) {
            let specs = plan("q", TimeWindow::PastYear, &sources, limit, now());
            let total: usize = specs.iter().map(|s| s.limit).sum();
            prop_assert_eq!(total, limit.min(MAX_RESULT_LIMIT));
        }

        #[test]
        fn prop_shares_are_even(limit in 0usize..2000, sources in source_set()) {
            let specs = plan("q", TimeWindow::PastYear, &sources, limit, now());
            let floor = limit / sources.len();
            for spec in &specs {
                prop_assert!(spec.limit == floor || spec.limit == floor + 1);
            }
        }

        #[test]
        fn prop_pages_respect_source_maximum(limit in 0usize..2000, sources in source_set()) {
            for spec in plan("q", TimeWindow::PastYear, &sources, limit, now()) {
                let paged: usize = spec.pages.iter().map(|p| p.size).sum();
                prop_assert_eq!(paged, spec.limit);
                prop_assert!(spec.pages.iter().all(|p| p.size > 0 && p.size <= spec.source.max_page_size()));
            }
        }

        #[test]
        fn prop_plan_is_deterministic(limit in 0usize..2000, sources in source_set()) {
            let a = plan("q", TimeWindow::PastMonth, &sources, limit, now());
            let b = plan("q", TimeWindow::PastMonth, &sources, limit, now());
            prop_assert_eq!(a, b);
        }
    }
}
