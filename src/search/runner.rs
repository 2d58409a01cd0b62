//! Search execution.
//!
//! Runs a query plan page by page against the registered connectors. A
//! source that runs dry or fails donates its unmet quota to sources that
//! still have pages, so the result count stays within
//! `[min(limit, available), limit]`. Items are de-duplicated by
//! `(source, id)` and by normalized title.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::connector::{ConnectorRegistry, SourceConnector};
use super::planner::QuerySpec;
use crate::core::{CancellationToken, DateRange, ResultItem, SourceKind, ensure_active};
use crate::error::AgentError;

/// Per-source accounting of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    /// Quota assigned by the plan.
    pub planned: usize,
    /// Unique items taken from this source.
    pub fetched: usize,
    /// Page requests issued.
    pub requests: usize,
    /// The source has no further pages.
    pub exhausted: bool,
    /// Failure description, if the source failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of running a plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    /// Unique items in fetch order.
    pub items: Vec<ResultItem>,
    /// Accounting per source.
    pub sources: BTreeMap<SourceKind, SourceReport>,
    /// Cancellation stopped the search early.
    pub cancelled: bool,
}

struct SourceRun<'a> {
    spec: &'a QuerySpec,
    connector: Option<Arc<dyn SourceConnector>>,
    token: Option<String>,
    report: SourceReport,
}

impl SourceRun<'_> {
    const fn can_give_more(&self) -> bool {
        self.connector.is_some() && !self.report.exhausted && self.report.error.is_none()
    }
}

#[derive(Default)]
struct Dedupe {
    ids: HashSet<(SourceKind, String)>,
    titles: HashSet<String>,
}

impl Dedupe {
    fn admit(&mut self, item: &ResultItem) -> bool {
        let title = item.normalized_title();
        if self.ids.contains(&(item.source, item.id.clone()))
            || (!title.is_empty() && self.titles.contains(&title))
        {
            return false;
        }
        self.ids.insert((item.source, item.id.clone()));
        if !title.is_empty() {
            self.titles.insert(title);
        }
        true
    }
}

/// Executes query plans against a connector registry.
#[derive(Debug, Clone)]
pub struct SearchRunner {
    connectors: ConnectorRegistry,
}

impl SearchRunner {
    /// Creates a runner over `connectors`.
    #[must_use]
    pub const fn new(connectors: ConnectorRegistry) -> Self {
        Self { connectors }
    }

    /// The connectors in use.
    #[must_use]
    pub const fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    /// Runs `plan`.
    ///
    /// Cancellation is checked before and after every page request; a
    /// cancelled search returns what it collected with `cancelled = true`.
    /// Connector failures are recorded per source and never abort the run.
    pub async fn run(&self, plan: &[QuerySpec], cancel: &CancellationToken) -> SearchOutcome {
        let mut runs: Vec<SourceRun<'_>> = plan
            .iter()
            .map(|spec| SourceRun {
                spec,
                connector: self.connectors.get(spec.source).cloned(),
                token: None,
                report: SourceReport {
                    planned: spec.limit,
                    error: None,
                    ..SourceReport::default()
                },
            })
            .collect();
        let mut seen = Dedupe::default();
        let mut items = Vec::new();
        let mut cancelled = false;

        // Planned pages.
        'plan: for run in &mut runs {
            if run.connector.is_none() {
                warn!(source = %run.spec.source, "No connector registered");
                run.report.error = Some("no connector registered".to_string());
                continue;
            }
            for page in &run.spec.pages {
                let want = run.spec.limit - run.report.fetched;
                if want == 0 || !run.can_give_more() {
                    break;
                }
                if let Err(e) = fetch_page(run, page.size.min(want), &mut seen, &mut items, cancel).await {
                    if e.is_cancelled() {
                        cancelled = true;
                        break 'plan;
                    }
                    record_failure(run, &e);
                }
            }
        }

        // Backfill unmet quota from sources that still have pages.
        if !cancelled {
            let mut deficit: usize = runs
                .iter()
                .map(|r| r.spec.limit - r.report.fetched)
                .sum();
            'backfill: for run in &mut runs {
                while deficit > 0 && run.can_give_more() {
                    let size = deficit.min(run.spec.source.max_page_size());
                    let before = run.report.fetched;
                    if let Err(e) = fetch_page(run, size, &mut seen, &mut items, cancel).await {
                        if e.is_cancelled() {
                            cancelled = true;
                            break 'backfill;
                        }
                        record_failure(run, &e);
                    }
                    deficit -= run.report.fetched - before;
                }
            }
            if deficit > 0 {
                debug!(deficit, "Sources exhausted before the limit was reached");
            }
        }

        let sources = runs
            .into_iter()
            .map(|r| (r.spec.source, r.report))
            .collect();
        info!(items = items.len(), cancelled, "Search finished");
        SearchOutcome {
            items,
            sources,
            cancelled,
        }
    }
}

fn record_failure(run: &mut SourceRun<'_>, e: &AgentError) {
    warn!(source = %run.spec.source, error = %e, "Source failed, donating its quota");
    run.report.error = Some(e.to_string());
}

async fn fetch_page(
    run: &mut SourceRun<'_>,
    size: usize,
    seen: &mut Dedupe,
    items: &mut Vec<ResultItem>,
    cancel: &CancellationToken,
) -> Result<(), AgentError> {
    let Some(connector) = run.connector.clone() else {
        return Ok(());
    };
    ensure_active(cancel)?;
    let window: DateRange = run.spec.window;
    let page = connector
        .search(&run.spec.query, &window, run.token.as_deref(), size)
        .await?;
    ensure_active(cancel)?;
    run.report.requests += 1;

    let received = page.items.len();
    let mut taken = 0;
    for item in page.items {
        if taken == size {
            break;
        }
        if seen.admit(&item) {
            items.push(item);
            taken += 1;
        }
    }
    run.report.fetched += taken;
    run.token = page.next_page_token;
    if run.token.is_none() || received == 0 {
        run.report.exhausted = true;
    }
    debug!(source = %run.spec.source, received, taken, "Page fetched");
    Ok(())
}
