//! Batch coordinator.
//!
//! Runs up to `concurrency` target analyses at once; the rest queue. Every
//! status transition (`pending → running → done | failed | cancelled`) is
//! published on an event channel. One target's failure never aborts the
//! others, except for a configuration fault before any target succeeded.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::finding::{ReportStatus, SynthesizedReport};
use super::orchestrator::{AnalysisOptions, Orchestrator};
use crate::core::{CancellationToken, ResultItem, TargetContent, ensure_active};
use crate::error::{AgentError, ErrorKind};
use crate::search::ConnectorRegistry;

/// Lifecycle state of one target in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Queued.
    Pending,
    /// Analysis in progress.
    Running,
    /// Finished with a complete or partial report.
    Done,
    /// Finished without a report.
    Failed,
    /// Stopped by cancellation.
    Cancelled,
}

impl TargetStatus {
    /// Whether the state is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Terminal outcome of one target.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
    /// A report was produced; it may be partial.
    Done {
        /// The report.
        report: Box<SynthesizedReport>,
    },
    /// No report could be produced.
    Failed {
        /// Error description.
        error: String,
        /// Error class.
        kind: ErrorKind,
    },
    /// Cancelled; findings completed before cancellation are kept.
    Cancelled {
        /// Partial report, if any leaf had finished.
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<Box<SynthesizedReport>>,
    },
}

impl TargetOutcome {
    /// Status this outcome corresponds to.
    #[must_use]
    pub const fn status(&self) -> TargetStatus {
        match self {
            Self::Done { .. } => TargetStatus::Done,
            Self::Failed { .. } => TargetStatus::Failed,
            Self::Cancelled { .. } => TargetStatus::Cancelled,
        }
    }

    /// Report carried by the outcome, if any.
    #[must_use]
    pub fn report(&self) -> Option<&SynthesizedReport> {
        match self {
            Self::Done { report } => Some(report),
            Self::Cancelled { report } => report.as_deref(),
            Self::Failed { .. } => None,
        }
    }

    fn from_result(result: Result<SynthesizedReport, AgentError>) -> Self {
        match result {
            Ok(report) if report.status == ReportStatus::Cancelled => Self::Cancelled {
                report: Some(Box::new(report)),
            },
            Ok(report) => Self::Done {
                report: Box::new(report),
            },
            Err(AgentError::Cancelled) => Self::Cancelled { report: None },
            Err(e) => Self::Failed {
                error: e.to_string(),
                kind: e.kind(),
            },
        }
    }
}

/// Progress event of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A target changed state.
    Status {
        /// Target identifier.
        target_id: String,
        /// New state.
        status: TargetStatus,
    },
    /// A target reached its terminal outcome.
    Finished {
        /// Target identifier.
        target_id: String,
        /// The outcome.
        outcome: TargetOutcome,
    },
}

/// Final outcomes of a batch, keyed by target identifier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Outcome per target.
    pub outcomes: BTreeMap<String, TargetOutcome>,
}

impl BatchSummary {
    /// Number of targets that ended in `status`.
    #[must_use]
    pub fn count(&self, status: TargetStatus) -> usize {
        self.outcomes
            .values()
            .filter(|o| o.status() == status)
            .count()
    }
}

struct Progress {
    statuses: Mutex<BTreeMap<String, TargetStatus>>,
    outcomes: Mutex<BTreeMap<String, TargetOutcome>>,
    events: Mutex<Option<mpsc::UnboundedSender<BatchEvent>>>,
}

impl Progress {
    fn emit(&self, event: BatchEvent) {
        // Receiver may be gone; progress is still tracked.
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    fn set(&self, target_id: &str, status: TargetStatus) {
        let mut statuses = self.statuses.lock();
        statuses.insert(target_id.to_string(), status);
        self.emit(BatchEvent::Status {
            target_id: target_id.to_string(),
            status,
        });
    }

    fn finish(&self, target_id: &str, outcome: TargetOutcome) {
        let mut statuses = self.statuses.lock();
        statuses.insert(target_id.to_string(), outcome.status());
        self.emit(BatchEvent::Status {
            target_id: target_id.to_string(),
            status: outcome.status(),
        });
        self.emit(BatchEvent::Finished {
            target_id: target_id.to_string(),
            outcome: outcome.clone(),
        });
        self.outcomes.lock().insert(target_id.to_string(), outcome);
    }

    /// Ends the event stream.
    fn close(&self) {
        self.events.lock().take();
    }
}

/// Handle to a running batch.
pub struct BatchHandle {
    events: mpsc::UnboundedReceiver<BatchEvent>,
    cancel: CancellationToken,
    progress: Arc<Progress>,
    join: JoinHandle<()>,
}

impl BatchHandle {
    /// Next progress event; `None` once the batch has finished and every
    /// event was read.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Stops dispatching new targets; running ones stop at their next
    /// suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The batch's cancellation token.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Snapshot of every target's current state.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<String, TargetStatus> {
        self.progress.statuses.lock().clone()
    }

    /// Waits for every target to finish.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] if the coordinator task died.
    pub async fn wait(self) -> Result<BatchSummary, AgentError> {
        self.join.await.map_err(|e| AgentError::Orchestration {
            message: format!("batch coordinator failed: {e}"),
        })?;
        Ok(BatchSummary {
            outcomes: self.progress.outcomes.lock().clone(),
        })
    }
}

/// Schedules analyses of many targets.
#[derive(Clone)]
pub struct BatchCoordinator {
    orchestrator: Arc<Orchestrator>,
    connectors: ConnectorRegistry,
    concurrency: usize,
}

impl BatchCoordinator {
    /// Creates a coordinator running at most `concurrency` targets at once.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, connectors: ConnectorRegistry, concurrency: usize) -> Self {
        Self {
            orchestrator,
            connectors,
            concurrency: concurrency.max(1),
        }
    }

    /// Starts analyzing `targets` and returns immediately.
    ///
    /// Targets with the same identifier are analyzed once.
    #[must_use]
    pub fn run_batch(
        &self,
        targets: Vec<ResultItem>,
        options: AnalysisOptions,
        cancel: CancellationToken,
    ) -> BatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let progress = Arc::new(Progress {
            statuses: Mutex::new(BTreeMap::new()),
            outcomes: Mutex::new(BTreeMap::new()),
            events: Mutex::new(Some(tx)),
        });

        let mut seen = HashSet::new();
        let targets: Vec<ResultItem> = targets
            .into_iter()
            .filter(|t| seen.insert(t.target_id()))
            .collect();
        for target in &targets {
            progress.set(&target.target_id(), TargetStatus::Pending);
        }

        let join = tokio::spawn(self.clone().dispatch(
            targets,
            options,
            cancel.clone(),
            Arc::clone(&progress),
        ));
        BatchHandle {
            events: rx,
            cancel,
            progress,
            join,
        }
    }

    async fn dispatch(
        self,
        targets: Vec<ResultItem>,
        options: AnalysisOptions,
        cancel: CancellationToken,
        progress: Arc<Progress>,
    ) {
        let total = targets.len();
        info!(targets = total, concurrency = self.concurrency, "Batch started");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let any_succeeded = Arc::new(AtomicBool::new(false));
        let mut running = JoinSet::new();
        let mut queue = targets.into_iter();

        while let Some(target) = queue.next() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                for skipped in std::iter::once(target).chain(queue.by_ref()) {
                    progress.finish(&skipped.target_id(), TargetOutcome::Cancelled { report: None });
                }
                break;
            };

            let coordinator = self.clone();
            let progress = Arc::clone(&progress);
            let cancel = cancel.clone();
            let any_succeeded = Arc::clone(&any_succeeded);
            running.spawn(async move {
                let target_id = target.target_id();
                progress.set(&target_id, TargetStatus::Running);
                let outcome = coordinator.analyze(&target, options, &cancel).await;
                match &outcome {
                    TargetOutcome::Done { .. } => any_succeeded.store(true, Ordering::SeqCst),
                    TargetOutcome::Failed { kind: ErrorKind::Auth, error } if !any_succeeded.load(Ordering::SeqCst) => {
                        error!(target = %target_id, error = %error, "Configuration fault before any success, cancelling batch");
                        cancel.cancel();
                    }
                    _ => {}
                }
                progress.finish(&target_id, outcome);
                drop(permit);
            });
        }

        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Batch target task aborted");
            }
        }

        // A target task that died without an outcome is reported as failed.
        let unresolved: Vec<String> = progress
            .statuses
            .lock()
            .iter()
            .filter(|(_, s)| !s.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        for target_id in unresolved {
            progress.finish(
                &target_id,
                TargetOutcome::Failed {
                    error: "analysis task aborted".to_string(),
                    kind: ErrorKind::Other,
                },
            );
        }
        progress.close();
        info!(targets = total, "Batch finished");
    }

    async fn analyze(
        &self,
        target: &ResultItem,
        options: AnalysisOptions,
        cancel: &CancellationToken,
    ) -> TargetOutcome {
        if let Err(e) = ensure_active(cancel) {
            return TargetOutcome::from_result(Err(e));
        }
        let content = match self.connectors.get(target.source) {
            Some(connector) => match connector.fetch_content(target).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(target = %target.target_id(), error = %e, "Content fetch failed, analyzing metadata only");
                    TargetContent::from_item(target)
                }
            },
            None => TargetContent::from_item(target),
        };
        debug!(target = %target.target_id(), chars = content.text.len(), images = content.images.len(), "Content ready");
        TargetOutcome::from_result(
            self.orchestrator
                .plan_and_run(target, &content, options, cancel)
                .await,
        )
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse};
    use crate::agent::prompt::PromptSet;
    use crate::agent::testing::{ScriptedProvider, gateway, test_config};
    use crate::core::SourceKind;

    fn by_agent(req: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let text = match req.agent.as_str() {
            "brain" => r#"{"subtasks": [{"role": "method"}, {"role": "experiment"}, {"role": "reviewer"}]}"#.to_string(),
            "synthesizer" => "# Report".to_string(),
            other => format!("{other} finding"),
        };
        Ok(ChatResponse::text(text, "stop"))
    }

    fn targets(n: usize) -> Vec<ResultItem> {
        (0..n)
            .map(|i| ResultItem::new(SourceKind::Paper, i.to_string(), format!("Paper {i}")))
            .collect()
    }

    fn coordinator(provider: &Arc<ScriptedProvider>, concurrency: usize) -> BatchCoordinator {
        let config = test_config();
        let orchestrator = Orchestrator::new(gateway(provider, &config), config, PromptSet::defaults());
        BatchCoordinator::new(Arc::new(orchestrator), ConnectorRegistry::new(), concurrency)
    }

    #[tokio::test]
    async fn test_running_never_exceeds_ceiling() {
        let provider = Arc::new(
            ScriptedProvider::new(|req, _| by_agent(req)).with_latency(Duration::from_millis(5)),
        );
        let mut handle = coordinator(&provider, 2).run_batch(
            targets(6),
            AnalysisOptions::default(),
            CancellationToken::new(),
        );

        let mut running = 0usize;
        let mut peak = 0usize;
        let mut finished = 0usize;
        while let Some(event) = handle.next_event().await {
            match event {
                BatchEvent::Status { status: TargetStatus::Running, .. } => {
                    running += 1;
                    peak = peak.max(running);
                }
                BatchEvent::Status { status, .. } if status.is_terminal() => running -= 1,
                BatchEvent::Finished { .. } => finished += 1,
                BatchEvent::Status { .. } => {}
            }
            if finished == 6 {
                break;
            }
        }
        assert!(peak <= 2, "peak running was {peak}");
        assert_eq!(peak, 2);

        let summary = handle.wait().await.unwrap_or_default();
        assert_eq!(summary.count(TargetStatus::Done), 6);
    }

    #[tokio::test]
    async fn test_cancel_keeps_done_and_cancels_rest() {
        let provider = Arc::new(
            ScriptedProvider::new(|req, _| by_agent(req)).with_latency(Duration::from_millis(10)),
        );
        let mut handle = coordinator(&provider, 1).run_batch(
            targets(5),
            AnalysisOptions::default(),
            CancellationToken::new(),
        );

        let mut done = 0;
        while let Some(event) = handle.next_event().await {
            if let BatchEvent::Finished { outcome: TargetOutcome::Done { .. }, .. } = event {
                done += 1;
                if done == 2 {
                    handle.cancel();
                    break;
                }
            }
        }

        let summary = handle.wait().await.unwrap_or_default();
        assert_eq!(summary.outcomes.len(), 5);
        assert_eq!(summary.count(TargetStatus::Done), 2);
        assert_eq!(summary.count(TargetStatus::Cancelled), 3);
        assert_eq!(summary.count(TargetStatus::Running), 0);
    }

    #[tokio::test]
    async fn test_failing_role_still_counts_as_done() {
        let provider = Arc::new(ScriptedProvider::new(|req, _| {
            if req.agent == "experiment" {
                return Err(AgentError::Network {
                    message: "connection reset".to_string(),
                });
            }
            by_agent(req)
        }));
        let handle = coordinator(&provider, 2).run_batch(
            targets(2),
            AnalysisOptions::default(),
            CancellationToken::new(),
        );
        let summary = handle.wait().await.unwrap_or_default();
        assert_eq!(summary.count(TargetStatus::Done), 2);
        for outcome in summary.outcomes.values() {
            let report = outcome.report().unwrap_or_else(|| unreachable!());
            assert_eq!(report.status, ReportStatus::Partial);
            assert_eq!(report.populated_count(), 2);
            assert_eq!(report.unavailable_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_auth_fault_aborts_batch() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| {
            Err(AgentError::Auth {
                message: "invalid key".to_string(),
            })
        }));
        let handle = coordinator(&provider, 1).run_batch(
            targets(3),
            AnalysisOptions::default(),
            CancellationToken::new(),
        );
        let summary = handle.wait().await.unwrap_or_default();
        assert_eq!(summary.count(TargetStatus::Failed), 1);
        assert_eq!(summary.count(TargetStatus::Cancelled), 2);
    }

    #[tokio::test]
    async fn test_duplicate_targets_run_once() {
        let provider = Arc::new(ScriptedProvider::new(|req, _| by_agent(req)));
        let mut batch = targets(2);
        batch.push(batch[0].clone());
        let handle = coordinator(&provider, 2).run_batch(batch, AnalysisOptions::default(), CancellationToken::new());
        let summary = handle.wait().await.unwrap_or_default();
        assert_eq!(summary.outcomes.len(), 2);
    }
}
