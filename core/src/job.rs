//! Batch job controller — observable bulk (re)analysis.
//!
//! RULES:
//!   - A job emits an ordered event sequence: zero or more `Progress`
//!     events with monotonically increasing `current`, terminated by
//!     exactly one of `Completed` / `Failed`.
//!   - Dropping the `JobHandle` does NOT stop the work; the thread runs
//!     to completion (fire-and-forget, see DESIGN.md).
//!   - Per-conversation analyzer errors are counted and the job continues.
//!     Store-level failures terminate the job with `Failed`; analyses
//!     already committed are not rolled back.
//!   - Only this module mutates the store.

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    metric::{ConversationAnalysis, ConversationMetric},
    store::MetricStore,
};
use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

// ── Public types ─────────────────────────────────────────────────────────────

/// Which conversation records a batch operation processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisScope {
    /// Force re-analysis of every conversation.
    All,
    /// Only conversations lacking an analysis at job-start time.
    MissingOnly,
}

impl AnalysisScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisScope::All => "all",
            AnalysisScope::MissingOnly => "missing_only",
        }
    }
}

/// The closed event vocabulary a job emits, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        current: u64,
        total: u64,
        label: String,
        percent: f64,
    },
    Completed {
        processed: u64,
        errors: u64,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Transient, in-memory snapshot of one in-flight batch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJobState {
    pub processed: u64,
    pub total: u64,
    pub current_label: String,
    pub percent: f64,
    pub status: JobStatus,
}

impl Default for AnalysisJobState {
    fn default() -> Self {
        Self {
            processed: 0,
            total: 0,
            current_label: String::new(),
            percent: 0.0,
            status: JobStatus::Running,
        }
    }
}

/// Folds the ordered event sequence into an `AnalysisJobState`.
/// Duplicated progress events (non-increasing `current`) are idempotent
/// no-ops; `apply` returns false for them.
#[derive(Debug, Default)]
pub struct JobStateTracker {
    state: AnalysisJobState,
    last_current: Option<u64>,
}

impl JobStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AnalysisJobState {
        &self.state
    }

    /// Apply one event. Returns true when the event changed the state.
    pub fn apply(&mut self, event: &JobEvent) -> bool {
        if self.state.status != JobStatus::Running {
            // Terminal states never change again.
            return false;
        }
        match event {
            JobEvent::Progress {
                current,
                total,
                label,
                percent,
            } => {
                if let Some(last) = self.last_current {
                    if *current <= last {
                        return false;
                    }
                }
                self.last_current = Some(*current);
                self.state.processed = *current;
                self.state.total = *total;
                self.state.current_label = label.clone();
                self.state.percent = *percent;
                true
            }
            JobEvent::Completed { processed, .. } => {
                self.state.processed = *processed;
                self.state.percent = 100.0;
                self.state.status = JobStatus::Completed;
                true
            }
            JobEvent::Failed { reason } => {
                self.state.current_label = reason.clone();
                self.state.status = JobStatus::Failed;
                true
            }
        }
    }

    /// Mark the observing session as disconnected before a terminal event
    /// arrived. The underlying job keeps running regardless.
    pub fn abandon(&mut self) {
        if self.state.status == JobStatus::Running {
            self.state.status = JobStatus::Cancelled;
        }
    }
}

// ── Analyzer seam ────────────────────────────────────────────────────────────

/// The opaque upstream producer of per-conversation analyses. How a single
/// conversation gets scored is out of scope; implementations plug in here.
pub trait ConversationAnalyzer: Send + Sync {
    fn analyze(&self, conversation: &ConversationMetric)
        -> anyhow::Result<ConversationAnalysis>;
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// One long-lived subscription per job: a lazy, finite, non-restartable
/// event sequence plus ownership recovery of the store on `join`.
pub struct JobHandle {
    events: Receiver<JobEvent>,
    thread: JoinHandle<MetricStore>,
}

impl JobHandle {
    /// Blocking iterator over the remaining events. Ends after the
    /// terminal event, or immediately if the job thread already finished
    /// and the channel drained.
    pub fn events(&self) -> crossbeam_channel::Iter<'_, JobEvent> {
        self.events.iter()
    }

    /// Receive the next event, blocking. `None` once the stream is done.
    pub fn next_event(&self) -> Option<JobEvent> {
        self.events.recv().ok()
    }

    /// Wait for the job to finish and take the store back.
    pub fn join(self) -> AnalyticsResult<MetricStore> {
        self.thread
            .join()
            .map_err(|_| AnalyticsError::Other(anyhow::anyhow!("analysis job thread panicked")))
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

/// Guards that at most one batch job runs at a time and owns the
/// destructive reset operation.
pub struct BatchJobController {
    running: Arc<AtomicBool>,
}

impl Default for BatchJobController {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchJobController {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a bulk (re-)analysis on a background thread. The store moves
    /// into the job and comes back through `JobHandle::join`.
    ///
    /// A second invocation while a job is running is rejected with
    /// `JobAlreadyRunning` — re-entrancy is a caller bug, not a queue.
    pub fn run_analysis(
        &self,
        store: MetricStore,
        analyzer: Arc<dyn ConversationAnalyzer>,
        scope: AnalysisScope,
    ) -> AnalyticsResult<JobHandle> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AnalyticsError::JobAlreadyRunning);
        }

        let (tx, rx) = unbounded();
        let guard = RunningGuard(Arc::clone(&self.running));
        log::info!("analysis job starting (scope={})", scope.as_str());

        let thread = thread::spawn(move || {
            let _guard = guard; // reset the running flag even on panic
            run_job(store, analyzer, scope, tx)
        });

        Ok(JobHandle { events: rx, thread })
    }

    /// Destructive reset: delete all derived analysis fields, keeping raw
    /// conversation data. Rejected while a job is running. Returns the
    /// count of rows cleared.
    pub fn clear_analyses(&self, store: &MetricStore) -> AnalyticsResult<i64> {
        if self.is_running() {
            return Err(AnalyticsError::JobAlreadyRunning);
        }
        let cleared = store.clear_analyses()?;
        log::info!("cleared analyses on {cleared} conversations");
        Ok(cleared)
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── Job body ─────────────────────────────────────────────────────────────────

fn run_job(
    store: MetricStore,
    analyzer: Arc<dyn ConversationAnalyzer>,
    scope: AnalysisScope,
    tx: Sender<JobEvent>,
) -> MetricStore {
    // Scope is resolved at job-start time: a MissingOnly retry only ever
    // touches rows that lacked analysis when the job began.
    let ids = match scope {
        AnalysisScope::All => store.all_ids(),
        AnalysisScope::MissingOnly => store.unanalyzed_ids(),
    };
    let ids = match ids {
        Ok(ids) => ids,
        Err(e) => {
            log::warn!("analysis job failed to resolve scope: {e}");
            let _ = tx.send(JobEvent::Failed {
                reason: e.to_string(),
            });
            return store;
        }
    };

    let total = ids.len() as u64;
    let mut processed = 0u64;
    let mut errors = 0u64;

    for (i, conversation_id) in ids.iter().enumerate() {
        let current = i as u64 + 1;
        // Sends are fire-and-forget: a disconnected observer never stops
        // the job.
        let _ = tx.send(JobEvent::Progress {
            current,
            total,
            label: conversation_id.clone(),
            percent: current as f64 * 100.0 / total as f64,
        });

        let conversation = match store.conversation(conversation_id) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("analysis job aborting: {e}");
                let _ = tx.send(JobEvent::Failed {
                    reason: e.to_string(),
                });
                return store;
            }
        };

        match analyzer.analyze(&conversation) {
            Ok(analysis) => {
                if let Err(e) = store.replace_analysis(conversation_id, &analysis, Utc::now()) {
                    log::warn!("analysis job aborting: {e}");
                    let _ = tx.send(JobEvent::Failed {
                        reason: e.to_string(),
                    });
                    return store;
                }
                processed += 1;
                log::debug!("analyzed {conversation_id} ({current}/{total})");
            }
            Err(e) => {
                // Upstream scoring failed for this one call; keep going.
                errors += 1;
                log::warn!("analyzer error on {conversation_id}: {e}");
            }
        }
    }

    log::info!(
        "analysis job completed (scope={}, processed={processed}, errors={errors})",
        scope.as_str()
    );
    let _ = tx.send(JobEvent::Completed { processed, errors });
    store
}
