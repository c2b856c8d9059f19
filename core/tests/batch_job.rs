use calldesk_core::error::AnalyticsError;
use calldesk_core::job::{
    AnalysisScope, BatchJobController, ConversationAnalyzer, JobEvent, JobStateTracker, JobStatus,
};
use calldesk_core::metric::{
    ConversationAnalysis, ConversationMetric, LossMoment, ObjectionCounts, PhaseBreakdown,
    SaleStatus, SoftSkills,
};
use calldesk_core::store::MetricStore;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn seeded_store(unanalyzed: usize) -> MetricStore {
    let store = MetricStore::in_memory().unwrap();
    store.migrate().unwrap();
    for i in 0..unanalyzed {
        store
            .insert_conversation(&raw_conversation(&format!("c{i}"), i % 2 == 0))
            .unwrap();
    }
    store
}

fn raw_conversation(id: &str, sale: bool) -> ConversationMetric {
    ConversationMetric {
        conversation_id: id.into(),
        seller_id: "s1".into(),
        branch_id: "b1".into(),
        recorded_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        duration_minutes: 18.0,
        sale_completed: sale,
        sale_status: if sale {
            SaleStatus::Confirmed
        } else {
            SaleStatus::NoSale
        },
        analysis: None,
    }
}

fn fixed_analysis() -> ConversationAnalysis {
    ConversationAnalysis {
        phases: PhaseBreakdown {
            opening: 40.0,
            discovery: 100.0,
            objection: 60.0,
            argument: 80.0,
            closing: 50.0,
            silence: 20.0,
        },
        skills: SoftSkills {
            talk_ratio: 55.0,
            active_listening: 62.0,
            objection_handling: 58.0,
            closing_rhythm: 47.0,
            empathy: 60.0,
        },
        confidence: 66.0,
        objections: ObjectionCounts {
            explicit: 2,
            implicit: 1,
            unanswered: 1,
            ineffective: 0,
        },
        loss_moment: Some(LossMoment {
            phrase: "let me think about it".into(),
            abandonment_minute: 11.0,
        }),
    }
}

/// Always succeeds with the same payload.
struct StubAnalyzer;

impl ConversationAnalyzer for StubAnalyzer {
    fn analyze(
        &self,
        _conversation: &ConversationMetric,
    ) -> anyhow::Result<ConversationAnalysis> {
        Ok(fixed_analysis())
    }
}

/// Fails for every odd-numbered conversation id.
struct FlakyAnalyzer;

impl ConversationAnalyzer for FlakyAnalyzer {
    fn analyze(
        &self,
        conversation: &ConversationMetric,
    ) -> anyhow::Result<ConversationAnalysis> {
        let n: usize = conversation.conversation_id[1..].parse().unwrap_or(0);
        if n % 2 == 1 {
            anyhow::bail!("upstream analyzer unreachable");
        }
        Ok(fixed_analysis())
    }
}

/// Succeeds slowly; used to observe the re-invocation guard.
struct SlowAnalyzer;

impl ConversationAnalyzer for SlowAnalyzer {
    fn analyze(
        &self,
        _conversation: &ConversationMetric,
    ) -> anyhow::Result<ConversationAnalysis> {
        std::thread::sleep(Duration::from_millis(30));
        Ok(fixed_analysis())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// A missing-only run over 4 unanalyzed conversations emits ordered
/// progress events and exactly one terminal Completed event.
#[test]
fn missing_only_run_emits_ordered_events() {
    let store = seeded_store(4);
    let controller = BatchJobController::new();

    let handle = controller
        .run_analysis(store, Arc::new(StubAnalyzer), AnalysisScope::MissingOnly)
        .unwrap();

    let events: Vec<JobEvent> = handle.events().collect();
    let (progress, terminal): (Vec<_>, Vec<_>) = events
        .iter()
        .partition(|e| matches!(e, JobEvent::Progress { .. }));

    assert_eq!(progress.len(), 4);
    let mut last = 0u64;
    for event in &progress {
        if let JobEvent::Progress { current, total, percent, .. } = event {
            assert_eq!(*total, 4);
            assert!(*current > last, "progress must be strictly increasing");
            assert!(*percent > 0.0 && *percent <= 100.0);
            last = *current;
        }
    }

    assert_eq!(terminal.len(), 1, "exactly one terminal event");
    assert_eq!(
        terminal[0],
        &JobEvent::Completed {
            processed: 4,
            errors: 0
        }
    );

    let store = handle.join().unwrap();
    assert_eq!(store.missing_count().unwrap(), 0);
}

/// Missing-only with nothing missing completes immediately with zero
/// processed and no progress events — never an error.
#[test]
fn missing_only_with_nothing_missing_is_a_no_op() {
    let store = seeded_store(3);
    let controller = BatchJobController::new();

    // First pass analyzes everything.
    let handle = controller
        .run_analysis(store, Arc::new(StubAnalyzer), AnalysisScope::MissingOnly)
        .unwrap();
    let _: Vec<JobEvent> = handle.events().collect();
    let store = handle.join().unwrap();

    // Second pass finds nothing to do.
    let handle = controller
        .run_analysis(store, Arc::new(StubAnalyzer), AnalysisScope::MissingOnly)
        .unwrap();
    let events: Vec<JobEvent> = handle.events().collect();
    assert_eq!(
        events,
        vec![JobEvent::Completed {
            processed: 0,
            errors: 0
        }]
    );
    handle.join().unwrap();
}

/// Scope "all" force re-analyzes rows that already carry an analysis.
#[test]
fn scope_all_reanalyzes_everything() {
    let store = seeded_store(3);
    let controller = BatchJobController::new();

    let handle = controller
        .run_analysis(store, Arc::new(StubAnalyzer), AnalysisScope::MissingOnly)
        .unwrap();
    let _: Vec<JobEvent> = handle.events().collect();
    let store = handle.join().unwrap();
    assert_eq!(store.missing_count().unwrap(), 0);

    let handle = controller
        .run_analysis(store, Arc::new(StubAnalyzer), AnalysisScope::All)
        .unwrap();
    let events: Vec<JobEvent> = handle.events().collect();
    assert!(matches!(
        events.last(),
        Some(JobEvent::Completed {
            processed: 3,
            errors: 0
        })
    ));
    handle.join().unwrap();
}

/// Per-conversation analyzer failures are counted, not fatal; successful
/// analyses stay committed.
#[test]
fn analyzer_errors_are_counted_and_partial_progress_sticks() {
    let store = seeded_store(4); // c0..c3; FlakyAnalyzer fails on c1, c3
    let controller = BatchJobController::new();

    let handle = controller
        .run_analysis(store, Arc::new(FlakyAnalyzer), AnalysisScope::MissingOnly)
        .unwrap();
    let events: Vec<JobEvent> = handle.events().collect();
    assert!(matches!(
        events.last(),
        Some(JobEvent::Completed {
            processed: 2,
            errors: 2
        })
    ));

    let store = handle.join().unwrap();
    // The two failures remain un-analyzed and retryable.
    assert_eq!(store.missing_count().unwrap(), 2);
    assert_eq!(store.unanalyzed_ids().unwrap(), vec!["c1", "c3"]);
    assert!(store.conversation("c0").unwrap().has_analysis());
    assert!(!store.conversation("c1").unwrap().has_analysis());
}

/// A second run_analysis while one is running is rejected, and the
/// controller frees up once the job ends.
#[test]
fn concurrent_run_is_rejected() {
    let controller = BatchJobController::new();

    let handle = controller
        .run_analysis(seeded_store(5), Arc::new(SlowAnalyzer), AnalysisScope::MissingOnly)
        .unwrap();
    assert!(controller.is_running());

    match controller.run_analysis(seeded_store(1), Arc::new(StubAnalyzer), AnalysisScope::All) {
        Err(AnalyticsError::JobAlreadyRunning) => {}
        other => panic!("expected JobAlreadyRunning, got {:?}", other.map(|_| ())),
    }

    let _: Vec<JobEvent> = handle.events().collect();
    handle.join().unwrap();

    // Free again after the first job finished.
    let handle = controller
        .run_analysis(seeded_store(1), Arc::new(StubAnalyzer), AnalysisScope::All)
        .unwrap();
    let _: Vec<JobEvent> = handle.events().collect();
    handle.join().unwrap();
}

/// Dropping the handle must not stop the job: the store still ends up
/// fully analyzed. Verified through a shared file-backed database.
#[test]
fn dropping_the_subscription_does_not_cancel_the_job() {
    let dir = std::env::temp_dir().join(format!("calldesk-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("drop-subscription.db");
    let path = path.to_str().unwrap();
    let _ = std::fs::remove_file(path);

    let store = MetricStore::open(path).unwrap();
    store.migrate().unwrap();
    for i in 0..3 {
        store
            .insert_conversation(&raw_conversation(&format!("c{i}"), false))
            .unwrap();
    }

    let controller = BatchJobController::new();
    let handle = controller
        .run_analysis(store, Arc::new(SlowAnalyzer), AnalysisScope::MissingOnly)
        .unwrap();
    // Observe one event, then walk away without draining the stream.
    let first = handle.next_event();
    assert!(matches!(first, Some(JobEvent::Progress { .. })));
    drop(handle);

    // The job keeps running; poll the file until it has analyzed everything.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let check = MetricStore::open(path).unwrap();
        if check.missing_count().unwrap() == 0 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "job did not finish after the subscription was dropped"
        );
        std::thread::sleep(Duration::from_millis(20));
    }
    let _ = std::fs::remove_file(path);
}

/// clear_analyses nulls the derived fields only and reports the count.
#[test]
fn clear_analyses_reports_count_and_keeps_raw_rows() {
    let store = seeded_store(3);
    let controller = BatchJobController::new();

    let handle = controller
        .run_analysis(store, Arc::new(StubAnalyzer), AnalysisScope::MissingOnly)
        .unwrap();
    let _: Vec<JobEvent> = handle.events().collect();
    let store = handle.join().unwrap();

    let cleared = controller.clear_analyses(&store).unwrap();
    assert_eq!(cleared, 3);
    assert_eq!(store.conversation_count().unwrap(), 3);
    assert_eq!(store.missing_count().unwrap(), 3);

    // Clearing again finds nothing to clear.
    assert_eq!(controller.clear_analyses(&store).unwrap(), 0);
}

// ── Tracker ──────────────────────────────────────────────────────────────────

/// Duplicate progress events (non-increasing current) are idempotent no-ops.
#[test]
fn tracker_ignores_duplicate_progress() {
    let mut tracker = JobStateTracker::new();
    let event = JobEvent::Progress {
        current: 1,
        total: 4,
        label: "c0".into(),
        percent: 25.0,
    };

    assert!(tracker.apply(&event));
    let snapshot = tracker.state().clone();
    assert!(!tracker.apply(&event), "duplicate must be a no-op");
    assert_eq!(tracker.state(), &snapshot);
    assert_eq!(tracker.state().status, JobStatus::Running);
}

/// A terminal Completed event freezes the state at 100%.
#[test]
fn tracker_completes_and_freezes() {
    let mut tracker = JobStateTracker::new();
    tracker.apply(&JobEvent::Progress {
        current: 2,
        total: 2,
        label: "c1".into(),
        percent: 100.0,
    });
    tracker.apply(&JobEvent::Completed {
        processed: 2,
        errors: 0,
    });

    assert_eq!(tracker.state().status, JobStatus::Completed);
    assert_eq!(tracker.state().percent, 100.0);

    // Nothing changes a terminal state.
    assert!(!tracker.apply(&JobEvent::Progress {
        current: 3,
        total: 3,
        label: "zombie".into(),
        percent: 100.0,
    }));
}

/// Failure carries the reason into the state.
#[test]
fn tracker_records_failure_reason() {
    let mut tracker = JobStateTracker::new();
    tracker.apply(&JobEvent::Failed {
        reason: "upstream analyzer unreachable".into(),
    });

    assert_eq!(tracker.state().status, JobStatus::Failed);
    assert_eq!(tracker.state().current_label, "upstream analyzer unreachable");
}

/// An observer that disconnects early marks its local state cancelled;
/// terminal states are unaffected.
#[test]
fn tracker_abandon_marks_cancelled() {
    let mut tracker = JobStateTracker::new();
    tracker.abandon();
    assert_eq!(tracker.state().status, JobStatus::Cancelled);

    let mut done = JobStateTracker::new();
    done.apply(&JobEvent::Completed {
        processed: 1,
        errors: 0,
    });
    done.abandon();
    assert_eq!(done.state().status, JobStatus::Completed);
}
