//! Store → aggregator → recommendation → comparator, end to end.

use calldesk_core::aggregator::aggregate_seller;
use calldesk_core::comparator::compare;
use calldesk_core::config::AnalyticsConfig;
use calldesk_core::job::{AnalysisScope, BatchJobController, ConversationAnalyzer, JobEvent};
use calldesk_core::metric::{
    ConversationAnalysis, ConversationMetric, ObjectionCounts, PhaseBreakdown, SaleStatus,
    SoftSkills,
};
use calldesk_core::recommendation::{recommend_seller, Priority};
use calldesk_core::store::MetricStore;
use chrono::{TimeZone, Utc};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn conversation(id: &str, seller: &str, sale: bool) -> ConversationMetric {
    ConversationMetric {
        conversation_id: id.into(),
        seller_id: seller.into(),
        branch_id: "b1".into(),
        recorded_at: Utc.with_ymd_and_hms(2024, 5, 10, 10, 0, 0).unwrap(),
        duration_minutes: 19.0,
        sale_completed: sale,
        sale_status: if sale {
            SaleStatus::Confirmed
        } else {
            SaleStatus::NoSale
        },
        analysis: None,
    }
}

fn analysis_with_closing_rhythm(closing_rhythm: f64) -> ConversationAnalysis {
    ConversationAnalysis {
        phases: PhaseBreakdown {
            opening: 30.0,
            discovery: 90.0,
            objection: 45.0,
            argument: 70.0,
            closing: 40.0,
            silence: 15.0,
        },
        skills: SoftSkills {
            talk_ratio: 58.0,
            active_listening: 66.0,
            objection_handling: 63.0,
            closing_rhythm,
            empathy: 61.0,
        },
        confidence: 68.0,
        objections: ObjectionCounts {
            explicit: 1,
            implicit: 2,
            unanswered: 0,
            ineffective: 1,
        },
        loss_moment: None,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Seed 5 conversations for one seller — 3 carrying full soft-skill data
/// averaging closing rhythm 35, 2 without advanced data. The aggregate
/// reports `has_data = true` over the 3 analyzed records and the engine
/// flags the weak closing rhythm at high priority, citing 35.
#[test]
fn weak_closing_rhythm_surfaces_through_the_whole_pipeline() {
    let store = MetricStore::in_memory().unwrap();
    store.migrate().unwrap();

    for (i, rhythm) in [30.0, 35.0, 40.0].iter().enumerate() {
        let mut metric = conversation(&format!("a{i}"), "s-demo", i == 0);
        metric.analysis = Some(analysis_with_closing_rhythm(*rhythm));
        store.insert_conversation(&metric).unwrap();
    }
    store.insert_conversation(&conversation("r0", "s-demo", true)).unwrap();
    store.insert_conversation(&conversation("r1", "s-demo", false)).unwrap();

    let config = AnalyticsConfig::default_for_tests();
    let records = store.conversations_for_seller("s-demo").unwrap();
    assert_eq!(records.len(), 5);

    let agg = aggregate_seller("s-demo", &records, config.top_loss_moments);
    assert!(agg.has_data);
    assert_eq!(agg.analyzed_conversations, 3);
    assert!((agg.skills.closing_rhythm - 35.0).abs() < 1e-9);

    let rec = recommend_seller(&agg, &config);
    assert_eq!(rec.priority, Priority::High);
    assert!(rec.message.contains("35"), "message must cite ~35: {}", rec.message);

    // Comparator runs on the same aggregate without caring which path fires.
    let cmp = compare(&agg.comparison_inputs(), &config.comparison, &config.estimate);
    assert!(!cmp.estimated);
    assert!(cmp.with_sale.confidence > cmp.without_sale.confidence);
}

/// The batch job feeds the same pipeline: analyze a seeded store through
/// the controller, then aggregate and recommend from the refreshed rows.
#[test]
fn batch_job_feeds_aggregation_and_recommendation() {
    struct WeakClosingAnalyzer;

    impl ConversationAnalyzer for WeakClosingAnalyzer {
        fn analyze(
            &self,
            _conversation: &ConversationMetric,
        ) -> anyhow::Result<ConversationAnalysis> {
            Ok(analysis_with_closing_rhythm(32.0))
        }
    }

    let store = MetricStore::in_memory().unwrap();
    store.migrate().unwrap();
    for i in 0..6 {
        store
            .insert_conversation(&conversation(&format!("c{i}"), "s-batch", i < 2))
            .unwrap();
    }

    let controller = BatchJobController::new();
    let handle = controller
        .run_analysis(store, Arc::new(WeakClosingAnalyzer), AnalysisScope::MissingOnly)
        .unwrap();
    let events: Vec<JobEvent> = handle.events().collect();
    assert!(matches!(
        events.last(),
        Some(JobEvent::Completed {
            processed: 6,
            errors: 0
        })
    ));
    let store = handle.join().unwrap();

    let config = AnalyticsConfig::default_for_tests();
    let records = store.conversations_for_seller("s-batch").unwrap();
    let agg = aggregate_seller("s-batch", &records, config.top_loss_moments);
    assert!(agg.has_data);
    assert_eq!(agg.analyzed_conversations, 6);

    let rec = recommend_seller(&agg, &config);
    assert_eq!(rec.priority, Priority::High);
    assert!(rec.message.contains("32"));
}
