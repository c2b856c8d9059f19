//! desk-runner: headless analytics runner for CallDesk.
//!
//! Usage:
//!   desk-runner --seed 12345 --conversations 40 --db run.db
//!   desk-runner --db run.db --force          # re-analyze everything
//!   desk-runner --db run.db --clear          # destructive analysis reset
//!   desk-runner --db run.db --json           # machine-readable summary

use anyhow::Result;
use calldesk_core::{
    aggregator::{aggregate_branch, aggregate_seller},
    comparator::compare,
    config::AnalyticsConfig,
    job::{AnalysisScope, BatchJobController, JobEvent, JobStateTracker, JobStatus},
    metric::{
        ConversationAnalysis, ConversationMetric, LossMoment, ObjectionCounts, PhaseBreakdown,
        SaleStatus, SoftSkills,
    },
    store::MetricStore,
};
use chrono::{Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

const SELLERS: &[(&str, &str)] = &[
    ("seller-ana", "branch-north"),
    ("seller-luis", "branch-north"),
    ("seller-marta", "branch-south"),
    ("seller-jorge", "branch-south"),
];

const LOSS_PHRASES: &[&str] = &[
    "it is too expensive",
    "I need to think about it",
    "send me the information by email",
    "I have to check with my partner",
];

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let conversations = parse_arg(&args, "--conversations", 40usize);
    let force = args.iter().any(|a| a == "--force");
    let clear = args.iter().any(|a| a == "--clear");
    let json = args.iter().any(|a| a == "--json");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let config = match args.windows(2).find(|w| w[0] == "--config") {
        Some(w) => AnalyticsConfig::from_file(&w[1])?,
        None => AnalyticsConfig::default(),
    };
    config.validate()?;

    println!("CallDesk — desk-runner");
    println!("  seed:          {seed}");
    println!("  conversations: {conversations}");
    println!("  db:            {db}");
    println!();

    let store = MetricStore::open(db)?;
    store.migrate()?;

    let controller = BatchJobController::new();

    if clear {
        let cleared = controller.clear_analyses(&store)?;
        println!("Cleared analyses on {cleared} conversations (raw data kept).");
        return Ok(());
    }

    if store.conversation_count()? == 0 {
        seed_conversations(&store, seed, conversations)?;
        println!("Seeded {conversations} synthetic conversations.");
    }

    let scope = if force {
        AnalysisScope::All
    } else {
        AnalysisScope::MissingOnly
    };
    println!(
        "Running analysis (scope={}, missing={})...",
        scope.as_str(),
        store.missing_count()?
    );

    let analyzer = Arc::new(SyntheticAnalyzer { seed });
    let handle = controller.run_analysis(store, analyzer, scope)?;

    let mut tracker = JobStateTracker::new();
    for event in handle.events() {
        tracker.apply(&event);
        match &event {
            JobEvent::Progress {
                current,
                total,
                label,
                percent,
            } => {
                println!("  [{current}/{total}] {label} ({percent:.0}%)");
            }
            JobEvent::Completed { processed, errors } => {
                println!("  done: processed={processed} errors={errors}");
            }
            JobEvent::Failed { reason } => {
                println!("  FAILED: {reason}");
            }
        }
    }
    let store = handle.join()?;

    if tracker.state().status == JobStatus::Failed {
        anyhow::bail!("analysis job failed: {}", tracker.state().current_label);
    }

    if json {
        print_json_summary(&store, &config)?;
    } else {
        print_summary(&store, &config)?;
    }
    Ok(())
}

/// Machine-readable variant of the summary, one JSON document on stdout.
fn print_json_summary(store: &MetricStore, config: &AnalyticsConfig) -> Result<()> {
    #[derive(serde::Serialize)]
    struct SellerEntry {
        aggregate: calldesk_core::aggregator::SellerAggregate,
        recommendation: calldesk_core::recommendation::Recommendation,
    }

    #[derive(serde::Serialize)]
    struct BranchEntry {
        aggregate: calldesk_core::aggregator::BranchAggregate,
        recommendation: calldesk_core::recommendation::Recommendation,
        comparison: calldesk_core::comparator::SaleComparison,
    }

    #[derive(serde::Serialize)]
    struct Summary {
        sellers: Vec<SellerEntry>,
        branches: Vec<BranchEntry>,
    }

    let mut summary = Summary {
        sellers: Vec::new(),
        branches: Vec::new(),
    };
    for seller_id in store.seller_ids()? {
        let records = store.conversations_for_seller(&seller_id)?;
        let aggregate = aggregate_seller(&seller_id, &records, config.top_loss_moments);
        let recommendation = calldesk_core::recommendation::recommend_seller(&aggregate, config);
        summary.sellers.push(SellerEntry {
            aggregate,
            recommendation,
        });
    }
    for branch_id in store.branch_ids()? {
        let records = store.conversations_for_branch(&branch_id)?;
        let aggregate = aggregate_branch(&branch_id, &records, config.top_loss_moments);
        let recommendation = calldesk_core::recommendation::recommend_branch(&aggregate, config);
        let comparison = compare(
            &aggregate.comparison_inputs(),
            &config.comparison,
            &config.estimate,
        );
        summary.branches.push(BranchEntry {
            aggregate,
            recommendation,
            comparison,
        });
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

// ── Summary ──────────────────────────────────────────────────────────────────

fn print_summary(store: &MetricStore, config: &AnalyticsConfig) -> Result<()> {
    println!();
    println!("=== SELLER SUMMARY ===");
    for seller_id in store.seller_ids()? {
        let records = store.conversations_for_seller(&seller_id)?;
        let agg = aggregate_seller(&seller_id, &records, config.top_loss_moments);
        let rec = calldesk_core::recommendation::recommend_seller(&agg, config);

        println!(
            "  {seller_id}: {}/{} analyzed | conversion {:.0}% | confidence {:.0}",
            agg.analyzed_conversations,
            agg.total_conversations,
            agg.conversion_rate,
            agg.avg_confidence,
        );
        let d = agg.phase_distribution;
        println!(
            "    phases: opening {}% discovery {}% objection {}% argument {}% closing {}% silence {}%",
            d.opening, d.discovery, d.objection, d.argument, d.closing, d.silence
        );
        if let Some(moment) = agg.top_loss_moments.first() {
            println!(
                "    top loss moment: \"{}\" x{} (avg minute {:.1})",
                moment.phrase, moment.occurrences, moment.avg_abandonment_minute
            );
        }
        println!("    [{}] {}", rec.priority.as_str(), rec.message);
    }

    println!();
    println!("=== BRANCH SUMMARY ===");
    for branch_id in store.branch_ids()? {
        let records = store.conversations_for_branch(&branch_id)?;
        let agg = aggregate_branch(&branch_id, &records, config.top_loss_moments);
        let rec = calldesk_core::recommendation::recommend_branch(&agg, config);
        let cmp = compare(&agg.comparison_inputs(), &config.comparison, &config.estimate);

        println!(
            "  {branch_id}: {} sellers, {} conversations | conversion {:.0}% | seller score {:.0}",
            agg.seller_count, agg.total_conversations, agg.conversion_rate, agg.avg_seller_score
        );
        println!(
            "    sale vs no-sale{}: confidence {:.0}/{:.0} | talk {:.0}%/{:.0}% | duration {:.0}m/{:.0}m",
            if cmp.estimated { " (estimated)" } else { "" },
            cmp.with_sale.confidence,
            cmp.without_sale.confidence,
            cmp.with_sale.vendor_talk_ratio,
            cmp.without_sale.vendor_talk_ratio,
            cmp.with_sale.duration_minutes,
            cmp.without_sale.duration_minutes,
        );
        println!("    [{}] {}", rec.priority.as_str(), rec.message);
    }

    Ok(())
}

// ── Synthetic data ───────────────────────────────────────────────────────────

/// Seed raw (un-analyzed) conversations, deterministically from the seed.
fn seed_conversations(store: &MetricStore, seed: u64, count: usize) -> Result<()> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let start = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();

    for i in 0..count {
        let (seller_id, branch_id) = SELLERS[i % SELLERS.len()];
        let sale = rng.gen_bool(0.35);
        let metric = ConversationMetric {
            conversation_id: Uuid::from_u64_pair(seed, i as u64).to_string(),
            seller_id: seller_id.into(),
            branch_id: branch_id.into(),
            recorded_at: start + Duration::hours(i as i64 * 3),
            duration_minutes: rng.gen_range(6.0..45.0),
            sale_completed: sale,
            sale_status: if sale {
                SaleStatus::Confirmed
            } else if rng.gen_bool(0.2) {
                SaleStatus::AdvancedNoClose
            } else {
                SaleStatus::NoSale
            },
            analysis: None,
        };
        store.insert_conversation(&metric)?;
    }
    log::info!("seeded {count} synthetic conversations (seed={seed})");
    Ok(())
}

/// Stand-in for the upstream AI model: scores every conversation
/// deterministically from the run seed and the conversation id.
struct SyntheticAnalyzer {
    seed: u64,
}

impl calldesk_core::job::ConversationAnalyzer for SyntheticAnalyzer {
    fn analyze(&self, conversation: &ConversationMetric) -> Result<ConversationAnalysis> {
        let mut hasher = DefaultHasher::new();
        conversation.conversation_id.hash(&mut hasher);
        let mut rng = Pcg64Mcg::seed_from_u64(self.seed ^ hasher.finish());

        let loss_moment = if conversation.sale_completed || rng.gen_bool(0.4) {
            None
        } else {
            Some(LossMoment {
                phrase: LOSS_PHRASES[rng.gen_range(0..LOSS_PHRASES.len())].to_string(),
                abandonment_minute: rng.gen_range(1.0..conversation.duration_minutes.max(2.0)),
            })
        };

        Ok(ConversationAnalysis {
            phases: PhaseBreakdown {
                opening: rng.gen_range(20.0..90.0),
                discovery: rng.gen_range(60.0..240.0),
                objection: rng.gen_range(0.0..120.0),
                argument: rng.gen_range(30.0..180.0),
                closing: rng.gen_range(10.0..90.0),
                silence: rng.gen_range(0.0..60.0),
            },
            skills: SoftSkills {
                talk_ratio: rng.gen_range(35.0..80.0),
                active_listening: rng.gen_range(30.0..90.0),
                objection_handling: rng.gen_range(30.0..90.0),
                closing_rhythm: rng.gen_range(25.0..85.0),
                empathy: rng.gen_range(30.0..90.0),
            },
            confidence: rng.gen_range(25.0..95.0),
            objections: ObjectionCounts {
                explicit: rng.gen_range(0..4),
                implicit: rng.gen_range(0..3),
                unanswered: rng.gen_range(0..2),
                ineffective: rng.gen_range(0..2),
            },
            loss_moment,
        })
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
