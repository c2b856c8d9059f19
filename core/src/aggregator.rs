//! Aggregation over scoped conversation sets.
//!
//! RULES:
//!   - Pure functions over the record slice they are handed; no I/O, no
//!     locks, no mutation. Callers pick the scope (one seller, one branch).
//!   - Averages run over records that actually carry a field. Missing data
//!     is excluded, never treated as zero.
//!   - An empty scope yields a zeroed aggregate with `has_data = false`.

use crate::{
    metric::{ConversationMetric, PhaseBreakdown, PhaseDistribution},
    normalizer::normalize_phases,
    types::{BranchId, SellerId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Public types ─────────────────────────────────────────────────────────────

/// Arithmetic means of the five soft-skill scores over analyzed records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillAverages {
    pub talk_ratio: f64,
    pub active_listening: f64,
    pub objection_handling: f64,
    pub closing_rhythm: f64,
    pub empathy: f64,
}

impl SkillAverages {
    /// Mean of the five skills; the "seller score" used by the branch
    /// recommendation chain and the comparator fallback.
    pub fn overall(&self) -> f64 {
        (self.talk_ratio
            + self.active_listening
            + self.objection_handling
            + self.closing_rhythm
            + self.empathy)
            / 5.0
    }
}

/// One recurring loss-moment phrase across a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossMomentSummary {
    pub phrase: String,
    pub occurrences: i64,
    pub avg_abandonment_minute: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerAggregate {
    pub seller_id: SellerId,
    pub total_conversations: i64,
    pub analyzed_conversations: i64,
    /// False when no record in scope carries advanced analysis. Downstream
    /// consumers must keep this distinguishable from real zeros.
    pub has_data: bool,
    /// Percentage of conversations with a completed sale, over all records.
    pub conversion_rate: f64,
    pub avg_duration_minutes: f64,
    pub skills: SkillAverages,
    pub avg_confidence: f64,
    pub avg_objections: f64,
    pub phase_distribution: PhaseDistribution,
    /// Descending by frequency; frequency ties broken by the later mean
    /// abandonment minute, then by phrase for full determinism.
    pub top_loss_moments: Vec<LossMomentSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchAggregate {
    pub branch_id: BranchId,
    pub total_conversations: i64,
    pub analyzed_conversations: i64,
    pub has_data: bool,
    pub conversion_rate: f64,
    pub avg_duration_minutes: f64,
    pub skills: SkillAverages,
    pub avg_confidence: f64,
    pub avg_objections: f64,
    pub phase_distribution: PhaseDistribution,
    pub top_loss_moments: Vec<LossMomentSummary>,
    pub seller_count: i64,
    /// Mean over sellers of each seller's per-record skill-mean average.
    /// Only sellers with analyzed records contribute.
    pub avg_seller_score: f64,
}

// ── Aggregation ──────────────────────────────────────────────────────────────

/// Shared numeric core of both aggregate flavors.
struct ScopeStats {
    total: i64,
    analyzed: i64,
    conversion_rate: f64,
    avg_duration: f64,
    skills: SkillAverages,
    avg_confidence: f64,
    avg_objections: f64,
    phase_distribution: PhaseDistribution,
    top_loss_moments: Vec<LossMomentSummary>,
}

fn scope_stats(records: &[ConversationMetric], top_n: usize) -> ScopeStats {
    let total = records.len() as i64;
    let sales = records.iter().filter(|r| r.sale_completed).count() as i64;
    let conversion_rate = if total > 0 {
        sales as f64 * 100.0 / total as f64
    } else {
        0.0
    };
    let avg_duration = mean(records.iter().map(|r| r.duration_minutes));

    let analyzed: Vec<_> = records.iter().filter_map(|r| r.analysis.as_ref()).collect();
    let n = analyzed.len() as i64;

    let skills = SkillAverages {
        talk_ratio: mean(analyzed.iter().map(|a| a.skills.talk_ratio)),
        active_listening: mean(analyzed.iter().map(|a| a.skills.active_listening)),
        objection_handling: mean(analyzed.iter().map(|a| a.skills.objection_handling)),
        closing_rhythm: mean(analyzed.iter().map(|a| a.skills.closing_rhythm)),
        empathy: mean(analyzed.iter().map(|a| a.skills.empathy)),
    };
    let avg_confidence = mean(analyzed.iter().map(|a| a.confidence));
    let avg_objections = mean(analyzed.iter().map(|a| a.objections.total() as f64));

    // Phase weights are summed across analyzed records before normalizing;
    // an entirely-zero sum falls through to the all-zero distribution.
    let mut phases = PhaseBreakdown::default();
    for a in &analyzed {
        phases.opening += a.phases.opening;
        phases.discovery += a.phases.discovery;
        phases.objection += a.phases.objection;
        phases.argument += a.phases.argument;
        phases.closing += a.phases.closing;
        phases.silence += a.phases.silence;
    }
    let phase_distribution = normalize_phases(&phases);

    ScopeStats {
        total,
        analyzed: n,
        conversion_rate,
        avg_duration,
        skills,
        avg_confidence,
        avg_objections,
        phase_distribution,
        top_loss_moments: top_loss_moments(records, top_n),
    }
}

/// Aggregate a seller's conversations into summary statistics.
pub fn aggregate_seller(
    seller_id: &str,
    records: &[ConversationMetric],
    top_n: usize,
) -> SellerAggregate {
    let stats = scope_stats(records, top_n);
    SellerAggregate {
        seller_id: seller_id.to_string(),
        total_conversations: stats.total,
        analyzed_conversations: stats.analyzed,
        has_data: stats.analyzed > 0,
        conversion_rate: stats.conversion_rate,
        avg_duration_minutes: stats.avg_duration,
        skills: stats.skills,
        avg_confidence: stats.avg_confidence,
        avg_objections: stats.avg_objections,
        phase_distribution: stats.phase_distribution,
        top_loss_moments: stats.top_loss_moments,
    }
}

/// Aggregate a branch's conversations into summary statistics.
pub fn aggregate_branch(
    branch_id: &str,
    records: &[ConversationMetric],
    top_n: usize,
) -> BranchAggregate {
    let stats = scope_stats(records, top_n);

    // Per-seller scores: each seller contributes the mean of their analyzed
    // records' skill means. Sellers without analysis are excluded.
    let mut per_seller: HashMap<&str, (f64, i64)> = HashMap::new();
    for record in records {
        if let Some(analysis) = &record.analysis {
            let record_score = (analysis.skills.talk_ratio
                + analysis.skills.active_listening
                + analysis.skills.objection_handling
                + analysis.skills.closing_rhythm
                + analysis.skills.empathy)
                / 5.0;
            let entry = per_seller.entry(record.seller_id.as_str()).or_insert((0.0, 0));
            entry.0 += record_score;
            entry.1 += 1;
        }
    }
    let seller_scores: Vec<f64> = per_seller
        .values()
        .map(|(sum, count)| sum / *count as f64)
        .collect();
    let avg_seller_score = mean(seller_scores.iter().copied());

    let seller_count = records
        .iter()
        .map(|r| r.seller_id.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len() as i64;

    BranchAggregate {
        branch_id: branch_id.to_string(),
        total_conversations: stats.total,
        analyzed_conversations: stats.analyzed,
        has_data: stats.analyzed > 0,
        conversion_rate: stats.conversion_rate,
        avg_duration_minutes: stats.avg_duration,
        skills: stats.skills,
        avg_confidence: stats.avg_confidence,
        avg_objections: stats.avg_objections,
        phase_distribution: stats.phase_distribution,
        top_loss_moments: stats.top_loss_moments,
        seller_count,
        avg_seller_score,
    }
}

// ── Internals ────────────────────────────────────────────────────────────────

/// Arithmetic mean over however many values exist; 0.0 for none.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0i64;
    for v in values {
        sum += v;
        count += 1;
    }
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

/// Group loss-moment phrases by exact text, rank by frequency.
fn top_loss_moments(records: &[ConversationMetric], top_n: usize) -> Vec<LossMomentSummary> {
    let mut grouped: HashMap<&str, (i64, f64)> = HashMap::new();
    for record in records {
        if let Some(moment) = record.analysis.as_ref().and_then(|a| a.loss_moment.as_ref()) {
            let entry = grouped.entry(moment.phrase.as_str()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += moment.abandonment_minute;
        }
    }

    let mut summaries: Vec<LossMomentSummary> = grouped
        .into_iter()
        .map(|(phrase, (count, minute_sum))| LossMomentSummary {
            phrase: phrase.to_string(),
            occurrences: count,
            avg_abandonment_minute: minute_sum / count as f64,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| {
                b.avg_abandonment_minute
                    .partial_cmp(&a.avg_abandonment_minute)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.phrase.cmp(&b.phrase))
    });
    summaries.truncate(top_n);
    summaries
}
