//! Recommendation engine — ordered, deterministic coaching rules.
//!
//! RULES:
//!   - Chains evaluate top-down; the first matching rule wins and later
//!     rules are never considered.
//!   - Every high/medium-priority message embeds the concrete metric value
//!     that fired it. No vague statements.
//!   - Missing data never errors: a scope without advanced analysis routes
//!     to the conversion-only fallback chain.
//!   - Same aggregate + same thresholds ⇒ byte-identical output.

use crate::{
    aggregator::{BranchAggregate, LossMomentSummary, SellerAggregate},
    config::AnalyticsConfig,
};
use serde::{Deserialize, Serialize};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// View-only value object; generated fresh on every pass, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub subject: String,
    pub message: String,
    pub priority: Priority,
}

// ── Seller chain ─────────────────────────────────────────────────────────────

/// Evaluate the seller rule chain against one aggregate.
pub fn recommend_seller(agg: &SellerAggregate, config: &AnalyticsConfig) -> Recommendation {
    if !agg.has_data {
        return conversion_fallback(&agg.seller_id, agg.conversion_rate, config);
    }

    let t = &config.thresholds;
    let subject = agg.seller_id.clone();

    if agg.skills.closing_rhythm < t.closing_rhythm_min {
        return Recommendation {
            subject,
            message: format!(
                "Closing rhythm averages {:.0} (minimum {:.0}). Run close-timing \
                 drills: rehearse asking for the sale inside the final third of the call.",
                agg.skills.closing_rhythm, t.closing_rhythm_min
            ),
            priority: Priority::High,
        };
    }

    if agg.skills.objection_handling < t.objection_handling_min {
        return Recommendation {
            subject,
            message: format!(
                "Objection handling averages {:.0} (minimum {:.0}). Rehearse the \
                 three most frequent objections with prepared counter-arguments.",
                agg.skills.objection_handling, t.objection_handling_min
            ),
            priority: Priority::High,
        };
    }

    if agg.skills.active_listening < t.active_listening_min {
        return Recommendation {
            subject,
            message: format!(
                "Active listening averages {:.0} (minimum {:.0}). Coach paraphrase \
                 checks: restate the customer's need before presenting an offer.",
                agg.skills.active_listening, t.active_listening_min
            ),
            priority: Priority::High,
        };
    }

    if agg.skills.empathy < t.empathy_min {
        return Recommendation {
            subject,
            message: format!(
                "Empathy averages {:.0} (minimum {:.0}). Add acknowledgement \
                 phrases to the call guide and review one recording per week.",
                agg.skills.empathy, t.empathy_min
            ),
            priority: Priority::Medium,
        };
    }

    if agg.conversion_rate < t.conversion_rate_min {
        return conversion_retention(
            subject,
            agg.conversion_rate,
            t.conversion_rate_min,
            agg.top_loss_moments.first(),
        );
    }

    // No weakness found: highlight the strongest skill and push upsells.
    // Fixed tie order: listening, objection handling, closing, empathy.
    let candidates = [
        ("active listening", agg.skills.active_listening),
        ("objection handling", agg.skills.objection_handling),
        ("closing rhythm", agg.skills.closing_rhythm),
        ("empathy", agg.skills.empathy),
    ];
    let mut best = candidates[0];
    for c in &candidates[1..] {
        if c.1 > best.1 {
            best = *c;
        }
    }
    Recommendation {
        subject,
        message: format!(
            "No weak spot found. Strongest skill is {} at {:.0}; lean on it to \
             place upsell offers before the close.",
            best.0, best.1
        ),
        priority: Priority::Low,
    }
}

// ── Branch chain ─────────────────────────────────────────────────────────────

/// Evaluate the branch rule chain. Same first-match-wins design as the
/// seller chain, with the confidence check inserted before conversion and
/// the seller-score check after it.
pub fn recommend_branch(agg: &BranchAggregate, config: &AnalyticsConfig) -> Recommendation {
    if !agg.has_data {
        return conversion_fallback(&agg.branch_id, agg.conversion_rate, config);
    }

    let t = &config.thresholds;
    let subject = agg.branch_id.clone();

    if agg.skills.closing_rhythm < t.closing_rhythm_min {
        return Recommendation {
            subject,
            message: format!(
                "Branch closing rhythm averages {:.0} (minimum {:.0}). Schedule a \
                 close-timing workshop across the team.",
                agg.skills.closing_rhythm, t.closing_rhythm_min
            ),
            priority: Priority::High,
        };
    }

    if agg.skills.objection_handling < t.objection_handling_min {
        return Recommendation {
            subject,
            message: format!(
                "Branch objection handling averages {:.0} (minimum {:.0}). Build a \
                 shared objection playbook from the branch's recorded calls.",
                agg.skills.objection_handling, t.objection_handling_min
            ),
            priority: Priority::High,
        };
    }

    if agg.skills.active_listening < t.active_listening_min {
        return Recommendation {
            subject,
            message: format!(
                "Branch active listening averages {:.0} (minimum {:.0}). Pair the \
                 strongest listeners with the weakest for shadowing sessions.",
                agg.skills.active_listening, t.active_listening_min
            ),
            priority: Priority::High,
        };
    }

    if agg.skills.empathy < t.empathy_min {
        return Recommendation {
            subject,
            message: format!(
                "Branch empathy averages {:.0} (minimum {:.0}). Review tone and \
                 acknowledgement phrases in the weekly team huddle.",
                agg.skills.empathy, t.empathy_min
            ),
            priority: Priority::Medium,
        };
    }

    if agg.avg_confidence < t.confidence_min {
        return Recommendation {
            subject,
            message: format!(
                "Customer confidence averages {:.0} (minimum {:.0}). Audit openings \
                 branch-wide: low early trust drags every later phase.",
                agg.avg_confidence, t.confidence_min
            ),
            priority: Priority::High,
        };
    }

    if agg.conversion_rate < t.conversion_rate_min {
        return conversion_retention(
            subject,
            agg.conversion_rate,
            t.conversion_rate_min,
            agg.top_loss_moments.first(),
        );
    }

    if agg.avg_seller_score < t.seller_score_min {
        return Recommendation {
            subject,
            message: format!(
                "Average seller score is {:.0} (minimum {:.0}). Results hold up, but \
                 the skill base is thin; plan individual coaching tracks.",
                agg.avg_seller_score, t.seller_score_min
            ),
            priority: Priority::Medium,
        };
    }

    let candidates = [
        ("active listening", agg.skills.active_listening),
        ("objection handling", agg.skills.objection_handling),
        ("closing rhythm", agg.skills.closing_rhythm),
        ("empathy", agg.skills.empathy),
    ];
    let mut best = candidates[0];
    for c in &candidates[1..] {
        if c.1 > best.1 {
            best = *c;
        }
    }
    Recommendation {
        subject,
        message: format!(
            "No weak spot found. Branch-wide {} averages {:.0}; use it to push \
             cross-sell offers before the close.",
            best.0, best.1
        ),
        priority: Priority::Low,
    }
}

// ── Shared rules ─────────────────────────────────────────────────────────────

/// Conversion-below-threshold rule: cite the literal top loss phrase and
/// its mean abandonment minute when one exists for the scope.
fn conversion_retention(
    subject: String,
    conversion_rate: f64,
    threshold: f64,
    top_loss: Option<&LossMomentSummary>,
) -> Recommendation {
    let message = match top_loss {
        Some(moment) => format!(
            "Conversion rate is {:.0}% (minimum {:.0}%). Calls are most often lost \
             around minute {:.1} after \"{}\" — script a recovery for that exact moment.",
            conversion_rate, threshold, moment.avg_abandonment_minute, moment.phrase
        ),
        None => format!(
            "Conversion rate is {:.0}% (minimum {:.0}%). Review lost calls for a \
             common drop-off point and tighten the mid-call retention script.",
            conversion_rate, threshold
        ),
    };
    Recommendation {
        subject,
        message,
        priority: Priority::Medium,
    }
}

/// Three-tier chain keyed only on conversion rate, used when the scope has
/// no advanced per-conversation analysis.
fn conversion_fallback(
    subject: &str,
    conversion_rate: f64,
    config: &AnalyticsConfig,
) -> Recommendation {
    let tiers = &config.fallback_tiers;
    if conversion_rate < tiers.accompaniment_below {
        Recommendation {
            subject: subject.to_string(),
            message: format!(
                "Conversion rate is {:.0}% with no call analysis available. Needs \
                 accompaniment: pair with a senior seller and run the analysis batch.",
                conversion_rate
            ),
            priority: Priority::High,
        }
    } else if conversion_rate < tiers.reinforce_closing_below {
        Recommendation {
            subject: subject.to_string(),
            message: format!(
                "Conversion rate is {:.0}% with no call analysis available. \
                 Reinforce closing technique and schedule a full analysis pass.",
                conversion_rate
            ),
            priority: Priority::Medium,
        }
    } else {
        Recommendation {
            subject: subject.to_string(),
            message: format!(
                "Conversion rate is {:.0}% with no call analysis available. \
                 Maintain the current approach and explore cross-sell openings.",
                conversion_rate
            ),
            priority: Priority::Low,
        }
    }
}
