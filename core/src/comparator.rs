//! Sale vs. no-sale contrast summaries.
//!
//! RULES:
//!   - Both code paths produce the same output shape; callers never need
//!     to know which one executed. The `estimated` flag only labels the
//!     heuristic path so "no data" stays distinguishable in the UI.
//!   - The advanced path splits each aggregate mean by a named, configured
//!     delta. The fallback path first estimates the means from the coarse
//!     seller-score / conversion-rate aggregate, then applies the same split.

use crate::{
    aggregator::{BranchAggregate, SellerAggregate},
    config::{ComparisonOffsets, EstimateModel},
};
use serde::{Deserialize, Serialize};

// ── Public types ─────────────────────────────────────────────────────────────

/// One side of the contrast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSide {
    pub duration_minutes: f64,
    pub vendor_talk_ratio: f64,
    pub objection_count: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaleComparison {
    pub with_sale: ComparisonSide,
    pub without_sale: ComparisonSide,
    /// True when the values came from the coarse heuristic path.
    pub estimated: bool,
}

/// The subset of aggregate fields the comparator reads. Both aggregate
/// flavors can be compared without the comparator knowing which it got.
#[derive(Debug, Clone, Copy)]
pub struct ComparisonInputs {
    pub has_data: bool,
    pub avg_duration_minutes: f64,
    pub avg_talk_ratio: f64,
    pub avg_objections: f64,
    pub avg_confidence: f64,
    pub seller_score: f64,
    pub conversion_rate: f64,
}

impl SellerAggregate {
    pub fn comparison_inputs(&self) -> ComparisonInputs {
        ComparisonInputs {
            has_data: self.has_data,
            avg_duration_minutes: self.avg_duration_minutes,
            avg_talk_ratio: self.skills.talk_ratio,
            avg_objections: self.avg_objections,
            avg_confidence: self.avg_confidence,
            seller_score: self.skills.overall(),
            conversion_rate: self.conversion_rate,
        }
    }
}

impl BranchAggregate {
    pub fn comparison_inputs(&self) -> ComparisonInputs {
        ComparisonInputs {
            has_data: self.has_data,
            avg_duration_minutes: self.avg_duration_minutes,
            avg_talk_ratio: self.skills.talk_ratio,
            avg_objections: self.avg_objections,
            avg_confidence: self.avg_confidence,
            seller_score: self.avg_seller_score,
            conversion_rate: self.conversion_rate,
        }
    }
}

// ── Comparison ───────────────────────────────────────────────────────────────

/// Produce the two-sided with-sale / without-sale summary for a scope.
pub fn compare(
    inputs: &ComparisonInputs,
    offsets: &ComparisonOffsets,
    estimate: &EstimateModel,
) -> SaleComparison {
    if inputs.has_data {
        SaleComparison {
            with_sale: side(inputs, offsets, 0.5),
            without_sale: side(inputs, offsets, -0.5),
            estimated: false,
        }
    } else {
        let estimated_means = estimate_means(inputs, estimate);
        SaleComparison {
            with_sale: side(&estimated_means, offsets, 0.5),
            without_sale: side(&estimated_means, offsets, -0.5),
            estimated: true,
        }
    }
}

/// Build one side by shifting every mean half a delta in `direction`.
fn side(inputs: &ComparisonInputs, offsets: &ComparisonOffsets, direction: f64) -> ComparisonSide {
    ComparisonSide {
        duration_minutes: (inputs.avg_duration_minutes
            + offsets.duration_delta_minutes * direction)
            .max(0.0),
        vendor_talk_ratio: clamp_pct(inputs.avg_talk_ratio + offsets.talk_ratio_delta * direction),
        objection_count: (inputs.avg_objections + offsets.objection_delta * direction).max(0.0),
        confidence: clamp_pct(inputs.avg_confidence + offsets.confidence_delta * direction),
    }
}

/// Heuristic means for scopes without advanced analytics: duration scales
/// with seller score, talk ratio drops as conversion rate rises.
fn estimate_means(inputs: &ComparisonInputs, model: &EstimateModel) -> ComparisonInputs {
    ComparisonInputs {
        has_data: false,
        avg_duration_minutes: model.base_duration_minutes
            + model.duration_minutes_per_score_point * inputs.seller_score,
        avg_talk_ratio: clamp_pct(
            model.base_talk_ratio
                - model.talk_ratio_drop_per_conversion_point * inputs.conversion_rate,
        ),
        avg_objections: model.base_objection_count,
        avg_confidence: clamp_pct(
            model.base_confidence + model.confidence_per_conversion_point * inputs.conversion_rate,
        ),
        seller_score: inputs.seller_score,
        conversion_rate: inputs.conversion_rate,
    }
}

fn clamp_pct(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}
