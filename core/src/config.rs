//! Analytics configuration — thresholds, comparison offsets, estimate model.
//!
//! RULES:
//!   - Every tunable number in the decision chains and the comparator lives
//!     here. Nothing downstream inlines a magic constant.
//!   - Out-of-range thresholds are a programming error: `validate()` fails
//!     fast instead of letting a bad chain run.

use crate::error::{AnalyticsError, AnalyticsResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Minimum acceptable averages for the recommendation chains.
/// Skill and confidence thresholds are 0–100 scores; `conversion_rate_min`
/// is a percentage of closed conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationThresholds {
    pub closing_rhythm_min: f64,
    pub objection_handling_min: f64,
    pub active_listening_min: f64,
    pub empathy_min: f64,
    pub conversion_rate_min: f64,
    pub seller_score_min: f64,
    pub confidence_min: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            closing_rhythm_min: 40.0,
            objection_handling_min: 50.0,
            active_listening_min: 50.0,
            empathy_min: 45.0,
            conversion_rate_min: 30.0,
            seller_score_min: 50.0,
            confidence_min: 50.0,
        }
    }
}

/// Conversion-rate cut-offs for the no-advanced-data fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackTiers {
    /// Below this conversion percentage the seller needs accompaniment.
    pub accompaniment_below: f64,
    /// Below this (and above the previous tier) closing work is reinforced.
    pub reinforce_closing_below: f64,
}

impl Default for FallbackTiers {
    fn default() -> Self {
        Self {
            accompaniment_below: 25.0,
            reinforce_closing_below: 40.0,
        }
    }
}

/// Fixed with-sale vs. without-sale deltas applied around the aggregate
/// mean on the advanced comparator path. Values reproduce the empirically
/// observed contrasts; whether they are calibration or placeholder
/// heuristics is an open question recorded in DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonOffsets {
    /// Confidence points separating won from lost calls.
    pub confidence_delta: f64,
    /// Talk-ratio points; negative — sellers talk less on won calls.
    pub talk_ratio_delta: f64,
    /// Minutes; won calls run longer.
    pub duration_delta_minutes: f64,
    /// Objection count; negative — won calls see fewer objections.
    pub objection_delta: f64,
}

impl Default for ComparisonOffsets {
    fn default() -> Self {
        Self {
            confidence_delta: 15.0,
            talk_ratio_delta: -10.0,
            duration_delta_minutes: 6.0,
            objection_delta: -2.0,
        }
    }
}

/// Linear scaling used by the comparator when no advanced per-conversation
/// analytics exist for the scope. Duration scales with seller score;
/// talk ratio scales inversely with conversion rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimateModel {
    pub base_duration_minutes: f64,
    pub duration_minutes_per_score_point: f64,
    pub base_talk_ratio: f64,
    pub talk_ratio_drop_per_conversion_point: f64,
    pub base_objection_count: f64,
    pub base_confidence: f64,
    pub confidence_per_conversion_point: f64,
}

impl Default for EstimateModel {
    fn default() -> Self {
        Self {
            base_duration_minutes: 18.0,
            duration_minutes_per_score_point: 0.12,
            base_talk_ratio: 65.0,
            talk_ratio_drop_per_conversion_point: 0.35,
            base_objection_count: 3.0,
            base_confidence: 55.0,
            confidence_per_conversion_point: 0.4,
        }
    }
}

/// Top-level configuration for the analytics core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub thresholds: RecommendationThresholds,
    pub fallback_tiers: FallbackTiers,
    pub comparison: ComparisonOffsets,
    pub estimate: EstimateModel,
    /// How many loss-moment phrases an aggregate reports.
    pub top_loss_moments: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            thresholds: RecommendationThresholds::default(),
            fallback_tiers: FallbackTiers::default(),
            comparison: ComparisonOffsets::default(),
            estimate: EstimateModel::default(),
            top_loss_moments: 3,
        }
    }
}

impl AnalyticsConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AnalyticsResult<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            AnalyticsError::InvalidConfig(format!(
                "cannot open {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: AnalyticsConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on thresholds outside their valid ranges.
    pub fn validate(&self) -> AnalyticsResult<()> {
        let t = &self.thresholds;
        let checks: [(&'static str, f64); 7] = [
            ("closing_rhythm_min", t.closing_rhythm_min),
            ("objection_handling_min", t.objection_handling_min),
            ("active_listening_min", t.active_listening_min),
            ("empathy_min", t.empathy_min),
            ("conversion_rate_min", t.conversion_rate_min),
            ("seller_score_min", t.seller_score_min),
            ("confidence_min", t.confidence_min),
        ];
        for (name, value) in checks {
            if !(0.0..=100.0).contains(&value) || !value.is_finite() {
                return Err(AnalyticsError::InvalidThreshold {
                    name,
                    value,
                    min: 0.0,
                    max: 100.0,
                });
            }
        }

        let tiers = &self.fallback_tiers;
        if tiers.accompaniment_below >= tiers.reinforce_closing_below {
            return Err(AnalyticsError::InvalidConfig(format!(
                "fallback tiers out of order: accompaniment_below ({}) must be \
                 below reinforce_closing_below ({})",
                tiers.accompaniment_below, tiers.reinforce_closing_below
            )));
        }

        if self.top_loss_moments == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "top_loss_moments must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Defaults tuned for tests and the demo runner.
    pub fn default_for_tests() -> Self {
        Self::default()
    }
}
