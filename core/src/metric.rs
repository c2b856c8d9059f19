//! Core data model — one scored conversation per record.
//!
//! RULES:
//!   - A record is created once by the upstream analyzer pipeline and is
//!     immutable afterwards, except for whole-payload analysis replacement
//!     by the batch job controller.
//!   - `analysis == None` means "not yet analyzed", never "scored zero".

use crate::types::{BranchId, ConversationId, SellerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Outcome ──────────────────────────────────────────────────────────────────

/// Closed enumeration of sale outcomes as classified upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Confirmed,
    Likely,
    AdvancedNoClose,
    NoSale,
    Uninterpretable,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Confirmed => "confirmed",
            SaleStatus::Likely => "likely",
            SaleStatus::AdvancedNoClose => "advanced_no_close",
            SaleStatus::NoSale => "no_sale",
            SaleStatus::Uninterpretable => "uninterpretable",
        }
    }

    /// Parse a stored status string. Unknown values degrade to
    /// `Uninterpretable` rather than erroring (data-absence policy).
    pub fn parse(s: &str) -> SaleStatus {
        match s {
            "confirmed" => SaleStatus::Confirmed,
            "likely" => SaleStatus::Likely,
            "advanced_no_close" => SaleStatus::AdvancedNoClose,
            "no_sale" => SaleStatus::NoSale,
            _ => SaleStatus::Uninterpretable,
        }
    }
}

// ── Phase breakdown ──────────────────────────────────────────────────────────

/// Raw, unnormalized time/turn allocation across the six call phases.
/// Unit is arbitrary (seconds, turns) and the weights need not sum to
/// any particular total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseBreakdown {
    pub opening: f64,
    pub discovery: f64,
    pub objection: f64,
    pub argument: f64,
    pub closing: f64,
    pub silence: f64,
}

impl PhaseBreakdown {
    /// Fixed enumeration order. The normalizer's tie-break depends on it;
    /// never reorder.
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.opening,
            self.discovery,
            self.objection,
            self.argument,
            self.closing,
            self.silence,
        ]
    }
}

/// Exact-100 percentage distribution produced by the normalizer.
/// All zeros means "no data", not "zero time everywhere".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDistribution {
    pub opening: u32,
    pub discovery: u32,
    pub objection: u32,
    pub argument: u32,
    pub closing: u32,
    pub silence: u32,
}

impl PhaseDistribution {
    pub fn from_array(values: [u32; 6]) -> Self {
        Self {
            opening: values[0],
            discovery: values[1],
            objection: values[2],
            argument: values[3],
            closing: values[4],
            silence: values[5],
        }
    }

    pub fn as_array(&self) -> [u32; 6] {
        [
            self.opening,
            self.discovery,
            self.objection,
            self.argument,
            self.closing,
            self.silence,
        ]
    }

    pub fn total(&self) -> u32 {
        self.as_array().iter().sum()
    }
}

// ── Analysis payload ─────────────────────────────────────────────────────────

/// Five independent 0–100 vendor soft-skill scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftSkills {
    pub talk_ratio: f64,
    pub active_listening: f64,
    pub objection_handling: f64,
    pub closing_rhythm: f64,
    pub empathy: f64,
}

/// Objection classification counts for one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectionCounts {
    pub explicit: u32,
    pub implicit: u32,
    pub unanswered: u32,
    pub ineffective: u32,
}

impl ObjectionCounts {
    pub fn total(&self) -> u32 {
        self.explicit + self.implicit + self.unanswered + self.ineffective
    }
}

/// The phrase most associated with call abandonment, and when it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossMoment {
    pub phrase: String,
    /// Minutes into the call, ≥ 0.
    pub abandonment_minute: f64,
}

/// Everything the upstream AI derives for a single conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub phases: PhaseBreakdown,
    pub skills: SoftSkills,
    /// Customer engagement/trust estimate, 0–100.
    pub confidence: f64,
    pub objections: ObjectionCounts,
    pub loss_moment: Option<LossMoment>,
}

// ── Record ───────────────────────────────────────────────────────────────────

/// One scored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetric {
    pub conversation_id: ConversationId,
    pub seller_id: SellerId,
    pub branch_id: BranchId,
    pub recorded_at: DateTime<Utc>,
    pub duration_minutes: f64,
    pub sale_completed: bool,
    pub sale_status: SaleStatus,
    pub analysis: Option<ConversationAnalysis>,
}

impl ConversationMetric {
    pub fn has_analysis(&self) -> bool {
        self.analysis.is_some()
    }
}
