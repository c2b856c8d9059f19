//! calldesk-core — conversation analytics aggregation & recommendation engine.
//!
//! DATA FLOW (fixed, documented):
//!   MetricStore → aggregator → { normalizer, comparator } → recommendation
//!
//! RULES:
//!   - The aggregator, normalizer, recommendation engine, and comparator are
//!     pure, read-only functions over the record snapshot they are handed.
//!   - The batch job controller is the only component that mutates the store.
//!   - Missing data degrades to documented fallback outputs; it never errors.

pub mod aggregator;
pub mod comparator;
pub mod config;
pub mod error;
pub mod job;
pub mod metric;
pub mod normalizer;
pub mod recommendation;
pub mod store;
pub mod types;
