//! SQLite persistence layer for conversation metrics.
//!
//! RULE: Only store.rs talks to the database.
//! Everything else calls store methods — never SQL directly.

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    metric::{
        ConversationAnalysis, ConversationMetric, LossMoment, ObjectionCounts, PhaseBreakdown,
        SaleStatus, SoftSkills,
    },
    types::ConversationId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

pub struct MetricStore {
    conn: Connection,
}

impl MetricStore {
    pub fn open(path: &str) -> AnalyticsResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AnalyticsResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AnalyticsResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Writes ─────────────────────────────────────────────────

    /// Insert a conversation record, analysis included when present.
    pub fn insert_conversation(&self, metric: &ConversationMetric) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO conversation_metric
                 (conversation_id, seller_id, branch_id, recorded_at,
                  duration_minutes, sale_completed, sale_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                metric.conversation_id,
                metric.seller_id,
                metric.branch_id,
                metric.recorded_at.to_rfc3339(),
                metric.duration_minutes,
                metric.sale_completed as i64,
                metric.sale_status.as_str(),
            ],
        )?;
        if let Some(analysis) = &metric.analysis {
            self.replace_analysis(&metric.conversation_id, analysis, metric.recorded_at)?;
        }
        Ok(())
    }

    /// Replace the whole analysis payload for one conversation. A re-run
    /// never patches individual fields.
    pub fn replace_analysis(
        &self,
        conversation_id: &str,
        analysis: &ConversationAnalysis,
        analyzed_at: DateTime<Utc>,
    ) -> AnalyticsResult<()> {
        let changed = self.conn.execute(
            "UPDATE conversation_metric SET
                 phase_opening = ?2, phase_discovery = ?3, phase_objection = ?4,
                 phase_argument = ?5, phase_closing = ?6, phase_silence = ?7,
                 talk_ratio = ?8, active_listening = ?9, objection_handling = ?10,
                 closing_rhythm = ?11, empathy = ?12, confidence = ?13,
                 objections_explicit = ?14, objections_implicit = ?15,
                 objections_unanswered = ?16, objections_ineffective = ?17,
                 loss_phrase = ?18, abandonment_minute = ?19, analyzed_at = ?20
             WHERE conversation_id = ?1",
            params![
                conversation_id,
                analysis.phases.opening,
                analysis.phases.discovery,
                analysis.phases.objection,
                analysis.phases.argument,
                analysis.phases.closing,
                analysis.phases.silence,
                analysis.skills.talk_ratio,
                analysis.skills.active_listening,
                analysis.skills.objection_handling,
                analysis.skills.closing_rhythm,
                analysis.skills.empathy,
                analysis.confidence,
                analysis.objections.explicit as i64,
                analysis.objections.implicit as i64,
                analysis.objections.unanswered as i64,
                analysis.objections.ineffective as i64,
                analysis.loss_moment.as_ref().map(|m| m.phrase.as_str()),
                analysis.loss_moment.as_ref().map(|m| m.abandonment_minute),
                analyzed_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(AnalyticsError::ConversationNotFound {
                id: conversation_id.to_string(),
            });
        }
        Ok(())
    }

    /// Destructive: null every analysis field, leaving raw conversation
    /// data intact. Returns the number of rows cleared.
    pub fn clear_analyses(&self) -> AnalyticsResult<i64> {
        let changed = self.conn.execute(
            "UPDATE conversation_metric SET
                 phase_opening = NULL, phase_discovery = NULL, phase_objection = NULL,
                 phase_argument = NULL, phase_closing = NULL, phase_silence = NULL,
                 talk_ratio = NULL, active_listening = NULL, objection_handling = NULL,
                 closing_rhythm = NULL, empathy = NULL, confidence = NULL,
                 objections_explicit = NULL, objections_implicit = NULL,
                 objections_unanswered = NULL, objections_ineffective = NULL,
                 loss_phrase = NULL, abandonment_minute = NULL, analyzed_at = NULL
             WHERE confidence IS NOT NULL",
            [],
        )?;
        Ok(changed as i64)
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn conversation(&self, conversation_id: &str) -> AnalyticsResult<ConversationMetric> {
        let mut stmt = self.conn.prepare(&select_sql("WHERE conversation_id = ?1"))?;
        let metric = stmt
            .query_row(params![conversation_id], row_to_metric)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => AnalyticsError::ConversationNotFound {
                    id: conversation_id.to_string(),
                },
                other => AnalyticsError::Database(other),
            })?;
        Ok(metric)
    }

    pub fn conversations_for_seller(
        &self,
        seller_id: &str,
    ) -> AnalyticsResult<Vec<ConversationMetric>> {
        self.query_metrics("WHERE seller_id = ?1 ORDER BY recorded_at ASC", seller_id)
    }

    pub fn conversations_for_branch(
        &self,
        branch_id: &str,
    ) -> AnalyticsResult<Vec<ConversationMetric>> {
        self.query_metrics("WHERE branch_id = ?1 ORDER BY recorded_at ASC", branch_id)
    }

    /// Ids of conversations with no analysis payload, in stable order.
    pub fn unanalyzed_ids(&self) -> AnalyticsResult<Vec<ConversationId>> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id FROM conversation_metric
             WHERE confidence IS NULL ORDER BY recorded_at ASC, conversation_id ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// All conversation ids, in stable order.
    pub fn all_ids(&self) -> AnalyticsResult<Vec<ConversationId>> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id FROM conversation_metric
             ORDER BY recorded_at ASC, conversation_id ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn missing_count(&self) -> AnalyticsResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM conversation_metric WHERE confidence IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn conversation_count(&self) -> AnalyticsResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM conversation_metric", [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    pub fn seller_ids(&self) -> AnalyticsResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT seller_id FROM conversation_metric ORDER BY seller_id ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn branch_ids(&self) -> AnalyticsResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT branch_id FROM conversation_metric ORDER BY branch_id ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn query_metrics(
        &self,
        filter: &str,
        param: &str,
    ) -> AnalyticsResult<Vec<ConversationMetric>> {
        let mut stmt = self.conn.prepare(&select_sql(filter))?;
        let metrics = stmt
            .query_map(params![param], row_to_metric)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(metrics)
    }
}

// ── Row mapping ────────────────────────────────────────────────

const SELECT_COLUMNS: &str = "conversation_id, seller_id, branch_id, recorded_at, \
     duration_minutes, sale_completed, sale_status, \
     phase_opening, phase_discovery, phase_objection, phase_argument, \
     phase_closing, phase_silence, \
     talk_ratio, active_listening, objection_handling, closing_rhythm, empathy, \
     confidence, objections_explicit, objections_implicit, objections_unanswered, \
     objections_ineffective, loss_phrase, abandonment_minute";

fn select_sql(filter: &str) -> String {
    format!("SELECT {SELECT_COLUMNS} FROM conversation_metric {filter}")
}

fn row_to_metric(row: &Row<'_>) -> rusqlite::Result<ConversationMetric> {
    let recorded_at_raw: String = row.get(3)?;
    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let sale_status_raw: String = row.get(6)?;

    // `confidence IS NOT NULL` is the canonical has-analysis flag; the
    // remaining payload columns are written together with it.
    let confidence: Option<f64> = row.get(18)?;
    let analysis = match confidence {
        None => None,
        Some(confidence) => {
            let loss_phrase: Option<String> = row.get(23)?;
            let abandonment_minute: Option<f64> = row.get(24)?;
            let loss_moment = loss_phrase.map(|phrase| LossMoment {
                phrase,
                abandonment_minute: abandonment_minute.unwrap_or(0.0),
            });
            Some(ConversationAnalysis {
                phases: PhaseBreakdown {
                    opening: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                    discovery: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
                    objection: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
                    argument: row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
                    closing: row.get::<_, Option<f64>>(11)?.unwrap_or(0.0),
                    silence: row.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
                },
                skills: SoftSkills {
                    talk_ratio: row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
                    active_listening: row.get::<_, Option<f64>>(14)?.unwrap_or(0.0),
                    objection_handling: row.get::<_, Option<f64>>(15)?.unwrap_or(0.0),
                    closing_rhythm: row.get::<_, Option<f64>>(16)?.unwrap_or(0.0),
                    empathy: row.get::<_, Option<f64>>(17)?.unwrap_or(0.0),
                },
                confidence,
                objections: ObjectionCounts {
                    explicit: row.get::<_, Option<i64>>(19)?.unwrap_or(0) as u32,
                    implicit: row.get::<_, Option<i64>>(20)?.unwrap_or(0) as u32,
                    unanswered: row.get::<_, Option<i64>>(21)?.unwrap_or(0) as u32,
                    ineffective: row.get::<_, Option<i64>>(22)?.unwrap_or(0) as u32,
                },
                loss_moment,
            })
        }
    };

    Ok(ConversationMetric {
        conversation_id: row.get(0)?,
        seller_id: row.get(1)?,
        branch_id: row.get(2)?,
        recorded_at,
        duration_minutes: row.get(4)?,
        sale_completed: row.get::<_, i64>(5)? != 0,
        sale_status: SaleStatus::parse(&sale_status_raw),
        analysis,
    })
}
