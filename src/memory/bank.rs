use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::Session;
use crate::analysis::ROLLING_WINDOW_DAYS;

// ---

/// A derived behavioural summary, one per `(user_id, pattern_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPattern {
    // ---
    pub user_id: String,
    pub pattern_type: String,
    pub pattern_data: serde_json::Value,
    pub confidence: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    user_id: String,
    timestamp: String,
    data_summary: String,
    analysis_results: String,
    wellness_score: f64,
    recommendations: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = anyhow::Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        // ---
        Ok(Session {
            timestamp: parse_time(&row.timestamp)?,
            data_summary: serde_json::from_str(&row.data_summary)
                .with_context(|| format!("corrupt data_summary for {}", row.session_id))?,
            analysis_results: serde_json::from_str(&row.analysis_results)
                .with_context(|| format!("corrupt analysis_results for {}", row.session_id))?,
            recommendations: serde_json::from_str(&row.recommendations)
                .with_context(|| format!("corrupt recommendations for {}", row.session_id))?,
            wellness_score: row.wellness_score,
            user_id: row.user_id,
            session_id: row.session_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PatternRow {
    user_id: String,
    pattern_type: String,
    pattern_data: String,
    confidence: f64,
    last_updated: String,
}

impl TryFrom<PatternRow> for UserPattern {
    type Error = anyhow::Error;

    fn try_from(row: PatternRow) -> Result<Self> {
        Ok(UserPattern {
            pattern_data: serde_json::from_str(&row.pattern_data)?,
            last_updated: parse_time(&row.last_updated)?,
            user_id: row.user_id,
            pattern_type: row.pattern_type,
            confidence: row.confidence,
        })
    }
}

/// Fixed-width UTC timestamps so text comparison in SQL matches time order.
fn format_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    // ---
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("invalid stored timestamp '{text}'"))?
        .with_timezone(&Utc))
}

/// Durable long-term storage for finalized sessions and user patterns.
#[derive(Debug, Clone)]
pub struct MemoryBank {
    pool: SqlitePool,
}

impl MemoryBank {
    // ---
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace by session id. The session row and its trend rows
    /// are written in one transaction, so a failure leaves neither behind.
    pub async fn store_session(&self, session: &Session) -> Result<()> {
        // ---
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sessions (
                session_id, user_id, timestamp,
                data_summary, analysis_results, wellness_score, recommendations
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.user_id)
        .bind(format_time(session.timestamp))
        .bind(serde_json::to_string(&session.data_summary)?)
        .bind(serde_json::to_string(&session.analysis_results)?)
        .bind(session.wellness_score)
        .bind(serde_json::to_string(&session.recommendations)?)
        .execute(&mut *tx)
        .await?;

        replace_trends(&mut tx, session).await?;
        tx.commit().await?;

        debug!(session_id = %session.session_id, "session persisted");
        Ok(())
    }

    /// Sessions for `user_id` at or after `since`, newest first.
    pub async fn get_history(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<Session>> {
        // ---
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, user_id, timestamp,
                   data_summary, analysis_results, wellness_score, recommendations
            FROM sessions
            WHERE user_id = ?1 AND timestamp >= ?2
            ORDER BY timestamp DESC
            "#,
        )
        .bind(user_id)
        .bind(format_time(since))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Session::try_from).collect()
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[cfg(test)]
    pub async fn trend_count(&self, user_id: &str) -> Result<i64> {
        // ---
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM health_trends WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Last write wins per `(user_id, pattern_type)`.
    pub async fn upsert_pattern(&self, pattern: &UserPattern) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO user_patterns (user_id, pattern_type, pattern_data, confidence, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (user_id, pattern_type) DO UPDATE SET
                pattern_data = excluded.pattern_data,
                confidence   = excluded.confidence,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&pattern.user_id)
        .bind(&pattern.pattern_type)
        .bind(serde_json::to_string(&pattern.pattern_data)?)
        .bind(pattern.confidence)
        .bind(format_time(pattern.last_updated))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_patterns(&self, user_id: &str) -> Result<Vec<UserPattern>> {
        // ---
        let rows: Vec<PatternRow> = sqlx::query_as(
            r#"
            SELECT user_id, pattern_type, pattern_data, confidence, last_updated
            FROM user_patterns
            WHERE user_id = ?1
            ORDER BY pattern_type
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserPattern::try_from).collect()
    }
}

/// Replace the trend rows recorded for this session.
async fn replace_trends(conn: &mut SqliteConnection, session: &Session) -> Result<()> {
    // ---
    sqlx::query("DELETE FROM health_trends WHERE session_id = ?1")
        .bind(&session.session_id)
        .execute(&mut *conn)
        .await?;

    let recorded_at = format_time(session.timestamp);
    for (metric, trend) in &session.analysis_results.trends {
        sqlx::query(
            r#"
            INSERT INTO health_trends (
                user_id, session_id, metric_name, trend_direction,
                change_rate, period_days, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&session.user_id)
        .bind(&session.session_id)
        .bind(metric.as_str())
        .bind(trend.direction.as_str())
        .bind(trend.change_percent)
        .bind(ROLLING_WINDOW_DAYS)
        .bind(&recorded_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
