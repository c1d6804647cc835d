//! Database schema management for `healthpulse-backend`.
//!
//! Ensures the long-term memory tables exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::SqlitePool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `sessions` table for finalized analysis sessions,
/// `user_patterns` for derived per-user patterns (one row per user and
/// pattern type), and `health_trends` for per-metric trend history. Safe to
/// call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Finalized sessions, keyed by session id (last write wins)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id        TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL,
            timestamp         TEXT NOT NULL,
            data_summary      TEXT NOT NULL,
            analysis_results  TEXT NOT NULL,
            wellness_score    REAL NOT NULL,
            recommendations   TEXT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Long-term behavioural patterns, upserted per (user_id, pattern_type)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_patterns (
            user_id       TEXT NOT NULL,
            pattern_type  TEXT NOT NULL,
            pattern_data  TEXT NOT NULL,
            confidence    REAL NOT NULL,
            last_updated  TEXT NOT NULL,
            PRIMARY KEY (user_id, pattern_type)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Per-metric trend observations recorded at finalize time
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS health_trends (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id          TEXT NOT NULL,
            session_id       TEXT NOT NULL,
            metric_name      TEXT NOT NULL,
            trend_direction  TEXT NOT NULL,
            change_rate      REAL NOT NULL,
            period_days      INTEGER NOT NULL,
            recorded_at      TEXT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sessions_user_time
            ON sessions (user_id, timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
