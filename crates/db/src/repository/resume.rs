//! Resume queue repository functions.
//!
//! The durable timer is backed by the `resume_queue` table, one row per
//! suspended execution. Workers claim due rows with
//! `SELECT … FOR UPDATE SKIP LOCKED` so several of them can poll safely.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ResumeRow, DbError};

/// Insert or move the wake-up for an execution.
pub async fn schedule(pool: &PgPool, row: &ResumeRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO resume_queue (execution_id, workflow_id, resume_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (execution_id)
        DO UPDATE SET workflow_id = EXCLUDED.workflow_id, resume_at = EXCLUDED.resume_at
        "#,
    )
    .bind(row.execution_id)
    .bind(row.workflow_id)
    .bind(row.resume_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomically claim and delete up to `limit` rows due at `now`, earliest first.
pub async fn take_due(pool: &PgPool, now: DateTime<Utc>, limit: i64) -> Result<Vec<ResumeRow>, DbError> {
    let mut tx = pool.begin().await?;

    let mut rows = sqlx::query_as::<_, ResumeRow>(
        r#"
        DELETE FROM resume_queue
        WHERE execution_id IN (
            SELECT execution_id
            FROM resume_queue
            WHERE resume_at <= $1
            ORDER BY resume_at ASC, execution_id ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        RETURNING execution_id, workflow_id, resume_at
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    rows.sort_by_key(|r| (r.resume_at, r.execution_id));
    Ok(rows)
}

pub async fn remove(pool: &PgPool, execution_id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM resume_queue WHERE execution_id = $1")
        .bind(execution_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count(pool: &PgPool) -> Result<i64, DbError> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resume_queue")
        .fetch_one(pool)
        .await?;
    Ok(n)
}
