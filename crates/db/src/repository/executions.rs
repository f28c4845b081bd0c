//! Execution and execution-log repository functions.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{ExecutionLogRow, ExecutionRow},
    DbError,
};

const COLUMNS: &str = "id, workflow_id, status, started_at, completed_at, trigger_type, \
                       trigger_data, bound_version, context, suspension";

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

pub async fn insert_execution(pool: &PgPool, row: &ExecutionRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_executions
            (id, workflow_id, status, started_at, completed_at, trigger_type,
             trigger_data, bound_version, context, suspension)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(row.id)
    .bind(row.workflow_id)
    .bind(&row.status)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(&row.trigger_type)
    .bind(&row.trigger_data)
    .bind(row.bound_version)
    .bind(&row.context)
    .bind(&row.suspension)
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite the mutable state of an execution. Returns rows affected.
pub async fn update_execution(pool: &PgPool, row: &ExecutionRow) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $2, completed_at = $3, context = $4, suspension = $5
        WHERE id = $1
        "#,
    )
    .bind(row.id)
    .bind(&row.status)
    .bind(row.completed_at)
    .bind(&row.context)
    .bind(&row.suspension)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn get_execution(pool: &PgPool, execution_id: Uuid) -> Result<Option<ExecutionRow>, DbError> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_executions WHERE id = $1"
    ))
    .bind(execution_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_for_workflow(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<ExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_executions WHERE workflow_id = $1 ORDER BY started_at ASC, id ASC"
    ))
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_by_status(pool: &PgPool, status: &str) -> Result<Vec<ExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_executions WHERE status = $1 ORDER BY started_at ASC, id ASC"
    ))
    .bind(status)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// execution_logs
// ---------------------------------------------------------------------------

pub async fn append_log(pool: &PgPool, row: &ExecutionLogRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO execution_logs (execution_id, logged_at, node_id, level, message, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(row.execution_id)
    .bind(row.logged_at)
    .bind(&row.node_id)
    .bind(&row.level)
    .bind(&row.message)
    .bind(&row.data)
    .execute(pool)
    .await?;
    Ok(())
}

/// Logs for every execution in `execution_ids`, in append order.
pub async fn logs_for(pool: &PgPool, execution_ids: &[Uuid]) -> Result<Vec<ExecutionLogRow>, DbError> {
    let rows = sqlx::query_as::<_, ExecutionLogRow>(
        r#"
        SELECT execution_id, logged_at, node_id, level, message, data
        FROM execution_logs
        WHERE execution_id = ANY($1)
        ORDER BY id ASC
        "#,
    )
    .bind(execution_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
