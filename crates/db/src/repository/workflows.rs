//! `workflows` table.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

const COLUMNS: &str =
    "id, name, folder_id, nodes, edges, published, version, created_at, updated_at";

pub async fn insert_workflow<'e>(
    executor: impl PgExecutor<'e>,
    row: &WorkflowRow,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflows
            (id, name, folder_id, nodes, edges, published, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(row.folder_id)
    .bind(&row.nodes)
    .bind(&row.edges)
    .bind(row.published)
    .bind(row.version)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Overwrite the draft graph and version pointer. Returns rows affected.
pub async fn update_draft<'e>(
    executor: impl PgExecutor<'e>,
    row: &WorkflowRow,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET name = $2, folder_id = $3, nodes = $4, edges = $5, version = $6, updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(row.folder_id)
    .bind(&row.nodes)
    .bind(&row.edges)
    .bind(row.version)
    .bind(row.updated_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn set_published(
    pool: &PgPool,
    workflow_id: Uuid,
    published: bool,
    at: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query("UPDATE workflows SET published = $2, updated_at = $3 WHERE id = $1")
        .bind(workflow_id)
        .bind(published)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn get_workflow(pool: &PgPool, workflow_id: Uuid) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {COLUMNS} FROM workflows WHERE id = $1"
    ))
    .bind(workflow_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {COLUMNS} FROM workflows ORDER BY created_at ASC, id ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
