//! `workflow_versions` table. Rows are only ever inserted.

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{models::WorkflowVersionRow, DbError};

/// Fails with a unique violation if `(workflow_id, version)` already exists.
pub async fn insert_version<'e>(
    executor: impl PgExecutor<'e>,
    row: &WorkflowVersionRow,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_versions
            (workflow_id, version, nodes, edges, created_at, created_by, comment)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(row.workflow_id)
    .bind(row.version)
    .bind(&row.nodes)
    .bind(&row.edges)
    .bind(row.created_at)
    .bind(&row.created_by)
    .bind(&row.comment)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_versions(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<WorkflowVersionRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowVersionRow>(
        r#"
        SELECT workflow_id, version, nodes, edges, created_at, created_by, comment
        FROM workflow_versions
        WHERE workflow_id = $1
        ORDER BY version ASC
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_version(
    pool: &PgPool,
    workflow_id: Uuid,
    version: i32,
) -> Result<Option<WorkflowVersionRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowVersionRow>(
        r#"
        SELECT workflow_id, version, nodes, edges, created_at, created_by, comment
        FROM workflow_versions
        WHERE workflow_id = $1 AND version = $2
        "#,
    )
    .bind(workflow_id)
    .bind(version)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
