//! Connection pool and the embedded schema.

use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Shared Postgres pool; cheap to clone.
pub type DbPool = PgPool;

/// Every file under the workspace `migrations/` directory, compiled in.
static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    info!(max_connections, "postgres pool ready");
    Ok(pool)
}

/// Bring the schema up to date. Returns the number of migrations the
/// binary ships with.
pub async fn run_migrations(pool: &DbPool) -> Result<usize, DbError> {
    MIGRATOR.run(pool).await?;
    let known = MIGRATOR.iter().count();
    info!(known, "schema is up to date");
    Ok(known)
}
