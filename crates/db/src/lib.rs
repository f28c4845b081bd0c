//! `db` crate — Postgres persistence for the automation engine.
//!
//! Provides a connection pool, typed row structs, repository functions for
//! every table in the schema, and the [`PgStore`] / [`PgResumeQueue`]
//! adapters the engine runs against in production.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use pool::{create_pool, run_migrations, DbPool};
pub use store::{PgResumeQueue, PgStore};
