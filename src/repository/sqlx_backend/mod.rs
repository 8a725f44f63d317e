//! Postgres-backed implementation of every repository trait (spec §4.6).
//!
//! Queries are issued with the runtime-checked `query`/`query_as` API
//! rather than the `query!` macros, since the macros require a live
//! database reachable at compile time. Every row type derives
//! `sqlx::FromRow` and maps 1:1 onto its `crate::model` counterpart.

mod doc_cache;
mod feedback;
mod project;
mod scheduled_task;
mod session;
mod sse_buffer;
mod task;
mod usage;

use sqlx::PgPool;

/// Shared connection pool wrapper every `*Repository` impl is built on.
#[derive(Clone)]
pub struct PgBackend {
    pub(crate) pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded schema migration, creating every table this
    /// backend expects if it does not already exist. Intended for local
    /// development and the integration-test harness; production
    /// deployments are expected to run migrations out of band.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(include_str!("schema.sql")).execute(&self.pool).await?;
        Ok(())
    }
}
