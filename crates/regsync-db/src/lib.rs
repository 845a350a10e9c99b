//! Regsync Source Layer
//!
//! Read access to the curated, approval-filtered SQLite views that feed the
//! graph backfill, plus the reference review schema that defines them.

pub mod migrations;
pub mod pool;
pub mod queries;

pub use pool::{DbError, DbResult, SourcePool, SourceRow};
pub use queries::views::{count_view, distinct_values, fetch_view, view_exists};

/// Open the source database at `path` and bring its schema up to date.
pub fn init_pool(path: &str) -> DbResult<SourcePool> {
    let pool = SourcePool::open(path)?;
    migrations::run_migrations(&pool)?;
    Ok(pool)
}
