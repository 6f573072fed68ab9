/// Database abstraction layer
///
/// Pages, their check history and owner contacts live in a local LibSQL
/// database accessed through a connection pool.

pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{CheckResult, MonitoredPage, Region};
pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
