use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 3;

/// Run database migrations
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Pages and check results").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Owner contact directory").await?;
    }

    if current_version < 3 {
        run_migration_v3(conn).await?;
        record_migration(conn, 3, "One page per owner and URL").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitored pages and their check history
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            url TEXT NOT NULL,
            check_interval_minutes INTEGER NOT NULL DEFAULT 5,
            alert_threshold INTEGER NOT NULL DEFAULT 3,
            notifications_enabled INTEGER NOT NULL DEFAULT 0,
            screenshot_enabled INTEGER NOT NULL DEFAULT 0,
            change_notifications_enabled INTEGER NOT NULL DEFAULT 0,
            region_left REAL NOT NULL DEFAULT 0.0,
            region_top REAL NOT NULL DEFAULT 0.0,
            region_width REAL NOT NULL DEFAULT 1.0,
            region_height REAL NOT NULL DEFAULT 1.0,
            is_pinned INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    // checked_at is stored in milliseconds so rapid checks still order correctly
    conn.execute(
        "CREATE TABLE IF NOT EXISTS check_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            page_id INTEGER NOT NULL,
            checked_at INTEGER NOT NULL,
            status_code INTEGER,
            response_time_ms REAL NOT NULL DEFAULT 0,
            is_up INTEGER NOT NULL DEFAULT 0,
            message TEXT NOT NULL DEFAULT '',
            screenshot_path TEXT NOT NULL DEFAULT '',
            crop_path TEXT NOT NULL DEFAULT '',
            diff_path TEXT NOT NULL DEFAULT '',
            diff_score REAL,
            FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_pages_owner ON pages(owner_id)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_check_results_page_checked ON check_results(page_id, checked_at DESC)",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: contact addresses used for alert delivery
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS owners (
            owner_id TEXT PRIMARY KEY,
            email TEXT NOT NULL DEFAULT '',
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v3: an owner monitors each URL at most once
async fn run_migration_v3(conn: &Connection) -> Result<()> {
    // Keep the oldest page of any duplicate group; newer copies go with their history
    conn.execute(
        "DELETE FROM pages WHERE id NOT IN (SELECT MIN(id) FROM pages GROUP BY owner_id, url)",
        (),
    )
    .await?;
    conn.execute("CREATE UNIQUE INDEX IF NOT EXISTS idx_pages_owner_url ON pages(owner_id, url)", ()).await?;

    Ok(())
}
