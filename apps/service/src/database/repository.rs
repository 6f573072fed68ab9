use anyhow::Result;
use async_trait::async_trait;
use libsql::{Row, params};

use super::models::{
    CheckResult, MonitoredPage, Region, millis_to_timestamp, timestamp_to_millis,
};
use crate::monitoring::types::PendingCheck;
use crate::pool::LibsqlPool;

const PAGE_COLUMNS: &str = "id, owner_id, url, check_interval_minutes, alert_threshold, \
     notifications_enabled, screenshot_enabled, change_notifications_enabled, region_left, \
     region_top, region_width, region_height, is_pinned, created_at";

const RESULT_COLUMNS: &str = "id, page_id, checked_at, status_code, response_time_ms, is_up, \
     message, screenshot_path, crop_path, diff_path, diff_score";

/// Database trait for abstracting database operations
#[async_trait]
pub trait Database: Send + Sync {
    /// Get all monitored pages
    async fn list_pages(&self) -> Result<Vec<MonitoredPage>>;

    /// Get a page by id
    async fn get_page(&self, id: i64) -> Result<Option<MonitoredPage>>;

    /// An owner's page for an exact URL
    async fn find_page(&self, owner_id: &str, url: &str) -> Result<Option<MonitoredPage>>;

    /// Insert a new page, returning its id
    async fn insert_page(&self, page: &MonitoredPage) -> Result<i64>;

    /// Persist the mutable settings of an existing page
    async fn update_page(&self, page: &MonitoredPage) -> Result<()>;

    /// Delete a page and its check history
    async fn delete_page(&self, id: i64) -> Result<()>;

    /// Persist a check, returning the stored row
    async fn save_result(&self, check: &PendingCheck) -> Result<CheckResult>;

    /// Get a single check result
    async fn get_result(&self, id: i64) -> Result<Option<CheckResult>>;

    /// Most recent check of a page
    async fn latest_result(&self, page_id: i64) -> Result<Option<CheckResult>>;

    /// Most recent check of a page other than `exclude_id`
    async fn previous_result(&self, page_id: i64, exclude_id: i64) -> Result<Option<CheckResult>>;

    /// Newest-first check history
    async fn recent_results(&self, page_id: i64, limit: usize) -> Result<Vec<CheckResult>>;

    /// Every check of a page, newest first
    async fn all_results(&self, page_id: i64) -> Result<Vec<CheckResult>>;

    /// Checks that still reference a full screenshot, newest first
    async fn results_with_screenshots(&self, page_id: i64) -> Result<Vec<CheckResult>>;

    /// Clear the artifact paths of a check, keeping the row and its score
    async fn clear_artifacts(&self, result_id: i64) -> Result<()>;

    /// Number of trailing down checks, counting back from the newest
    async fn consecutive_failures(&self, page_id: i64) -> Result<u32>;

    /// Contact address of a page owner
    async fn owner_email(&self, owner_id: &str) -> Result<Option<String>>;

    /// Set the contact address of a page owner
    async fn set_owner_email(&self, owner_id: &str, email: &str) -> Result<()>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_results(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<CheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(row_to_result(&row)?);
        }
        Ok(results)
    }

    async fn query_one_result(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Option<CheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_result(&row)?)),
            None => Ok(None),
        }
    }
}

fn flag(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

fn row_to_page(row: &Row) -> Result<MonitoredPage> {
    Ok(MonitoredPage {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        url: row.get(2)?,
        check_interval_minutes: row.get::<i64>(3)? as u32,
        alert_threshold: row.get::<i64>(4)?.max(0) as u32,
        notifications_enabled: row.get::<i64>(5)? != 0,
        screenshot_enabled: row.get::<i64>(6)? != 0,
        change_notifications_enabled: row.get::<i64>(7)? != 0,
        region: Region {
            left: row.get(8)?,
            top: row.get(9)?,
            width: row.get(10)?,
            height: row.get(11)?,
        },
        is_pinned: row.get::<i64>(12)? != 0,
        created_at: millis_to_timestamp(row.get(13)?),
    })
}

fn row_to_result(row: &Row) -> Result<CheckResult> {
    Ok(CheckResult {
        id: row.get(0)?,
        page_id: row.get(1)?,
        checked_at: millis_to_timestamp(row.get(2)?),
        status_code: row.get::<Option<i64>>(3)?.map(|v| v as u16),
        response_time_ms: row.get(4)?,
        is_up: row.get::<i64>(5)? != 0,
        message: row.get(6)?,
        screenshot_path: row.get(7)?,
        crop_path: row.get(8)?,
        diff_path: row.get(9)?,
        diff_score: row.get(10)?,
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn list_pages(&self) -> Result<Vec<MonitoredPage>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages ORDER BY id");
        let mut rows = conn.query(&sql, ()).await?;
        let mut pages = Vec::new();

        while let Some(row) = rows.next().await? {
            pages.push(row_to_page(&row)?);
        }

        Ok(pages)
    }

    async fn get_page(&self, id: i64) -> Result<Option<MonitoredPage>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?");
        let mut rows = conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_page(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_page(&self, owner_id: &str, url: &str) -> Result<Option<MonitoredPage>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE owner_id = ? AND url = ?");
        let mut rows = conn.query(&sql, params![owner_id, url]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_page(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_page(&self, page: &MonitoredPage) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO pages (owner_id, url, check_interval_minutes, alert_threshold, notifications_enabled, screenshot_enabled, change_notifications_enabled, region_left, region_top, region_width, region_height, is_pinned, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                page.owner_id.clone(),
                page.url.clone(),
                page.check_interval_minutes as i64,
                page.alert_threshold as i64,
                flag(page.notifications_enabled),
                flag(page.screenshot_enabled),
                flag(page.change_notifications_enabled),
                page.region.left,
                page.region.top,
                page.region.width,
                page.region.height,
                flag(page.is_pinned),
                timestamp_to_millis(page.created_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn update_page(&self, page: &MonitoredPage) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE pages SET url = ?, check_interval_minutes = ?, alert_threshold = ?, notifications_enabled = ?, screenshot_enabled = ?, change_notifications_enabled = ?, region_left = ?, region_top = ?, region_width = ?, region_height = ?, is_pinned = ? WHERE id = ?",
            params![
                page.url.clone(),
                page.check_interval_minutes as i64,
                page.alert_threshold as i64,
                flag(page.notifications_enabled),
                flag(page.screenshot_enabled),
                flag(page.change_notifications_enabled),
                page.region.left,
                page.region.top,
                page.region.width,
                page.region.height,
                flag(page.is_pinned),
                page.id
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_page(&self, id: i64) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute("DELETE FROM check_results WHERE page_id = ?", params![id]).await?;
        conn.execute("DELETE FROM pages WHERE id = ?", params![id]).await?;
        Ok(())
    }

    async fn save_result(&self, check: &PendingCheck) -> Result<CheckResult> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO check_results (page_id, checked_at, status_code, response_time_ms, is_up, message, screenshot_path, crop_path, diff_path, diff_score) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                check.page_id,
                timestamp_to_millis(check.checked_at),
                check.status_code.map(|v| v as i64),
                check.response_time_ms,
                flag(check.is_up),
                check.message.clone(),
                check.screenshot_path.clone(),
                check.crop_path.clone(),
                check.diff_path.clone(),
                check.diff_score
            ],
        )
        .await?;

        Ok(check.clone().into_result(conn.last_insert_rowid()))
    }

    async fn get_result(&self, id: i64) -> Result<Option<CheckResult>> {
        let sql = format!("SELECT {RESULT_COLUMNS} FROM check_results WHERE id = ?");
        self.query_one_result(&sql, params![id]).await
    }

    async fn latest_result(&self, page_id: i64) -> Result<Option<CheckResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM check_results WHERE page_id = ? ORDER BY checked_at DESC, id DESC LIMIT 1"
        );
        self.query_one_result(&sql, params![page_id]).await
    }

    async fn previous_result(&self, page_id: i64, exclude_id: i64) -> Result<Option<CheckResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM check_results WHERE page_id = ? AND id != ? ORDER BY checked_at DESC, id DESC LIMIT 1"
        );
        self.query_one_result(&sql, params![page_id, exclude_id]).await
    }

    async fn recent_results(&self, page_id: i64, limit: usize) -> Result<Vec<CheckResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM check_results WHERE page_id = ? ORDER BY checked_at DESC, id DESC LIMIT ?"
        );
        self.query_results(&sql, params![page_id, limit as i64]).await
    }

    async fn all_results(&self, page_id: i64) -> Result<Vec<CheckResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM check_results WHERE page_id = ? ORDER BY checked_at DESC, id DESC"
        );
        self.query_results(&sql, params![page_id]).await
    }

    async fn results_with_screenshots(&self, page_id: i64) -> Result<Vec<CheckResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM check_results WHERE page_id = ? AND screenshot_path != '' ORDER BY checked_at DESC, id DESC"
        );
        self.query_results(&sql, params![page_id]).await
    }

    async fn clear_artifacts(&self, result_id: i64) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE check_results SET screenshot_path = '', crop_path = '', diff_path = '' WHERE id = ?",
            params![result_id],
        )
        .await?;
        Ok(())
    }

    async fn consecutive_failures(&self, page_id: i64) -> Result<u32> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT is_up FROM check_results WHERE page_id = ? ORDER BY checked_at DESC, id DESC",
                params![page_id],
            )
            .await?;

        let mut count = 0;
        while let Some(row) = rows.next().await? {
            if row.get::<i64>(0)? != 0 {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    async fn owner_email(&self, owner_id: &str) -> Result<Option<String>> {
        let conn = self.get_conn().await?;
        let mut rows =
            conn.query("SELECT email FROM owners WHERE owner_id = ?", params![owner_id]).await?;

        match rows.next().await? {
            Some(row) => {
                let email: String = row.get(0)?;
                Ok(Some(email).filter(|e| !e.trim().is_empty()))
            }
            None => Ok(None),
        }
    }

    async fn set_owner_email(&self, owner_id: &str, email: &str) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO owners (owner_id, email, updated_at) VALUES (?, ?, ?) ON CONFLICT(owner_id) DO UPDATE SET email = excluded.email, updated_at = excluded.updated_at",
            params![owner_id, email, chrono::Utc::now().timestamp()],
        )
        .await?;
        Ok(())
    }
}
