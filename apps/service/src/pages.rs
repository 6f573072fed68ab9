//! Owner-facing page operations.
//!
//! The HTTP layer that authenticates owners lives outside this crate; it calls
//! into `PageService` with the already verified owner id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::capture::ScreenshotCapturer;
use crate::database::{CheckResult, Database, MonitoredPage, Region};
use crate::monitoring::validation::{
    validate_alert_threshold, validate_check_interval, validate_page_url, validate_region,
};
use crate::monitoring::{CheckError, CheckExecutor};
use crate::storage::path::{content_type, normalize, page_id_of, thumb_path};
use crate::storage::{ArtifactStore, Delivery, StoreError};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("page {0} not found")]
    NotFound(i64),

    #[error("check {0} not found")]
    CheckNotFound(i64),

    #[error("access denied")]
    Forbidden,

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for PageError {
    fn from(e: anyhow::Error) -> Self {
        PageError::Database(e.to_string())
    }
}

fn invalid(e: anyhow::Error) -> PageError {
    PageError::Invalid(e.to_string())
}

/// Partial settings change; absent fields stay as they are
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub url: Option<String>,
    pub check_interval_minutes: Option<u32>,
    pub alert_threshold: Option<u32>,
    pub notifications_enabled: Option<bool>,
    pub screenshot_enabled: Option<bool>,
    pub change_notifications_enabled: Option<bool>,
    pub region: Option<Region>,
    pub is_pinned: Option<bool>,
}

impl SettingsUpdate {
    /// Validate every provided field, then apply all of them
    pub fn apply(&self, page: &mut MonitoredPage) -> Result<(), PageError> {
        if let Some(url) = &self.url {
            validate_page_url(url).map_err(invalid)?;
        }
        if let Some(minutes) = self.check_interval_minutes {
            validate_check_interval(minutes).map_err(invalid)?;
        }
        if let Some(threshold) = self.alert_threshold {
            validate_alert_threshold(threshold).map_err(invalid)?;
        }
        if let Some(region) = &self.region {
            validate_region(region).map_err(invalid)?;
        }

        if let Some(url) = &self.url {
            page.url = url.clone();
        }
        if let Some(minutes) = self.check_interval_minutes {
            page.check_interval_minutes = minutes;
        }
        if let Some(threshold) = self.alert_threshold {
            page.alert_threshold = threshold;
        }
        if let Some(flag) = self.notifications_enabled {
            page.notifications_enabled = flag;
        }
        if let Some(flag) = self.screenshot_enabled {
            page.screenshot_enabled = flag;
        }
        if let Some(flag) = self.change_notifications_enabled {
            page.change_notifications_enabled = flag;
        }
        if let Some(region) = self.region {
            page.region = region;
        }
        if let Some(flag) = self.is_pinned {
            page.is_pinned = flag;
        }
        Ok(())
    }
}

/// A check as shown to its owner. URLs are set only for artifacts that exist.
#[derive(Debug, Clone, Serialize)]
pub struct CheckView {
    pub id: i64,
    pub checked_at: DateTime<Utc>,
    pub status_code: Option<u16>,
    pub response_time_ms: f64,
    pub is_up: bool,
    pub message: String,
    pub diff_score: Option<f64>,
    pub screenshot_url: Option<String>,
    pub crop_url: Option<String>,
    pub diff_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Outcome of registering a page
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub page: MonitoredPage,
    /// False when the owner already monitored this URL
    pub created: bool,
    /// The forced first check, run only for new pages
    pub first_check: Option<CheckResult>,
}

/// What the artifact endpoint sends back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactResponse {
    Bytes { data: Vec<u8>, content_type: &'static str },
    Redirect(String),
}

pub struct PageService {
    database: Arc<dyn Database>,
    store: Arc<dyn ArtifactStore>,
    executor: Arc<CheckExecutor>,
    capturer: Arc<ScreenshotCapturer>,
}

impl PageService {
    pub fn new(
        database: Arc<dyn Database>,
        store: Arc<dyn ArtifactStore>,
        executor: Arc<CheckExecutor>,
        capturer: Arc<ScreenshotCapturer>,
    ) -> Self {
        Self { database, store, executor, capturer }
    }

    /// Register a page and run its first check with a screenshot.
    ///
    /// Registering a URL the owner already monitors returns the existing page
    /// without checking it again.
    pub async fn register(&self, owner_id: &str, url: &str) -> Result<Registration, PageError> {
        let url = url.trim();
        validate_page_url(url).map_err(invalid)?;

        if let Some(page) = self.database.find_page(owner_id, url).await? {
            debug!("Page {} ({}) already registered for {}", page.id, page.url, owner_id);
            return Ok(Registration { page, created: false, first_check: None });
        }

        let mut page = MonitoredPage::new(owner_id, url);
        page.id = self.database.insert_page(&page).await?;
        info!("Registered page {} ({}) for {}", page.id, page.url, owner_id);

        let result = self.executor.run_check(&page, true).await?;
        Ok(Registration { page, created: true, first_check: Some(result) })
    }

    /// Pages of an owner, pinned first
    pub async fn pages(&self, owner_id: &str) -> Result<Vec<MonitoredPage>, PageError> {
        let mut pages: Vec<_> =
            self.database.list_pages().await?.into_iter().filter(|page| page.owner_id == owner_id).collect();
        pages.sort_by(|a, b| b.is_pinned.cmp(&a.is_pinned).then(b.created_at.cmp(&a.created_at)));
        Ok(pages)
    }

    pub async fn owned_page(&self, owner_id: &str, page_id: i64) -> Result<MonitoredPage, PageError> {
        let page = self.database.get_page(page_id).await?.ok_or(PageError::NotFound(page_id))?;
        if page.owner_id != owner_id {
            return Err(PageError::Forbidden);
        }
        Ok(page)
    }

    pub async fn recheck(&self, owner_id: &str, page_id: i64) -> Result<CheckResult, PageError> {
        let page = self.owned_page(owner_id, page_id).await?;
        Ok(self.executor.run_check(&page, false).await?)
    }

    pub async fn update_settings(
        &self,
        owner_id: &str,
        page_id: i64,
        update: &SettingsUpdate,
    ) -> Result<MonitoredPage, PageError> {
        let mut page = self.owned_page(owner_id, page_id).await?;
        update.apply(&mut page)?;
        if let Some(other) = self.database.find_page(owner_id, &page.url).await?.filter(|other| other.id != page.id) {
            return Err(PageError::Invalid(format!("{} is already monitored as page {}", page.url, other.id)));
        }
        self.database.update_page(&page).await?;
        Ok(page)
    }

    async fn url_if_exists(&self, path: &str) -> Option<String> {
        if path.is_empty() || !self.store.exists(path).await {
            return None;
        }
        Some(self.store.url(path).await).filter(|url| !url.is_empty())
    }

    async fn view(&self, result: CheckResult) -> CheckView {
        let screenshot_url = self.url_if_exists(&result.screenshot_path).await;
        let thumbnail_url = match &screenshot_url {
            Some(_) => match self.capturer.ensure_thumbnail(&result.screenshot_path).await {
                Some(thumb) => self.url_if_exists(&thumb).await,
                None => None,
            },
            None => None,
        };

        CheckView {
            id: result.id,
            checked_at: result.checked_at,
            status_code: result.status_code,
            response_time_ms: result.response_time_ms,
            is_up: result.is_up,
            crop_url: self.url_if_exists(&result.crop_path).await,
            diff_url: self.url_if_exists(&result.diff_path).await,
            screenshot_url,
            thumbnail_url,
            message: result.message,
            diff_score: result.diff_score,
        }
    }

    /// Newest-first history
    pub async fn history(&self, owner_id: &str, page_id: i64, limit: usize) -> Result<Vec<CheckView>, PageError> {
        self.owned_page(owner_id, page_id).await?;
        let results = self.database.recent_results(page_id, limit).await?;

        let mut views = Vec::with_capacity(results.len());
        for result in results {
            views.push(self.view(result).await);
        }
        Ok(views)
    }

    pub async fn check_detail(&self, owner_id: &str, page_id: i64, check_id: i64) -> Result<CheckView, PageError> {
        self.owned_page(owner_id, page_id).await?;
        let result = self
            .database
            .get_result(check_id)
            .await?
            .filter(|result| result.page_id == page_id)
            .ok_or(PageError::CheckNotFound(check_id))?;
        Ok(self.view(result).await)
    }

    /// Delete every artifact of the page, then the page and its history
    pub async fn delete_page(&self, owner_id: &str, page_id: i64) -> Result<(), PageError> {
        let page = self.owned_page(owner_id, page_id).await?;

        let mut files = BTreeSet::new();
        for result in self.database.all_results(page.id).await? {
            for path in [&result.screenshot_path, &result.crop_path, &result.diff_path] {
                if !path.is_empty() {
                    files.insert(path.clone());
                }
            }
            if result.has_screenshot() {
                files.insert(thumb_path(&result.screenshot_path));
            }
        }
        for file in &files {
            self.store.delete(file).await;
        }

        self.database.delete_page(page.id).await?;
        info!("Deleted page {} ({}) and {} artifacts", page.id, page.url, files.len());
        Ok(())
    }

    /// Serve an artifact to the owner of the page it belongs to
    pub async fn fetch_artifact(&self, owner_id: &str, path: &str) -> Result<ArtifactResponse, PageError> {
        let path = normalize(path)?;
        let page_id = page_id_of(&path).ok_or_else(|| PageError::Invalid(format!("no page id in '{path}'")))?;
        self.owned_page(owner_id, page_id).await?;

        match self.store.delivery() {
            Delivery::Redirect => {
                if !self.store.exists(&path).await {
                    return Err(StoreError::NotFound(path).into());
                }
                let url = self.store.url(&path).await;
                if url.is_empty() {
                    return Err(StoreError::NotFound(path).into());
                }
                Ok(ArtifactResponse::Redirect(url))
            }
            Delivery::Proxy => {
                let data = self.store.read(&path).await?;
                Ok(ArtifactResponse::Bytes { data, content_type: content_type(&path) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHarness;

    #[tokio::test]
    async fn test_register_captures_screenshot() {
        let harness = TestHarness::new().await.unwrap();
        let registration = harness.pages.register("alice", "https://example.com").await.unwrap();
        assert!(registration.created);
        let (page, result) = (registration.page, registration.first_check.unwrap());

        assert!(page.id > 0);
        assert!(!page.screenshot_enabled);
        assert!(result.is_up);
        assert!(result.has_screenshot());
        assert!(!harness.store.read(&result.screenshot_path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_same_url_returns_existing_page() {
        let harness = TestHarness::new().await.unwrap();
        let first = harness.pages.register("alice", "https://example.com").await.unwrap();
        let again = harness.pages.register("alice", " https://example.com ").await.unwrap();

        assert!(!again.created);
        assert!(again.first_check.is_none());
        assert_eq!(again.page.id, first.page.id);
        assert_eq!(harness.pages.pages("alice").await.unwrap().len(), 1);
        assert_eq!(harness.database.all_results(first.page.id).await.unwrap().len(), 1);

        // Another owner gets a page of their own
        let other = harness.pages.register("bob", "https://example.com").await.unwrap();
        assert!(other.created);
        assert_ne!(other.page.id, first.page.id);
    }

    #[tokio::test]
    async fn test_update_settings_rejects_duplicate_url() {
        let harness = TestHarness::new().await.unwrap();
        harness.pages.register("alice", "https://a.example.com").await.unwrap();
        let second = harness.pages.register("alice", "https://b.example.com").await.unwrap();

        let update = SettingsUpdate { url: Some("https://a.example.com".to_string()), ..SettingsUpdate::default() };
        assert!(matches!(
            harness.pages.update_settings("alice", second.page.id, &update).await,
            Err(PageError::Invalid(_))
        ));
        let stored = harness.database.get_page(second.page.id).await.unwrap().unwrap();
        assert_eq!(stored.url, "https://b.example.com");
    }

    #[tokio::test]
    async fn test_register_rejects_bad_url() {
        let harness = TestHarness::new().await.unwrap();
        assert!(matches!(harness.pages.register("alice", "not a url").await, Err(PageError::Invalid(_))));
        assert!(harness.database.list_pages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_settings_validates() {
        let harness = TestHarness::new().await.unwrap();
        let page = harness.pages.register("alice", "https://example.com").await.unwrap().page;

        let update = SettingsUpdate {
            check_interval_minutes: Some(15),
            screenshot_enabled: Some(true),
            region: Some(Region { left: 0.0, top: 0.0, width: 0.5, height: 0.5 }),
            ..SettingsUpdate::default()
        };
        let updated = harness.pages.update_settings("alice", page.id, &update).await.unwrap();
        assert_eq!(updated.check_interval_minutes, 15);
        assert!(updated.screenshot_enabled);

        let bad = SettingsUpdate { alert_threshold: Some(11), check_interval_minutes: Some(30), ..SettingsUpdate::default() };
        assert!(matches!(harness.pages.update_settings("alice", page.id, &bad).await, Err(PageError::Invalid(_))));
        // Nothing from a rejected update is applied
        let stored = harness.database.get_page(page.id).await.unwrap().unwrap();
        assert_eq!(stored.check_interval_minutes, 15);

        assert!(matches!(
            harness.pages.update_settings("mallory", page.id, &update).await,
            Err(PageError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_history_urls_only_for_existing_artifacts() {
        let harness = TestHarness::new().await.unwrap();
        let registration = harness.pages.register("alice", "https://example.com").await.unwrap();
        let (page, result) = (registration.page, registration.first_check.unwrap());

        let history = harness.pages.history("alice", page.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        let view = &history[0];
        assert_eq!(view.screenshot_url.as_deref(), Some(format!("/api/screenshots/{}", result.screenshot_path).as_str()));
        assert!(view.thumbnail_url.is_some());
        assert!(view.diff_url.is_none());

        harness.store.delete(&result.screenshot_path).await;
        let detail = harness.pages.check_detail("alice", page.id, result.id).await.unwrap();
        assert!(detail.screenshot_url.is_none());

        assert!(matches!(
            harness.pages.check_detail("alice", page.id, result.id + 100).await,
            Err(PageError::CheckNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_page_removes_artifacts() {
        let harness = TestHarness::new().await.unwrap();
        let registration = harness.pages.register("alice", "https://example.com").await.unwrap();
        let (page, result) = (registration.page, registration.first_check.unwrap());
        assert!(!harness.stored_files(page.id).is_empty());

        assert!(matches!(harness.pages.delete_page("bob", page.id).await, Err(PageError::Forbidden)));
        harness.pages.delete_page("alice", page.id).await.unwrap();

        assert!(harness.stored_files(page.id).is_empty());
        assert!(harness.database.get_page(page.id).await.unwrap().is_none());
        assert!(harness.database.get_result(result.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_artifact_checks_owner_and_path() {
        let harness = TestHarness::new().await.unwrap();
        let registration = harness.pages.register("alice", "https://example.com").await.unwrap();
        let (page, result) = (registration.page, registration.first_check.unwrap());

        let response = harness.pages.fetch_artifact("alice", &result.screenshot_path).await.unwrap();
        match response {
            ArtifactResponse::Bytes { data, content_type } => {
                assert!(!data.is_empty());
                assert_eq!(content_type, "image/jpeg");
            }
            ArtifactResponse::Redirect(_) => panic!("local store proxies bytes"),
        }

        assert!(matches!(
            harness.pages.fetch_artifact("bob", &result.screenshot_path).await,
            Err(PageError::Forbidden)
        ));
        assert!(matches!(
            harness.pages.fetch_artifact("alice", &format!("{}/../1/x.jpg", page.id)).await,
            Err(PageError::Store(StoreError::InvalidPath(..)))
        ));
        assert!(matches!(
            harness.pages.fetch_artifact("alice", &format!("{}/missing.jpg", page.id)).await,
            Err(PageError::Store(StoreError::NotFound(_)))
        ));
        assert!(matches!(harness.pages.fetch_artifact("alice", "999/x.jpg").await, Err(PageError::NotFound(999))));
    }

    #[tokio::test]
    async fn test_pages_pinned_first() {
        let harness = TestHarness::new().await.unwrap();
        let first = harness.pages.register("alice", "https://a.example.com").await.unwrap().page;
        harness.pages.register("alice", "https://b.example.com").await.unwrap();
        harness.pages.register("bob", "https://c.example.com").await.unwrap();

        let pin = SettingsUpdate { is_pinned: Some(true), ..SettingsUpdate::default() };
        harness.pages.update_settings("alice", first.id, &pin).await.unwrap();

        let pages = harness.pages.pages("alice").await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].id, first.id);
    }
}
