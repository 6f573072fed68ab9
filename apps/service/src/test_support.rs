/// Shared fixtures for component tests
///
/// A `TestHarness` wires every component against a temporary database and a
/// local store in a temporary directory, with a fake renderer, a canned
/// checker and a mailer that records instead of sending.
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

use crate::capture::{PageRenderer, ScreenshotCapturer};
use crate::config::ScreenshotSettings;
use crate::database::{CheckResult, Database, DatabaseImpl, MonitoredPage};
use crate::diff::DiffEngine;
use crate::monitoring::types::{PendingCheck, ProbeOutcome};
use crate::monitoring::{CheckComponents, CheckExecutor, Checker, ExecutorSettings, Scheduler};
use crate::notifications::{MailError, MailMessage, Mailer, NotificationTrigger};
use crate::pages::PageService;
use crate::pool::open_pool;
use crate::retention::RetentionManager;
use crate::storage::{ArtifactStore, LocalStore};

pub const FAKE_PAGE_SIZE: (u32, u32) = (1280, 900);

enum RenderMode {
    Static,
    Alternating(AtomicUsize),
    Failing,
}

/// Produces PNG "screenshots" without a browser
pub struct FakeRenderer {
    mode: RenderMode,
}

impl FakeRenderer {
    /// Same page every time
    pub fn fixed() -> Self {
        Self { mode: RenderMode::Static }
    }

    /// Black and white on alternate renders
    pub fn alternating() -> Self {
        Self { mode: RenderMode::Alternating(AtomicUsize::new(0)) }
    }

    pub fn failing() -> Self {
        Self { mode: RenderMode::Failing }
    }
}

fn png(image: RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

impl PageRenderer for FakeRenderer {
    fn render(&self, _url: &str, _timeout: Duration) -> Result<Vec<u8>> {
        let (width, height) = FAKE_PAGE_SIZE;
        match &self.mode {
            RenderMode::Static => {
                let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
                for y in 100..200 {
                    for x in 0..width {
                        image.put_pixel(x, y, Rgb([30, 30, 30]));
                    }
                }
                png(image)
            }
            RenderMode::Alternating(counter) => {
                let value = if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 { 0 } else { 255 };
                png(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
            }
            RenderMode::Failing => Err(anyhow::anyhow!("browser unavailable")),
        }
    }
}

/// Answers every probe with the same status
pub struct StaticChecker {
    status: u16,
}

impl StaticChecker {
    pub fn up() -> Self {
        Self { status: 200 }
    }

    pub fn down(status: u16) -> Self {
        Self { status }
    }
}

#[async_trait]
impl Checker for StaticChecker {
    async fn check(&self, _target: &str) -> ProbeOutcome {
        ProbeOutcome::from_status(self.status, 12.5)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.subject).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Delegates to a real database but fails history reads for one page
pub struct FailingHistory {
    inner: Arc<dyn Database>,
    page_id: i64,
}

impl FailingHistory {
    pub fn new(inner: Arc<dyn Database>, page_id: i64) -> Self {
        Self { inner, page_id }
    }
}

#[async_trait]
impl Database for FailingHistory {
    async fn list_pages(&self) -> Result<Vec<MonitoredPage>> {
        self.inner.list_pages().await
    }

    async fn get_page(&self, id: i64) -> Result<Option<MonitoredPage>> {
        self.inner.get_page(id).await
    }

    async fn find_page(&self, owner_id: &str, url: &str) -> Result<Option<MonitoredPage>> {
        self.inner.find_page(owner_id, url).await
    }

    async fn insert_page(&self, page: &MonitoredPage) -> Result<i64> {
        self.inner.insert_page(page).await
    }

    async fn update_page(&self, page: &MonitoredPage) -> Result<()> {
        self.inner.update_page(page).await
    }

    async fn delete_page(&self, id: i64) -> Result<()> {
        self.inner.delete_page(id).await
    }

    async fn save_result(&self, check: &PendingCheck) -> Result<CheckResult> {
        self.inner.save_result(check).await
    }

    async fn get_result(&self, id: i64) -> Result<Option<CheckResult>> {
        self.inner.get_result(id).await
    }

    async fn latest_result(&self, page_id: i64) -> Result<Option<CheckResult>> {
        if page_id == self.page_id {
            return Err(anyhow::anyhow!("disk I/O error"));
        }
        self.inner.latest_result(page_id).await
    }

    async fn previous_result(&self, page_id: i64, exclude_id: i64) -> Result<Option<CheckResult>> {
        self.inner.previous_result(page_id, exclude_id).await
    }

    async fn recent_results(&self, page_id: i64, limit: usize) -> Result<Vec<CheckResult>> {
        self.inner.recent_results(page_id, limit).await
    }

    async fn all_results(&self, page_id: i64) -> Result<Vec<CheckResult>> {
        self.inner.all_results(page_id).await
    }

    async fn results_with_screenshots(&self, page_id: i64) -> Result<Vec<CheckResult>> {
        self.inner.results_with_screenshots(page_id).await
    }

    async fn clear_artifacts(&self, result_id: i64) -> Result<()> {
        self.inner.clear_artifacts(result_id).await
    }

    async fn consecutive_failures(&self, page_id: i64) -> Result<u32> {
        self.inner.consecutive_failures(page_id).await
    }

    async fn owner_email(&self, owner_id: &str) -> Result<Option<String>> {
        self.inner.owner_email(owner_id).await
    }

    async fn set_owner_email(&self, owner_id: &str, email: &str) -> Result<()> {
        self.inner.set_owner_email(owner_id, email).await
    }
}

pub struct TestHarness {
    _dir: TempDir,
    pub store_root: PathBuf,
    pub max_screenshots: usize,
    pub database: Arc<dyn Database>,
    pub store: Arc<dyn ArtifactStore>,
    pub capturer: Arc<ScreenshotCapturer>,
    pub diff: Arc<DiffEngine>,
    pub retention: Arc<RetentionManager>,
    pub notifications: Arc<NotificationTrigger>,
    pub mailer: Arc<RecordingMailer>,
    pub executor: Arc<CheckExecutor>,
    pub pages: PageService,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        Self::build(Arc::new(StaticChecker::up()), Arc::new(FakeRenderer::fixed())).await
    }

    pub async fn with_renderer(renderer: Arc<dyn PageRenderer>) -> Result<Self> {
        Self::build(Arc::new(StaticChecker::up()), renderer).await
    }

    pub async fn with_checker(checker: Arc<dyn Checker>) -> Result<Self> {
        Self::build(checker, Arc::new(FakeRenderer::fixed())).await
    }

    async fn build(checker: Arc<dyn Checker>, renderer: Arc<dyn PageRenderer>) -> Result<Self> {
        let dir = tempdir()?;
        let db_path = dir.path().join("test.db");
        let pool = open_pool(&db_path.to_string_lossy(), 4).await?;
        {
            let conn = pool.get().await?;
            crate::database::initialize_database(&*conn).await?;
        }
        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));

        let store_root = dir.path().join("screenshots");
        let store: Arc<dyn ArtifactStore> = Arc::new(LocalStore::new(&store_root, "/api/screenshots")?);

        let settings = ScreenshotSettings::default();
        let capturer = Arc::new(ScreenshotCapturer::new(renderer, store.clone(), settings.clone()));
        let diff = Arc::new(DiffEngine::new(store.clone(), settings.jpeg_quality));
        let retention = Arc::new(RetentionManager::new(database.clone(), store.clone()));
        let mailer = Arc::new(RecordingMailer::default());
        let notifications = Arc::new(NotificationTrigger::new(
            database.clone(),
            store.clone(),
            mailer.clone(),
            Default::default(),
        ));

        let max_screenshots = 2;
        let executor = Arc::new(CheckExecutor::new(
            CheckComponents {
                checker,
                database: database.clone(),
                store: store.clone(),
                capturer: capturer.clone(),
                diff: diff.clone(),
                retention: retention.clone(),
                notifications: notifications.clone(),
            },
            ExecutorSettings { screenshot_timeout: Duration::from_secs(10), max_screenshots_per_page: max_screenshots },
        ));
        let pages = PageService::new(database.clone(), store.clone(), executor.clone(), capturer.clone());

        Ok(Self {
            _dir: dir,
            store_root,
            max_screenshots,
            database,
            store,
            capturer,
            diff,
            retention,
            notifications,
            mailer,
            executor,
            pages,
        })
    }

    pub async fn insert_page(&self, mut page: MonitoredPage) -> Result<MonitoredPage> {
        page.id = self.database.insert_page(&page).await?;
        Ok(page)
    }

    /// Store a plain check: 200 when up, 500 when down
    pub async fn record(&self, page_id: i64, is_up: bool, at: DateTime<Utc>) -> Result<CheckResult> {
        let probe = ProbeOutcome::from_status(if is_up { 200 } else { 500 }, 10.0);
        self.database.save_result(&PendingCheck::from_probe(page_id, &probe).at(at)).await
    }

    /// Files currently stored under a page's directory
    pub fn stored_files(&self, page_id: i64) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.store_root.join(page_id.to_string())) else {
            return Vec::new();
        };
        entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_file()).collect()
    }

    pub fn scheduler(&self, interval: Duration, run_once: bool) -> Scheduler {
        Scheduler::new(self.database.clone(), self.executor.clone(), interval, run_once)
    }
}
