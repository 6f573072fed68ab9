use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::checker::Checker;
use super::types::{PendingCheck, VisualArtifacts};
use crate::capture::ScreenshotCapturer;
use crate::database::{CheckResult, Database, MonitoredPage};
use crate::diff::DiffEngine;
use crate::notifications::NotificationTrigger;
use crate::retention::RetentionManager;
use crate::storage::ArtifactStore;
use crate::storage::path::thumb_path;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("a check of page {0} is already running")]
    AlreadyRunning(i64),

    #[error("failed to store check of page {page_id}: {reason}")]
    Persist { page_id: i64, reason: String },
}

/// Collaborators of a check
pub struct CheckComponents {
    pub checker: Arc<dyn Checker>,
    pub database: Arc<dyn Database>,
    pub store: Arc<dyn ArtifactStore>,
    pub capturer: Arc<ScreenshotCapturer>,
    pub diff: Arc<DiffEngine>,
    pub retention: Arc<RetentionManager>,
    pub notifications: Arc<NotificationTrigger>,
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub screenshot_timeout: Duration,
    pub max_screenshots_per_page: usize,
}

/// Marks a page as being checked until dropped
struct InFlight<'a> {
    pages: &'a Mutex<HashSet<i64>>,
    page_id: i64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut pages = self.pages.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pages.remove(&self.page_id);
    }
}

/// Runs one complete check of a page
pub struct CheckExecutor {
    components: CheckComponents,
    settings: ExecutorSettings,
    in_flight: Mutex<HashSet<i64>>,
}

impl CheckExecutor {
    pub fn new(components: CheckComponents, settings: ExecutorSettings) -> Self {
        Self { components, settings, in_flight: Mutex::new(HashSet::new()) }
    }

    fn claim(&self, page_id: i64) -> Result<InFlight<'_>, CheckError> {
        let mut pages = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !pages.insert(page_id) {
            return Err(CheckError::AlreadyRunning(page_id));
        }
        Ok(InFlight { pages: &self.in_flight, page_id })
    }

    /// Probe, optionally screenshot and diff, then store exactly one result.
    ///
    /// Retention and notifications run afterwards; their failures are logged
    /// and never surface here.
    pub async fn run_check(&self, page: &MonitoredPage, force_screenshot: bool) -> Result<CheckResult, CheckError> {
        let _in_flight = self.claim(page.id)?;
        let c = &self.components;

        let probe = c.checker.check(&page.url).await;
        let mut pending = PendingCheck::from_probe(page.id, &probe);

        if (page.screenshot_enabled || force_screenshot) && probe.is_up {
            pending = pending.with_artifacts(self.capture_and_diff(page).await);
        }

        let result = c
            .database
            .save_result(&pending)
            .await
            .map_err(|e| CheckError::Persist { page_id: page.id, reason: e.to_string() })?;

        info!(
            "Checked page {} ({}): {} in {:.2} ms{}",
            page.id,
            page.url,
            result.message,
            result.response_time_ms,
            result.diff_score.map(|s| format!(", diff {s:.2}%")).unwrap_or_default()
        );

        if result.has_screenshot() {
            if let Err(e) = c.retention.prune(page.id, self.settings.max_screenshots_per_page).await {
                error!("Retention for page {} failed: {}", page.id, e);
            }
        }

        c.notifications.process(page, &result).await;

        Ok(result)
    }

    async fn capture_and_diff(&self, page: &MonitoredPage) -> VisualArtifacts {
        let c = &self.components;

        let previous = match c.database.latest_result(page.id).await {
            Ok(previous) => previous.filter(CheckResult::has_screenshot),
            Err(e) => {
                warn!("Could not load previous check of page {}: {}", page.id, e);
                None
            }
        };

        let capture = c.capturer.capture(page, self.settings.screenshot_timeout).await;
        if capture.is_empty() {
            return VisualArtifacts::default();
        }

        let mut artifacts = VisualArtifacts {
            screenshot_path: capture.full_path.clone(),
            crop_path: capture.crop_path.clone(),
            ..VisualArtifacts::default()
        };
        let Some(previous) = previous else {
            return artifacts;
        };

        let current_source = if capture.crop_path.is_empty() { &capture.full_path } else { &capture.crop_path };
        let outcome = c.diff.compute_diff(previous.diff_source(), current_source, page.id).await;
        artifacts.diff_path = outcome.diff_path;
        artifacts.diff_score = outcome.score;

        if outcome.score == Some(0.0) {
            // Unchanged: keep pointing at the previous capture
            c.store.delete(&capture.full_path).await;
            c.store.delete(&capture.crop_path).await;
            c.store.delete(&thumb_path(&capture.full_path)).await;
            artifacts.screenshot_path = previous.screenshot_path;
            artifacts.crop_path = previous.crop_path;
        }

        artifacts
    }
}
