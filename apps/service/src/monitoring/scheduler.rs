use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::executor::CheckExecutor;
use crate::database::{Database, MonitoredPage};

/// Whether a page's check interval has elapsed since its last check
pub fn is_due(page: &MonitoredPage, last_checked: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_checked {
        None => true,
        Some(last) => now - last >= ChronoDuration::minutes(page.check_interval_minutes as i64),
    }
}

/// Counts for one scan round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub pages: usize,
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// The monitoring loop: scan, fan out due checks, wait, repeat
pub struct Scheduler {
    database: Arc<dyn Database>,
    executor: Arc<CheckExecutor>,
    interval: Duration,
    run_once: bool,
}

impl Scheduler {
    pub fn new(database: Arc<dyn Database>, executor: Arc<CheckExecutor>, interval: Duration, run_once: bool) -> Self {
        Self { database, executor, interval, run_once }
    }

    async fn due_pages(&self, now: DateTime<Utc>) -> Result<(usize, Vec<MonitoredPage>)> {
        let pages = self.database.list_pages().await?;
        let total = pages.len();
        let mut due = Vec::new();

        for page in pages {
            let last = match self.database.latest_result(page.id).await {
                Ok(result) => result.map(|r| r.checked_at),
                Err(e) => {
                    warn!("Skipping page {} this round, cannot read its last check: {}", page.id, e);
                    continue;
                }
            };
            if is_due(&page, last, now) {
                due.push(page);
            }
        }
        Ok((total, due))
    }

    /// Check every due page concurrently and wait for all of them
    pub async fn run_round(&self) -> Result<RoundSummary> {
        let (pages, due) = self.due_pages(Utc::now()).await?;
        let mut summary = RoundSummary { pages, due: due.len(), ..RoundSummary::default() };

        let mut tasks = JoinSet::new();
        for page in due {
            let executor = self.executor.clone();
            tasks.spawn(async move {
                let outcome = executor.run_check(&page, false).await;
                (page, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => summary.succeeded += 1,
                Ok((page, Err(e))) => {
                    error!("Check of page {} ({}) failed: {}", page.id, page.url, e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("Check task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Start the loop on its own task
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        SchedulerHandle { stop_tx, task }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        info!(
            "Scheduler started (interval {}s{})",
            self.interval.as_secs(),
            if self.run_once { ", single round" } else { "" }
        );

        loop {
            match self.run_round().await {
                Ok(summary) => info!(
                    "Round complete: {} pages, {} due, {} ok, {} failed",
                    summary.pages, summary.due, summary.succeeded, summary.failed
                ),
                Err(e) => error!("Round failed: {}", e),
            }

            if self.run_once {
                break;
            }

            // A dropped handle also ends the loop
            let handle_gone = tokio::select! {
                _ = tokio::time::sleep(self.interval) => false,
                changed = stop_rx.changed() => changed.is_err(),
            };
            if handle_gone || *stop_rx.borrow() {
                debug!("Stop requested");
                break;
            }
        }

        info!("Scheduler stopped");
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the loop to exit after the current round
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub async fn join(self) -> Result<()> {
        self.task.await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingHistory, TestHarness};

    #[test]
    fn test_is_due() {
        let page = MonitoredPage::new("o", "https://example.com");
        let now = Utc::now();

        assert!(is_due(&page, None, now));
        assert!(!is_due(&page, Some(now - ChronoDuration::minutes(4)), now));
        assert!(is_due(&page, Some(now - ChronoDuration::minutes(5)), now));
        assert!(is_due(&page, Some(now - ChronoDuration::hours(1)), now));
    }

    #[tokio::test]
    async fn test_round_checks_only_due_pages() {
        let harness = TestHarness::new().await.unwrap();
        let fresh = harness.insert_page(MonitoredPage::new("o", "https://a.example.com")).await.unwrap();
        let stale = harness.insert_page(MonitoredPage::new("o", "https://b.example.com")).await.unwrap();
        let never = harness.insert_page(MonitoredPage::new("o", "https://c.example.com")).await.unwrap();

        harness.record(fresh.id, true, Utc::now()).await.unwrap();
        harness.record(stale.id, true, Utc::now() - ChronoDuration::minutes(10)).await.unwrap();

        let scheduler = harness.scheduler(Duration::from_secs(60), true);
        let summary = scheduler.run_round().await.unwrap();
        assert_eq!(summary, RoundSummary { pages: 3, due: 2, succeeded: 2, failed: 0 });

        assert_eq!(harness.database.all_results(fresh.id).await.unwrap().len(), 1);
        assert_eq!(harness.database.all_results(stale.id).await.unwrap().len(), 2);
        assert_eq!(harness.database.all_results(never.id).await.unwrap().len(), 1);

        // Everything was just checked
        let summary = scheduler.run_round().await.unwrap();
        assert_eq!(summary.due, 0);
    }

    #[tokio::test]
    async fn test_unreadable_history_skips_only_that_page() {
        let harness = TestHarness::new().await.unwrap();
        let broken = harness.insert_page(MonitoredPage::new("o", "https://a.example.com")).await.unwrap();
        let healthy = harness.insert_page(MonitoredPage::new("o", "https://b.example.com")).await.unwrap();

        let database = Arc::new(FailingHistory::new(harness.database.clone(), broken.id));
        let scheduler = Scheduler::new(database, harness.executor.clone(), Duration::from_secs(60), true);

        let summary = scheduler.run_round().await.unwrap();
        assert_eq!(summary, RoundSummary { pages: 2, due: 1, succeeded: 1, failed: 0 });
        assert_eq!(harness.database.all_results(healthy.id).await.unwrap().len(), 1);
        assert!(harness.database.all_results(broken.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_once_exits() {
        let harness = TestHarness::new().await.unwrap();
        let page = harness.insert_page(MonitoredPage::new("o", "https://example.com")).await.unwrap();

        let handle = harness.scheduler(Duration::from_secs(3600), true).start();
        tokio::time::timeout(Duration::from_secs(10), handle.join()).await.unwrap().unwrap();
        assert_eq!(harness.database.all_results(page.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let harness = TestHarness::new().await.unwrap();
        let handle = harness.scheduler(Duration::from_secs(3600), false).start();

        handle.stop();
        tokio::time::timeout(Duration::from_secs(10), handle.join()).await.unwrap().unwrap();
    }
}
