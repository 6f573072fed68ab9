//! Screenshot retention.
//!
//! Only the newest `max_per_page` artifact-bearing checks of a page keep
//! their images. Older checks lose their files and path references but the
//! rows, including their diff scores, stay.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::{CheckResult, Database};
use crate::storage::ArtifactStore;
use crate::storage::path::thumb_path;

/// Every stored file a check refers to, thumbnail included
fn artifact_files(result: &CheckResult) -> Vec<String> {
    let mut files = Vec::with_capacity(4);
    for path in [&result.screenshot_path, &result.crop_path, &result.diff_path] {
        if !path.is_empty() {
            files.push(path.clone());
        }
    }
    if result.has_screenshot() {
        files.push(thumb_path(&result.screenshot_path));
    }
    files
}

pub struct RetentionManager {
    database: Arc<dyn Database>,
    store: Arc<dyn ArtifactStore>,
}

impl RetentionManager {
    pub fn new(database: Arc<dyn Database>, store: Arc<dyn ArtifactStore>) -> Self {
        Self { database, store }
    }

    /// Prune artifacts beyond the newest `max_per_page`, returning how many
    /// checks were cleared
    pub async fn prune(&self, page_id: i64, max_per_page: usize) -> Result<usize> {
        let results = self.database.results_with_screenshots(page_id).await?;
        if results.len() <= max_per_page {
            return Ok(0);
        }

        let (kept, expired) = results.split_at(max_per_page);

        // Unchanged checks reuse the previous screenshot, so a file may be
        // shared with a check that is kept
        let referenced: HashSet<String> = kept.iter().flat_map(artifact_files).collect();

        for result in expired {
            for file in artifact_files(result) {
                if referenced.contains(&file) {
                    debug!("Keeping {} still referenced by a retained check", file);
                    continue;
                }
                self.store.delete(&file).await;
            }
            self.database.clear_artifacts(result.id).await?;
        }

        info!("Pruned {} old screenshots of page {}", expired.len(), page_id);
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MonitoredPage;
    use crate::monitoring::types::{PendingCheck, ProbeOutcome, VisualArtifacts};
    use crate::test_support::TestHarness;
    use chrono::{Duration, Utc};

    async fn record_with_files(harness: &TestHarness, page_id: i64, n: i64, full: &str) -> CheckResult {
        for file in [full.to_string(), thumb_path(full)] {
            harness.store.save(&file, b"jpeg").await.unwrap();
        }
        let check = PendingCheck::from_probe(page_id, &ProbeOutcome::from_status(200, 5.0))
            .with_artifacts(VisualArtifacts {
                screenshot_path: full.to_string(),
                diff_score: Some(1.0),
                ..VisualArtifacts::default()
            })
            .at(Utc::now() + Duration::seconds(n));
        harness.database.save_result(&check).await.unwrap()
    }

    #[tokio::test]
    async fn test_prune_keeps_newest() {
        let harness = TestHarness::new().await.unwrap();
        let page = harness.insert_page(MonitoredPage::new("o", "https://example.com")).await.unwrap();

        let mut results = Vec::new();
        for n in 0..5 {
            results.push(record_with_files(&harness, page.id, n, &format!("{}/shot{n}.jpg", page.id)).await);
        }

        let pruned = harness.retention.prune(page.id, 3).await.unwrap();
        assert_eq!(pruned, 2);

        let with_paths = harness.database.results_with_screenshots(page.id).await.unwrap();
        let kept: Vec<i64> = with_paths.iter().map(|r| r.id).collect();
        assert_eq!(kept, vec![results[4].id, results[3].id, results[2].id]);

        for old in &results[..2] {
            assert!(!harness.store.exists(&old.screenshot_path).await);
            assert!(!harness.store.exists(&thumb_path(&old.screenshot_path)).await);
            let row = harness.database.get_result(old.id).await.unwrap().unwrap();
            assert!(row.screenshot_path.is_empty());
            assert_eq!(row.diff_score, Some(1.0));
        }
        for new in &results[2..] {
            assert!(harness.store.exists(&new.screenshot_path).await);
        }

        // At the limit nothing happens
        assert_eq!(harness.retention.prune(page.id, 3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_keeps_shared_files() {
        let harness = TestHarness::new().await.unwrap();
        let page = harness.insert_page(MonitoredPage::new("o", "https://example.com")).await.unwrap();
        let shared = format!("{}/shared.jpg", page.id);

        let old = record_with_files(&harness, page.id, 0, &shared).await;
        record_with_files(&harness, page.id, 1, &shared).await;

        assert_eq!(harness.retention.prune(page.id, 1).await.unwrap(), 1);
        assert!(harness.database.get_result(old.id).await.unwrap().unwrap().screenshot_path.is_empty());
        assert!(harness.store.exists(&shared).await);
    }
}
