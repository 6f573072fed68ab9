use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Convert a timestamp to Unix milliseconds for storage
pub fn timestamp_to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp
pub fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Normalized region of interest, each coordinate a fraction of the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Region {
    fn default() -> Self {
        Self { left: 0.0, top: 0.0, width: 1.0, height: 1.0 }
    }
}

impl Region {
    /// Whether the region covers the whole page, in which case no crop is produced.
    pub fn is_full_page(&self) -> bool {
        self.left <= 0.0 && self.top <= 0.0 && self.width >= 1.0 && self.height >= 1.0
    }

    /// Pixel box `(x, y, width, height)` of this region on an image, clamped to
    /// its bounds. `None` when the box is empty.
    pub fn pixel_box(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let w = image_width as f64;
        let h = image_height as f64;
        let x0 = ((self.left * w) as u32).min(image_width);
        let y0 = ((self.top * h) as u32).min(image_height);
        let x1 = (((self.left + self.width) * w) as u32).min(image_width);
        let y1 = (((self.top + self.height) * h) as u32).min(image_height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// A registered page being monitored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredPage {
    pub id: i64,
    /// Opaque reference to the owning user
    pub owner_id: String,
    pub url: String,
    pub check_interval_minutes: u32,
    /// Consecutive failures before a downtime alert; 0 disables
    pub alert_threshold: u32,
    pub notifications_enabled: bool,
    pub screenshot_enabled: bool,
    pub change_notifications_enabled: bool,
    pub region: Region,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
}

impl MonitoredPage {
    /// Create a new, not yet persisted page with default settings
    pub fn new(owner_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: 0,
            owner_id: owner_id.into(),
            url: url.into(),
            check_interval_minutes: 5,
            alert_threshold: 3,
            notifications_enabled: false,
            screenshot_enabled: false,
            change_notifications_enabled: false,
            region: Region::default(),
            is_pinned: false,
            created_at: Utc::now(),
        }
    }
}

/// A persisted check result.
///
/// Rows are never rewritten except by retention, which clears the three
/// artifact paths and keeps everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: i64,
    pub page_id: i64,
    pub checked_at: DateTime<Utc>,
    pub status_code: Option<u16>,
    pub response_time_ms: f64,
    pub is_up: bool,
    pub message: String,
    pub screenshot_path: String,
    pub crop_path: String,
    pub diff_path: String,
    pub diff_score: Option<f64>,
}

impl CheckResult {
    pub fn has_screenshot(&self) -> bool {
        !self.screenshot_path.is_empty()
    }

    /// Image used as diff input: the crop when present, else the full screenshot
    pub fn diff_source(&self) -> &str {
        if self.crop_path.is_empty() { &self.screenshot_path } else { &self.crop_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_full_page() {
        assert!(Region::default().is_full_page());
        assert!(!Region { left: 0.1, ..Region::default() }.is_full_page());
        assert!(!Region { height: 0.5, ..Region::default() }.is_full_page());
    }

    #[test]
    fn test_region_pixel_box() {
        let region = Region { left: 0.25, top: 0.5, width: 0.5, height: 0.5 };
        assert_eq!(region.pixel_box(100, 200), Some((25, 100, 50, 100)));

        // Clamped to the image
        let overflow = Region { left: 0.5, top: 0.0, width: 1.0, height: 1.0 };
        assert_eq!(overflow.pixel_box(100, 100), Some((50, 0, 50, 100)));

        let empty = Region { left: 1.0, top: 0.0, width: 0.0, height: 1.0 };
        assert_eq!(empty.pixel_box(100, 100), None);
    }

    #[test]
    fn test_millis_round_trip() {
        let now = Utc::now();
        let restored = millis_to_timestamp(timestamp_to_millis(now));
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
    }
}
