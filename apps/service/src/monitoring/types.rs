use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::CheckResult;

/// Outcome of a single HTTP liveness probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub status_code: Option<u16>,
    pub is_up: bool,
    pub message: String,
    /// Elapsed time in milliseconds, rounded to two decimals
    pub elapsed_ms: f64,
}

impl ProbeOutcome {
    /// Classify an HTTP response: anything in [200, 400) is up
    pub fn from_status(status_code: u16, elapsed_ms: f64) -> Self {
        let is_up = (200..400).contains(&status_code);
        let message = if is_up { "OK".to_string() } else { format!("HTTP {status_code}") };
        Self { status_code: Some(status_code), is_up, message, elapsed_ms: round_ms(elapsed_ms) }
    }

    /// A probe that never produced a response
    pub fn failure(reason: impl std::fmt::Display, elapsed_ms: f64) -> Self {
        Self {
            status_code: None,
            is_up: false,
            message: format!("Error: {reason}"),
            elapsed_ms: round_ms(elapsed_ms),
        }
    }
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// A check about to be persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCheck {
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

impl PendingCheck {
    /// Create a check from a probe outcome with no artifacts attached
    pub fn from_probe(page_id: i64, probe: &ProbeOutcome) -> Self {
        Self {
            page_id,
            checked_at: Utc::now(),
            status_code: probe.status_code,
            response_time_ms: probe.elapsed_ms,
            is_up: probe.is_up,
            message: probe.message.clone(),
            screenshot_path: String::new(),
            crop_path: String::new(),
            diff_path: String::new(),
            diff_score: None,
        }
    }

    /// Attach the visual artifacts of this check
    pub fn with_artifacts(mut self, artifacts: VisualArtifacts) -> Self {
        self.screenshot_path = artifacts.screenshot_path;
        self.crop_path = artifacts.crop_path;
        self.diff_path = artifacts.diff_path;
        self.diff_score = artifacts.diff_score;
        self
    }

    pub fn at(mut self, checked_at: DateTime<Utc>) -> Self {
        self.checked_at = checked_at;
        self
    }

    /// Turn into the stored row once the database assigned an id
    pub fn into_result(self, id: i64) -> CheckResult {
        CheckResult {
            id,
            page_id: self.page_id,
            checked_at: self.checked_at,
            status_code: self.status_code,
            response_time_ms: self.response_time_ms,
            is_up: self.is_up,
            message: self.message,
            screenshot_path: self.screenshot_path,
            crop_path: self.crop_path,
            diff_path: self.diff_path,
            diff_score: self.diff_score,
        }
    }
}

/// Screenshot and diff paths produced by one check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualArtifacts {
    pub screenshot_path: String,
    pub crop_path: String,
    pub diff_path: String,
    pub diff_score: Option<f64>,
}
