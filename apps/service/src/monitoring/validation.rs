//! Page setting validation.
//!
//! Every user-supplied value goes through here before it is stored.

use anyhow::{Result, anyhow};
use url::Url;

use crate::database::Region;

pub const MIN_INTERVAL_MINUTES: u32 = 1;
pub const MAX_INTERVAL_MINUTES: u32 = 60;
pub const MIN_ALERT_THRESHOLD: u32 = 1;
pub const MAX_ALERT_THRESHOLD: u32 = 10;

/// Validate a monitored URL: http or https with a host
pub fn validate_page_url(target: &str) -> Result<()> {
    if target.trim().is_empty() {
        return Err(anyhow!("URL cannot be empty"));
    }

    let url = Url::parse(target).map_err(|e| {
        if target.contains("://") {
            anyhow!("Invalid URL: {}", e)
        } else {
            anyhow!("URL must include scheme (http:// or https://)")
        }
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme '{}'. Must be http or https", other)),
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL must have a valid host"));
    }

    Ok(())
}

pub fn validate_check_interval(minutes: u32) -> Result<()> {
    if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&minutes) {
        return Err(anyhow!(
            "Check interval must be between {} and {} minutes, got {}",
            MIN_INTERVAL_MINUTES,
            MAX_INTERVAL_MINUTES,
            minutes
        ));
    }
    Ok(())
}

pub fn validate_alert_threshold(threshold: u32) -> Result<()> {
    if !(MIN_ALERT_THRESHOLD..=MAX_ALERT_THRESHOLD).contains(&threshold) {
        return Err(anyhow!(
            "Alert threshold must be between {} and {}, got {}",
            MIN_ALERT_THRESHOLD,
            MAX_ALERT_THRESHOLD,
            threshold
        ));
    }
    Ok(())
}

/// Each region coordinate must be a finite fraction in [0, 1]
pub fn validate_region(region: &Region) -> Result<()> {
    let fields = [
        ("left", region.left),
        ("top", region.top),
        ("width", region.width),
        ("height", region.height),
    ];
    for (name, value) in fields {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(anyhow!("Region {} must be between 0 and 1, got {}", name, value));
        }
    }
    Ok(())
}
