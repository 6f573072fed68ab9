use anyhow::{Result, anyhow};
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{Browser, LaunchOptions};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ScreenshotSettings;

/// Renders a URL to a PNG of the full page.
///
/// Implementations block; callers run them on the blocking pool.
pub trait PageRenderer: Send + Sync {
    fn render(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// Headless Chromium renderer. A browser is launched per render.
pub struct ChromeRenderer {
    viewport: (u32, u32),
    chrome_path: Option<PathBuf>,
}

impl ChromeRenderer {
    pub fn new(settings: &ScreenshotSettings) -> Self {
        Self {
            viewport: (settings.viewport_width, settings.viewport_height),
            chrome_path: settings.chrome_path.as_ref().map(PathBuf::from),
        }
    }

    fn launch(&self, timeout: Duration) -> Result<Browser> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some(self.viewport))
            .ignore_certificate_errors(true)
            .path(self.chrome_path.clone())
            .idle_browser_timeout(timeout + Duration::from_secs(5))
            .build()
            .map_err(|e| anyhow!("invalid browser options: {e}"))?;

        Browser::new(options)
    }
}

/// Evaluate a numeric page dimension, falling back to the viewport
fn page_extent(tab: &headless_chrome::Tab, expression: &str, fallback: u32) -> f64 {
    tab.evaluate(expression, false)
        .ok()
        .and_then(|remote| remote.value)
        .and_then(|value| value.as_f64())
        .filter(|v| *v > 0.0)
        .unwrap_or(fallback as f64)
}

impl PageRenderer for ChromeRenderer {
    fn render(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let browser = self.launch(timeout)?;
        let tab = browser.new_tab()?;
        tab.set_default_timeout(timeout);

        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        let (viewport_width, viewport_height) = self.viewport;
        let width = page_extent(
            &tab,
            "Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0)",
            viewport_width,
        );
        let height = page_extent(
            &tab,
            "Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)",
            viewport_height,
        );

        let clip = Viewport { x: 0.0, y: 0.0, width, height, scale: 1.0 };
        tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, Some(clip), true)
    }
}
