/// Screenshot capture
///
/// Renders a page, stores the full screenshot as JPEG, and derives the
/// region crop and a thumbnail from it.
pub mod imaging;
pub mod renderer;

pub use renderer::{ChromeRenderer, PageRenderer};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ScreenshotSettings;
use crate::database::{MonitoredPage, Region};
use crate::storage::path::{crop_path, new_capture_path, thumb_path};
use crate::storage::{ArtifactStore, StoreError};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("render failed: {0}")]
    Render(String),

    #[error("render timed out after {0:?}")]
    TimedOut(Duration),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Stored paths of one capture; both empty when nothing was captured
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub full_path: String,
    pub crop_path: String,
}

impl Capture {
    pub fn is_empty(&self) -> bool {
        self.full_path.is_empty()
    }
}

struct EncodedCapture {
    full: Vec<u8>,
    crop: Option<Vec<u8>>,
    thumbnail: Vec<u8>,
}

fn encode_capture(png: &[u8], region: Region, settings: &ScreenshotSettings) -> Result<EncodedCapture, CaptureError> {
    let image = imaging::flatten_on_white(&imaging::decode(png)?);
    let full = imaging::encode_jpeg(&image, settings.jpeg_quality)?;
    let crop = imaging::crop_region(&image, &region)
        .map(|crop| imaging::encode_jpeg(&crop, settings.jpeg_quality))
        .transpose()?;
    let thumbnail = imaging::encode_jpeg(
        &imaging::thumbnail(&image, settings.thumbnail_width),
        settings.thumbnail_quality,
    )?;
    Ok(EncodedCapture { full, crop, thumbnail })
}

fn encode_thumbnail(source: &[u8], settings: &ScreenshotSettings) -> Result<Vec<u8>, CaptureError> {
    let image = imaging::flatten_on_white(&imaging::decode(source)?);
    Ok(imaging::encode_jpeg(
        &imaging::thumbnail(&image, settings.thumbnail_width),
        settings.thumbnail_quality,
    )?)
}

pub struct ScreenshotCapturer {
    renderer: Arc<dyn PageRenderer>,
    store: Arc<dyn ArtifactStore>,
    settings: ScreenshotSettings,
}

impl ScreenshotCapturer {
    pub fn new(renderer: Arc<dyn PageRenderer>, store: Arc<dyn ArtifactStore>, settings: ScreenshotSettings) -> Self {
        Self { renderer, store, settings }
    }

    /// Capture a page. Any failure is logged and yields an empty `Capture`.
    pub async fn capture(&self, page: &MonitoredPage, timeout: Duration) -> Capture {
        match self.try_capture(page, timeout).await {
            Ok(capture) => capture,
            Err(e) => {
                warn!("Screenshot of page {} ({}) failed: {}", page.id, page.url, e);
                Capture::default()
            }
        }
    }

    async fn try_capture(&self, page: &MonitoredPage, timeout: Duration) -> Result<Capture, CaptureError> {
        let renderer = self.renderer.clone();
        let url = page.url.clone();
        let render = tokio::task::spawn_blocking(move || renderer.render(&url, timeout));

        let png = match tokio::time::timeout(timeout, render).await {
            Ok(joined) => joined?.map_err(|e| CaptureError::Render(e.to_string()))?,
            Err(_) => return Err(CaptureError::TimedOut(timeout)),
        };

        let region = page.region;
        let settings = self.settings.clone();
        let encoded = tokio::task::spawn_blocking(move || encode_capture(&png, region, &settings)).await??;

        let full_path = new_capture_path(page.id);
        self.store.save(&full_path, &encoded.full).await?;

        let mut capture = Capture { full_path, crop_path: String::new() };
        if let Some(crop) = encoded.crop {
            let crop_path = crop_path(&capture.full_path);
            if let Err(e) = self.store.save(&crop_path, &crop).await {
                // A capture without its crop would diff the wrong image
                self.store.delete(&capture.full_path).await;
                return Err(e.into());
            }
            capture.crop_path = crop_path;
        }

        let thumb = thumb_path(&capture.full_path);
        if !self.store.exists(&thumb).await {
            if let Err(e) = self.store.save(&thumb, &encoded.thumbnail).await {
                warn!("Failed to store thumbnail {}: {}", thumb, e);
            }
        }

        info!("Captured page {} as {}", page.id, capture.full_path);
        Ok(capture)
    }

    /// Thumbnail path of a stored screenshot, generating it when missing
    pub async fn ensure_thumbnail(&self, full_path: &str) -> Option<String> {
        if full_path.is_empty() {
            return None;
        }
        let thumb = thumb_path(full_path);
        if self.store.exists(&thumb).await {
            return Some(thumb);
        }

        let source = match self.store.read(full_path).await {
            Ok(source) => source,
            Err(e) => {
                debug!("No source for thumbnail {}: {}", thumb, e);
                return None;
            }
        };

        let settings = self.settings.clone();
        let encoded = tokio::task::spawn_blocking(move || encode_thumbnail(&source, &settings)).await;
        let bytes = match encoded {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("Failed to build thumbnail {}: {}", thumb, e);
                return None;
            }
            Err(e) => {
                warn!("Thumbnail task for {} failed: {}", thumb, e);
                return None;
            }
        };

        match self.store.save(&thumb, &bytes).await {
            Ok(()) => Some(thumb),
            Err(e) => {
                warn!("Failed to store thumbnail {}: {}", thumb, e);
                None
            }
        }
    }
}
