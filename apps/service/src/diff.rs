//! Perceptual visual-change detection between consecutive screenshots.

use image::{DynamicImage, Rgb, RgbImage};
use image_hasher::{HashAlg, HasherConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capture::imaging;
use crate::storage::ArtifactStore;
use crate::storage::path::diff_path;

/// Per-channel difference above which a pixel counts as changed
pub const PIXEL_THRESHOLD: u8 = 10;
pub const HIGHLIGHT: Rgb<u8> = Rgb([59, 130, 246]);
pub const HIGHLIGHT_ALPHA: f64 = 0.55;

/// Result of diffing two stored images.
///
/// `score` is `None` when no comparison happened. `diff_path` is empty unless
/// a highlight image was stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffOutcome {
    pub diff_path: String,
    pub score: Option<f64>,
}

/// In-memory comparison of two images
#[derive(Debug)]
pub struct Comparison {
    pub score: f64,
    pub highlight: Option<RgbImage>,
}

fn phash_distance(previous: &RgbImage, current: &RgbImage) -> (u32, u32) {
    let hasher = HasherConfig::new().hash_alg(HashAlg::Mean).hash_size(8, 8).preproc_dct().to_hasher();

    let a = hasher.hash_image(&DynamicImage::ImageRgb8(previous.clone()));
    let b = hasher.hash_image(&DynamicImage::ImageRgb8(current.clone()));
    let bits = (a.as_bytes().len() * 8) as u32;
    (a.dist(&b), bits.max(1))
}

/// Dissimilarity score in [0, 100], rounded half-to-even to two decimals
pub fn score_from_distance(distance: u32, bits: u32) -> f64 {
    let raw = distance as f64 / bits as f64 * 100.0;
    (raw * 100.0).round_ties_even() / 100.0
}

/// Tint every changed pixel of `current` toward the highlight colour
pub fn highlight_changes(previous: &RgbImage, current: &RgbImage) -> RgbImage {
    let blend = |v: u8, h: u8| (v as f64 * (1.0 - HIGHLIGHT_ALPHA) + h as f64 * HIGHLIGHT_ALPHA) as u8;

    let mut output = current.clone();
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let before = previous.get_pixel(x, y).0;
        let changed = before.iter().zip(pixel.0.iter()).any(|(a, b)| a.abs_diff(*b) > PIXEL_THRESHOLD);
        if changed {
            let [r, g, b] = pixel.0;
            *pixel = Rgb([blend(r, HIGHLIGHT[0]), blend(g, HIGHLIGHT[1]), blend(b, HIGHLIGHT[2])]);
        }
    }
    output
}

/// Compare two decoded images on a shared white canvas
pub fn compare_images(previous: &DynamicImage, current: &DynamicImage) -> Comparison {
    let previous = imaging::flatten_on_white(previous);
    let current = imaging::flatten_on_white(current);
    let width = previous.width().max(current.width());
    let height = previous.height().max(current.height());
    let previous = imaging::pad_on_white(&previous, width, height);
    let current = imaging::pad_on_white(&current, width, height);

    let (distance, bits) = phash_distance(&previous, &current);
    let score = score_from_distance(distance, bits);
    let highlight = (score > 0.0).then(|| highlight_changes(&previous, &current));

    Comparison { score, highlight }
}

fn compare_encoded(previous: &[u8], current: &[u8], quality: u8) -> image::ImageResult<(f64, Option<Vec<u8>>)> {
    let comparison = compare_images(&imaging::decode(previous)?, &imaging::decode(current)?);
    let encoded = comparison.highlight.map(|image| imaging::encode_jpeg(&image, quality)).transpose()?;
    Ok((comparison.score, encoded))
}

pub struct DiffEngine {
    store: Arc<dyn ArtifactStore>,
    jpeg_quality: u8,
}

impl DiffEngine {
    pub fn new(store: Arc<dyn ArtifactStore>, jpeg_quality: u8) -> Self {
        Self { store, jpeg_quality }
    }

    /// Diff `current` against `previous`. Never fails; problems yield an
    /// empty outcome.
    pub async fn compute_diff(&self, previous: &str, current: &str, page_id: i64) -> DiffOutcome {
        if previous.is_empty() || current.is_empty() {
            return DiffOutcome::default();
        }

        let (previous_bytes, current_bytes) = match (self.store.read(previous).await, self.store.read(current).await) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                debug!("Diff skipped for page {}: {}", page_id, e);
                return DiffOutcome::default();
            }
        };

        let quality = self.jpeg_quality;
        let compared =
            tokio::task::spawn_blocking(move || compare_encoded(&previous_bytes, &current_bytes, quality)).await;

        let (score, highlight) = match compared {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("Diff of page {} failed: {}", page_id, e);
                return DiffOutcome::default();
            }
            Err(e) => {
                warn!("Diff task for page {} failed: {}", page_id, e);
                return DiffOutcome::default();
            }
        };

        let Some(highlight) = highlight else {
            return DiffOutcome { diff_path: String::new(), score: Some(score) };
        };

        let path = diff_path(current);
        if let Err(e) = self.store.save(&path, &highlight).await {
            warn!("Failed to store diff for page {}: {}", page_id, e);
            return DiffOutcome::default();
        }

        info!("Page {} changed by {:.2}%", page_id, score);
        DiffOutcome { diff_path: path, score: Some(score) }
    }
}
