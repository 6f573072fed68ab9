use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageResult, Rgb, RgbImage};

use crate::database::Region;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

pub fn decode(bytes: &[u8]) -> ImageResult<DynamicImage> {
    image::load_from_memory(bytes)
}

/// Drop transparency by compositing over white
pub fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let over = |v: u8| ((v as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([over(r), over(g), over(b)])
    })
}

/// Place `image` at the top-left of a white canvas of the given size
pub fn pad_on_white(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    let mut canvas = RgbImage::from_pixel(width, height, WHITE);
    imageops::replace(&mut canvas, image, 0, 0);
    canvas
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buffer)
}

/// Region crop, or `None` when the region is the whole page or empty
pub fn crop_region(image: &RgbImage, region: &Region) -> Option<RgbImage> {
    if region.is_full_page() {
        return None;
    }
    let (x, y, width, height) = region.pixel_box(image.width(), image.height())?;
    Some(imageops::crop_imm(image, x, y, width, height).to_image())
}

/// Shrink to `max_width`, keeping the aspect ratio. Never enlarges.
pub fn thumbnail(image: &RgbImage, max_width: u32) -> RgbImage {
    if max_width == 0 || image.width() <= max_width {
        return image.clone();
    }
    let height = ((image.height() as u64 * max_width as u64) / image.width() as u64).max(1) as u32;
    imageops::resize(image, max_width, height, FilterType::Lanczos3)
}
