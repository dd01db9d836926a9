use image::imageops::FilterType;

use crate::error::{MockupError, Result};
use crate::raster::Image;

/// Resize to exactly `width` x `height` with bilinear filtering.
/// Nearest-neighbour would leave jagged edges in stretched patterns.
pub fn resize(image: &Image, width: u32, height: u32) -> Result<Image> {
    if width == 0 || height == 0 {
        return Err(MockupError::InvalidArgument(format!(
            "resize target must be > 0, got {}x{}",
            width, height
        )));
    }
    if image.dimensions() == (width, height) {
        return Ok(image.clone());
    }
    let resized = image
        .to_dynamic()?
        .resize_exact(width, height, FilterType::Triangle);
    Image::from_dynamic(resized)
}

/// Shrink `image` to fit inside a `max_dimension` square, keeping its
/// aspect ratio. Images already within bounds are returned as-is.
pub fn bound(image: &Image, max_dimension: u32) -> Result<Image> {
    if max_dimension == 0 {
        return Err(MockupError::InvalidArgument(
            "max_dimension must be > 0".to_string(),
        ));
    }
    let (w, h) = image.dimensions();
    if w <= max_dimension && h <= max_dimension {
        return Ok(image.clone());
    }
    let (target_w, target_h) = fit_inside(w, h, max_dimension);
    tracing::debug!(
        "Bounding {}x{} image to {}x{}",
        w,
        h,
        target_w,
        target_h
    );
    resize(image, target_w, target_h)
}

fn fit_inside(w: u32, h: u32, max_dimension: u32) -> (u32, u32) {
    let scale = |side: u32, long: u32| -> u32 {
        ((side as u64 * max_dimension as u64 + long as u64 / 2) / long as u64).max(1) as u32
    };
    if w >= h {
        (max_dimension, scale(h, w))
    } else {
        (scale(w, h), max_dimension)
    }
}
