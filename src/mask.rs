use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{MockupError, Result};
use crate::raster::{self, Image};
use crate::resample;

pub const DEFAULT_THRESHOLD: u8 = 128;
pub const DEFAULT_BLUR_RADIUS: u32 = 1;

/// Single-channel coverage map, 0 = untouched, 255 = fully covered.
/// Only [`make_mask`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(Image);

impl Mask {
    pub fn image(&self) -> &Image {
        &self.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub(crate) fn coverage_at(&self, index: usize) -> u8 {
        self.0.data()[index]
    }

    #[cfg(test)]
    pub(crate) fn from_coverage(width: u32, height: u32, coverage: Vec<u8>) -> Self {
        Mask(Image::new(width, height, crate::raster::Channels::Gray, coverage).unwrap())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaskParams {
    pub threshold: u8,
    pub blur_radius: u32,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            blur_radius: DEFAULT_BLUR_RADIUS,
        }
    }
}

/// Turn an arbitrary raw mask into a soft-edged coverage map of the given size.
///
/// The raw input is resized, reduced to luminance and thresholded to a hard
/// in/out decision, then blurred so the composite edge is not aliased.
pub fn make_mask(raw: Option<&Image>, width: u32, height: u32, params: MaskParams) -> Result<Mask> {
    let raw = raw.ok_or_else(|| MockupError::MissingMask("no mask was supplied".to_string()))?;
    let resized = resample::resize(raw, width, height)?;
    let gray = raster::to_grayscale(&resized);
    let binary = raster::threshold(&gray, params.threshold)?;
    Ok(Mask(raster::blur(&binary, params.blur_radius)))
}

/// Strip a `data:image/<type>;base64,` prefix and decode the payload.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let data_url = data_url.trim();
    if data_url.is_empty() {
        return Err(MockupError::MissingMask("mask data URL is empty".to_string()));
    }
    let payload = strip_image_prefix(data_url).ok_or_else(|| {
        MockupError::MissingMask("mask must be a data:image/<type>;base64, URL".to_string())
    })?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| MockupError::MissingMask(format!("mask is not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(MockupError::MissingMask("mask payload is empty".to_string()));
    }
    Ok(bytes)
}

fn strip_image_prefix(data_url: &str) -> Option<&str> {
    let rest = data_url.strip_prefix("data:image/")?;
    let (kind, payload) = rest.split_once(";base64,")?;
    let word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    if kind.is_empty() || !kind.chars().all(word) {
        return None;
    }
    Some(payload)
}

/// Encode bytes as a `data:image/<kind>;base64,` URL.
pub fn to_data_url(kind: &str, bytes: &[u8]) -> String {
    format!("data:image/{};base64,{}", kind, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Channels;

    #[test]
    fn missing_raw_mask_is_reported() {
        let err = make_mask(None, 4, 4, MaskParams::default()).unwrap_err();
        assert!(matches!(err, MockupError::MissingMask(_)));
    }

    #[test]
    fn mask_matches_requested_size_and_is_single_channel() {
        let raw = Image::filled(7, 3, Channels::Rgba, &[255, 255, 255, 255]).unwrap();
        let mask = make_mask(Some(&raw), 20, 10, MaskParams::default()).unwrap();
        assert_eq!(mask.dimensions(), (20, 10));
        assert_eq!(mask.image().channels(), Channels::Gray);
        assert!(mask.image().data().iter().all(|&v| v == 255));
    }

    #[test]
    fn dim_regions_are_cut_by_threshold() {
        let raw = Image::filled(4, 4, Channels::Rgb, &[127, 127, 127]).unwrap();
        let mask = make_mask(Some(&raw), 4, 4, MaskParams::default()).unwrap();
        assert!(mask.image().data().iter().all(|&v| v == 0));
    }

    #[test]
    fn edge_is_softened_by_blur() {
        // Left column black, right three white
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&[0, 255, 255, 255]);
        }
        let raw = Image::new(4, 4, Channels::Gray, data).unwrap();
        let mask = make_mask(Some(&raw), 4, 4, MaskParams::default()).unwrap();
        assert_eq!(mask.image().pixel(0, 0), &[85]);
        assert_eq!(mask.image().pixel(1, 2), &[170]);
        assert_eq!(mask.image().pixel(3, 3), &[255]);

        let hard = MaskParams {
            blur_radius: 0,
            ..MaskParams::default()
        };
        let mask = make_mask(Some(&raw), 4, 4, hard).unwrap();
        assert_eq!(mask.image().pixel(0, 0), &[0]);
    }

    #[test]
    fn data_url_round_trip() {
        let url = to_data_url("png", b"\x89PNG fake");
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_url(&url).unwrap(), b"\x89PNG fake");
    }

    #[test]
    fn data_url_requires_image_prefix() {
        for bad in [
            "",
            "   ",
            "aGVsbG8=",
            "data:text/plain;base64,aGVsbG8=",
            "data:image/;base64,aGVsbG8=",
            "data:image/svg+xml;base64,aGVsbG8=",
            "data:image/png,aGVsbG8=",
            "data:image/png;base64,!!!not base64!!!",
            "data:image/png;base64,",
        ] {
            let err = decode_data_url(bad).unwrap_err();
            assert!(
                matches!(err, MockupError::MissingMask(_)),
                "expected MissingMask for {:?}, got {:?}",
                bad,
                err
            );
        }
    }
}
