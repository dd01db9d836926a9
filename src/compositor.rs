use image::ImageFormat;
use std::time::Instant;

use crate::blend::{blend, BlendMode, BlendSpec};
use crate::error::{MockupError, Result};
use crate::mask::{self, Mask, MaskParams};
use crate::raster::{self, Image};
use crate::resample;

pub const DEFAULT_MAX_DIMENSION: u32 = 1024;
pub const DEFAULT_FINAL_OPACITY: f32 = 0.8;

/// Knobs of the shading-map pipeline.
#[derive(Debug, Clone, Copy)]
pub struct CompositorConfig {
    /// Longest side any input may have before it enters the pipeline.
    pub max_dimension: u32,
    pub mask: MaskParams,
    /// Opacity of the final soft-light pass over the original.
    pub final_opacity: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            mask: MaskParams::default(),
            final_opacity: DEFAULT_FINAL_OPACITY,
        }
    }
}

/// Every intermediate image produced for one request.
#[derive(Debug, Clone)]
pub struct Stages {
    pub pattern: Image,
    pub mask: Mask,
    pub object_region: Image,
    pub shading_map: Image,
    pub shaded_pattern: Image,
    pub composited: Image,
    pub result: Image,
}

/// Encoded inputs of a single mockup request.
pub struct RenderRequest<'a> {
    pub original: &'a [u8],
    pub pattern: &'a [u8],
    pub mask: Option<&'a [u8]>,
    pub format: ImageFormat,
}

#[derive(Debug, Clone)]
pub struct ShadingMapCompositor {
    config: CompositorConfig,
}

impl ShadingMapCompositor {
    pub fn new(config: CompositorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Print `pattern` onto the masked part of `original`.
    pub fn compose(&self, original: &Image, pattern: &Image, raw_mask: Option<&Image>) -> Result<Image> {
        Ok(self.compose_stages(original, pattern, raw_mask)?.result)
    }

    /// Run the pipeline and keep every intermediate image.
    ///
    /// 1. Bring pattern and mask to the original's size.
    /// 2. Cut the masked object out of the original (`dest-in`).
    /// 3. Reduce it to luminance: the shading map.
    /// 4. Multiply the pattern by the shading map.
    /// 5. Paint the shaded pattern over the original through the mask.
    /// 6. Soft-light the result back onto the original at `final_opacity`.
    pub fn compose_stages(
        &self,
        original: &Image,
        pattern: &Image,
        raw_mask: Option<&Image>,
    ) -> Result<Stages> {
        let started = Instant::now();
        let (w, h) = original.dimensions();

        let mask = mask::make_mask(raw_mask, w, h, self.config.mask)?;
        let pattern = resample::resize(pattern, w, h)?;
        tracing::debug!("Normalized pattern and mask to {}x{}", w, h);

        let object_region = blend(
            original,
            mask.image(),
            &BlendSpec::new(BlendMode::DestIn),
        )?;
        let shading_map = raster::to_grayscale(&object_region);
        tracing::debug!("Built shading map");

        let shaded_pattern = blend(
            &pattern,
            &shading_map,
            &BlendSpec::new(BlendMode::Multiply),
        )?;
        let composited = blend(
            original,
            &shaded_pattern,
            &BlendSpec::new(BlendMode::Over).with_mask(&mask),
        )?;

        let finish = BlendSpec::new(BlendMode::SoftLight).with_opacity(self.config.final_opacity);
        let result = blend(original, &composited, &finish)?;
        tracing::debug!(
            "Composited {}x{} mockup ({} at {:.2}) in {:?}",
            w,
            h,
            finish.mode.name(),
            finish.opacity,
            started.elapsed()
        );

        Ok(Stages {
            pattern,
            mask,
            object_region,
            shading_map,
            shaded_pattern,
            composited,
            result,
        })
    }

    /// Decode, bound, compose and re-encode one request.
    ///
    /// The mask is checked before anything else is decoded so a request
    /// without one fails without touching the photo or pattern.
    pub fn render(&self, request: &RenderRequest) -> Result<Vec<u8>> {
        let mask_bytes = request
            .mask
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| MockupError::MissingMask("no mask was supplied".to_string()))?;
        let raw_mask = raster::decode(mask_bytes).map_err(|e| match e {
            MockupError::Decode(msg) => MockupError::MissingMask(msg),
            other => other,
        })?;

        let original = resample::bound(&raster::decode(request.original)?, self.config.max_dimension)?;
        let pattern = resample::bound(&raster::decode(request.pattern)?, self.config.max_dimension)?;
        tracing::debug!(
            "Decoded original {:?}, pattern {:?}, mask {:?}",
            original.dimensions(),
            pattern.dimensions(),
            raw_mask.dimensions()
        );

        let result = self.compose(&original, &pattern, Some(&raw_mask))?;
        raster::encode(&result, request.format)
    }
}

impl Default for ShadingMapCompositor {
    fn default() -> Self {
        Self::new(CompositorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Channels;

    fn png(img: &Image) -> Vec<u8> {
        raster::encode(img, ImageFormat::Png).unwrap()
    }

    #[test]
    fn mid_gray_inputs_reduce_to_scalar_products() {
        let gray = Image::filled(100, 80, Channels::Rgb, &[128, 128, 128]).unwrap();
        let stages = ShadingMapCompositor::default()
            .compose_stages(&gray, &gray, Some(&gray))
            .unwrap();

        assert!(stages.mask.image().data().iter().all(|&v| v == 255));
        assert!(stages.object_region.data().chunks_exact(4).all(|px| px == [128, 128, 128, 255]));
        assert!(stages.shading_map.data().iter().all(|&v| v == 128));
        assert!(stages.shaded_pattern.data().iter().all(|&v| v == 64));
        assert!(stages.composited.data().iter().all(|&v| v == 64));

        let first = stages.result.data()[0];
        assert!(first < 128);
        assert!(stages.result.data().iter().all(|&v| v == first));
    }

    #[test]
    fn output_follows_original_layout() {
        let original = Image::filled(12, 9, Channels::Rgba, &[30, 60, 90, 255]).unwrap();
        let pattern = Image::filled(5, 5, Channels::Rgb, &[250, 0, 0]).unwrap();
        let raw_mask = Image::filled(3, 3, Channels::Gray, &[255]).unwrap();
        let out = ShadingMapCompositor::default()
            .compose(&original, &pattern, Some(&raw_mask))
            .unwrap();
        assert_eq!(out.dimensions(), (12, 9));
        assert_eq!(out.channels(), Channels::Rgba);
    }

    #[test]
    fn render_requires_mask_before_decoding() {
        let request = RenderRequest {
            original: b"not an image",
            pattern: b"also not an image",
            mask: None,
            format: ImageFormat::Png,
        };
        let err = ShadingMapCompositor::default().render(&request).unwrap_err();
        assert!(matches!(err, MockupError::MissingMask(_)));
    }

    #[test]
    fn undecodable_mask_counts_as_missing() {
        let photo = png(&Image::filled(4, 4, Channels::Rgb, &[1, 2, 3]).unwrap());
        let request = RenderRequest {
            original: &photo,
            pattern: &photo,
            mask: Some(b"garbage"),
            format: ImageFormat::Png,
        };
        let err = ShadingMapCompositor::default().render(&request).unwrap_err();
        assert!(matches!(err, MockupError::MissingMask(_)));
    }

    #[test]
    fn render_reports_bad_original() {
        let mask = png(&Image::filled(4, 4, Channels::Gray, &[255]).unwrap());
        let request = RenderRequest {
            original: b"broken",
            pattern: &mask,
            mask: Some(&mask),
            format: ImageFormat::Png,
        };
        let err = ShadingMapCompositor::default().render(&request).unwrap_err();
        assert!(matches!(err, MockupError::Decode(_)));
    }

    #[test]
    fn render_bounds_large_inputs() {
        let config = CompositorConfig {
            max_dimension: 32,
            ..CompositorConfig::default()
        };
        let photo = png(&Image::filled(128, 64, Channels::Rgb, &[90, 90, 90]).unwrap());
        let pattern = png(&Image::filled(10, 10, Channels::Rgb, &[200, 10, 10]).unwrap());
        let mask = png(&Image::filled(8, 8, Channels::Gray, &[255]).unwrap());
        let request = RenderRequest {
            original: &photo,
            pattern: &pattern,
            mask: Some(&mask),
            format: ImageFormat::Png,
        };
        let bytes = ShadingMapCompositor::new(config).render(&request).unwrap();
        assert_eq!(raster::decode(&bytes).unwrap().dimensions(), (32, 16));
    }
}
