use image::{DynamicImage, ImageBuffer, ImageFormat};
use std::io::Cursor;

use crate::error::{MockupError, Result};

/// Pixel layout of an [`Image`]. All layouts are 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Gray,
    Rgb,
    Rgba,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::Gray => 1,
            Channels::Rgb => 3,
            Channels::Rgba => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        self == Channels::Rgba
    }
}

/// Decoded, row-major pixel buffer. Never mutated after construction;
/// every transform below returns a fresh `Image`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    channels: Channels,
    data: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MockupError::InvalidArgument(format!(
                "image dimensions must be > 0, got {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * channels.count();
        if data.len() != expected {
            return Err(MockupError::InvalidArgument(format!(
                "pixel buffer holds {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                channels,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Image where every pixel is `pixel` (which must have one value per channel).
    pub fn filled(width: u32, height: u32, channels: Channels, pixel: &[u8]) -> Result<Self> {
        if pixel.len() != channels.count() {
            return Err(MockupError::InvalidArgument(format!(
                "fill pixel has {} values, {:?} needs {}",
                pixel.len(),
                channels,
                channels.count()
            )));
        }
        let data = pixel.repeat(width as usize * height as usize);
        Self::new(width, height, channels, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        debug_assert!(
            x < self.width && y < self.height,
            "pixel ({}, {}) out of bounds for {}x{}",
            x,
            y,
            self.width,
            self.height
        );
        let n = self.channels.count();
        let start = (y as usize * self.width as usize + x as usize) * n;
        &self.data[start..start + n]
    }

    pub(crate) fn from_dynamic(img: DynamicImage) -> Result<Self> {
        let (width, height) = (img.width(), img.height());
        match img {
            DynamicImage::ImageLuma8(buf) => Self::new(width, height, Channels::Gray, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => Self::new(width, height, Channels::Rgb, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => Self::new(width, height, Channels::Rgba, buf.into_raw()),
            // Luma+alpha, 16-bit and float sources collapse onto the three 8-bit layouts
            other if other.color().has_alpha() => {
                Self::new(width, height, Channels::Rgba, other.to_rgba8().into_raw())
            }
            other if other.color().has_color() => {
                Self::new(width, height, Channels::Rgb, other.to_rgb8().into_raw())
            }
            other => Self::new(width, height, Channels::Gray, other.to_luma8().into_raw()),
        }
    }

    pub(crate) fn to_dynamic(&self) -> Result<DynamicImage> {
        let (w, h) = (self.width, self.height);
        let data = self.data.clone();
        let img = match self.channels {
            Channels::Gray => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            Channels::Rgb => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            Channels::Rgba => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
        };
        img.ok_or_else(|| {
            MockupError::InvalidArgument(format!("pixel buffer does not fit {}x{}", w, h))
        })
    }
}

/// Decode an encoded raster (PNG, JPEG, ...) into an [`Image`].
pub fn decode(bytes: &[u8]) -> Result<Image> {
    let img = image::load_from_memory(bytes).map_err(|e| MockupError::Decode(e.to_string()))?;
    if img.width() == 0 || img.height() == 0 {
        return Err(MockupError::Decode("image has zero width or height".to_string()));
    }
    Image::from_dynamic(img)
}

/// Encode an [`Image`] in the given container format.
/// JPEG has no alpha channel, so RGBA input is flattened to RGB first.
pub fn encode(image: &Image, format: ImageFormat) -> Result<Vec<u8>> {
    let mut dynamic = image.to_dynamic()?;
    if format == ImageFormat::Jpeg && image.channels().has_alpha() {
        dynamic = DynamicImage::ImageRgb8(dynamic.to_rgb8());
    }
    let mut out = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut out, format)
        .map_err(|e| MockupError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// ITU-R BT.601 luma, rounded to the nearest 8-bit value.
pub(crate) fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Single-channel luminance of `image`. Alpha is ignored.
pub fn to_grayscale(image: &Image) -> Image {
    let n = image.channels().count();
    if n == 1 {
        return image.clone();
    }
    let data = image
        .data()
        .chunks_exact(n)
        .map(|px| luma(px[0], px[1], px[2]))
        .collect();
    Image {
        width: image.width,
        height: image.height,
        channels: Channels::Gray,
        data,
    }
}

/// Binarize a gray image: 255 where value >= `level`, else 0.
pub fn threshold(image: &Image, level: u8) -> Result<Image> {
    if image.channels() != Channels::Gray {
        return Err(MockupError::InvalidArgument(format!(
            "threshold needs a single-channel image, got {:?}",
            image.channels()
        )));
    }
    let data = image
        .data()
        .iter()
        .map(|&v| if v >= level { 255 } else { 0 })
        .collect();
    Ok(Image {
        width: image.width,
        height: image.height,
        channels: image.channels,
        data,
    })
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Separable box blur with a `2 * radius + 1` window and replicated edges.
pub fn blur(image: &Image, radius: u32) -> Image {
    if radius == 0 {
        return image.clone();
    }
    let horizontal = box_pass(image, image.data(), radius, Axis::Horizontal);
    let data = box_pass(image, &horizontal, radius, Axis::Vertical);
    Image {
        width: image.width,
        height: image.height,
        channels: image.channels,
        data,
    }
}

fn box_pass(shape: &Image, src: &[u8], radius: u32, axis: Axis) -> Vec<u8> {
    let w = shape.width() as usize;
    let h = shape.height() as usize;
    let n = shape.channels().count();
    let (len, lines) = match axis {
        Axis::Horizontal => (w, h),
        Axis::Vertical => (h, w),
    };
    let index = |line: usize, pos: usize| match axis {
        Axis::Horizontal => (line * w + pos) * n,
        Axis::Vertical => (pos * w + line) * n,
    };
    let r = radius as isize;
    let window = 2 * radius as u64 + 1;
    let last = len as isize - 1;

    let mut out = vec![0u8; src.len()];
    for line in 0..lines {
        for c in 0..n {
            let sample = |pos: isize| src[index(line, pos.clamp(0, last) as usize) + c] as u64;
            let mut sum: u64 = (-r..=r).map(sample).sum();
            for pos in 0..len {
                out[index(line, pos) + c] = ((sum + window / 2) / window) as u8;
                let p = pos as isize;
                sum = sum + sample(p + r + 1) - sample(p - r);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gray(width: u32, height: u32, data: Vec<u8>) -> Image {
        Image::new(width, height, Channels::Gray, data).unwrap()
    }

    #[test]
    fn new_rejects_wrong_buffer_length() {
        let err = Image::new(2, 2, Channels::Rgb, vec![0; 11]).unwrap_err();
        assert!(matches!(err, MockupError::InvalidArgument(_)));
        let err = Image::new(0, 2, Channels::Gray, vec![]).unwrap_err();
        assert!(matches!(err, MockupError::InvalidArgument(_)));
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let data: Vec<u8> = (0..4 * 3 * 4).map(|i| (i * 7 % 256) as u8).collect();
        let img = Image::new(4, 3, Channels::Rgba, data).unwrap();
        let bytes = encode(&img, ImageFormat::Png).unwrap();
        assert_eq!(decode(&bytes).unwrap(), img);
    }

    #[test]
    fn jpeg_encode_drops_alpha() {
        let img = Image::filled(8, 8, Channels::Rgba, &[200, 10, 10, 128]).unwrap();
        let bytes = encode(&img, ImageFormat::Jpeg).unwrap();
        assert_eq!(decode(&bytes).unwrap().channels(), Channels::Rgb);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"definitely not a png").unwrap_err();
        assert!(matches!(err, MockupError::Decode(_)));
    }

    #[test]
    fn grayscale_uses_bt601_weights() {
        let img = Image::new(3, 1, Channels::Rgb, vec![255, 0, 0, 0, 255, 0, 0, 0, 255]).unwrap();
        let g = to_grayscale(&img);
        assert_eq!(g.channels(), Channels::Gray);
        assert_eq!(g.data(), &[76, 150, 29]);
    }

    #[test]
    fn grayscale_ignores_alpha() {
        let img = Image::filled(2, 2, Channels::Rgba, &[100, 100, 100, 0]).unwrap();
        assert_eq!(to_grayscale(&img).data(), &[100; 4]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let img = gray(4, 1, vec![0, 127, 128, 255]);
        assert_eq!(threshold(&img, 128).unwrap().data(), &[0, 0, 255, 255]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn pixel_outside_the_image_panics() {
        let img = gray(2, 2, vec![1, 2, 3, 4]);
        // (2, 0) would land on the second row's first byte without the bounds check
        img.pixel(2, 0);
    }

    #[test]
    fn threshold_requires_gray() {
        let img = Image::filled(1, 1, Channels::Rgb, &[1, 2, 3]).unwrap();
        assert!(matches!(
            threshold(&img, 128),
            Err(MockupError::InvalidArgument(_))
        ));
    }

    #[test]
    fn blur_radius_zero_is_identity() {
        let img = gray(3, 1, vec![0, 255, 0]);
        assert_eq!(blur(&img, 0), img);
    }

    #[test]
    fn blur_softens_a_hard_edge() {
        // 4x1 step: left half black, right half white
        let img = gray(4, 1, vec![0, 0, 255, 255]);
        let out = blur(&img, 1);
        // Horizontal window of 3 with clamped borders; vertical pass is a no-op on one row
        assert_eq!(out.data(), &[0, 85, 170, 255]);
    }

    #[test]
    fn blur_keeps_flat_images_flat() {
        let img = Image::filled(5, 4, Channels::Rgb, &[12, 200, 77]).unwrap();
        assert_eq!(blur(&img, 2), img);
    }

    #[test]
    fn blur_window_wider_than_u32_sum_does_not_overflow() {
        // 255 * (2r + 1) exceeds u32::MAX at this radius
        let img = Image::filled(2, 1, Channels::Gray, &[255]).unwrap();
        assert_eq!(blur(&img, 8_500_000).data(), &[255, 255]);
    }

    proptest! {
        #[test]
        fn threshold_output_is_binary(
            data in proptest::collection::vec(any::<u8>(), 1..64),
            level in 1u8..=254,
        ) {
            let img = gray(data.len() as u32, 1, data.clone());
            let out = threshold(&img, level).unwrap();
            for (&v, &t) in data.iter().zip(out.data()) {
                prop_assert!(t == 0 || t == 255);
                prop_assert_eq!(t == 255, v >= level);
            }
        }
    }
}
