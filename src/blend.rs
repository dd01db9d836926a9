use crate::error::{MockupError, Result};
use crate::mask::Mask;
use crate::raster::{Channels, Image};

/// Per-pixel rule combining a base and an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// a * b
    Multiply,
    /// 1 - (1 - a)(1 - b)
    Screen,
    /// Multiply below mid-gray base, screen above
    Overlay,
    /// Photoshop / W3C soft light, with the base steering the curve
    SoftLight,
    /// Source-over of the overlay onto the base
    Over,
    /// Keep base colour, multiply base alpha by overlay coverage
    DestIn,
}

impl BlendMode {
    pub fn name(self) -> &'static str {
        match self {
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Over => "over",
            BlendMode::DestIn => "dest-in",
        }
    }

    /// Separable colour formula on normalized values; only meaningful for
    /// the four per-channel modes.
    fn channel(self, a: f32, b: f32) -> f32 {
        match self {
            BlendMode::Multiply => a * b,
            BlendMode::Screen => 1.0 - (1.0 - a) * (1.0 - b),
            BlendMode::Overlay => {
                if a < 0.5 {
                    2.0 * a * b
                } else {
                    1.0 - 2.0 * (1.0 - a) * (1.0 - b)
                }
            }
            BlendMode::SoftLight => {
                if a < 0.5 {
                    b - (1.0 - 2.0 * a) * b * (1.0 - b)
                } else {
                    b + (2.0 * a - 1.0) * (soft_light_curve(b) - b)
                }
            }
            BlendMode::Over | BlendMode::DestIn => b,
        }
    }

    fn apply(self, a: Px, b: Px, b_raw: &[u8]) -> Px {
        match self {
            BlendMode::Multiply | BlendMode::Screen | BlendMode::Overlay | BlendMode::SoftLight => [
                self.channel(a[0], b[0]),
                self.channel(a[1], b[1]),
                self.channel(a[2], b[2]),
                a[3],
            ],
            BlendMode::Over => {
                let sa = b[3];
                let da = a[3];
                let out_a = sa + da * (1.0 - sa);
                if out_a <= 0.0 {
                    return [0.0; 4];
                }
                let over = |s: f32, d: f32| (s * sa + d * da * (1.0 - sa)) / out_a;
                [over(b[0], a[0]), over(b[1], a[1]), over(b[2], a[2]), out_a]
            }
            BlendMode::DestIn => [a[0], a[1], a[2], a[3] * coverage(b_raw)],
        }
    }
}

fn soft_light_curve(b: f32) -> f32 {
    if b <= 0.25 {
        ((16.0 * b - 12.0) * b + 4.0) * b
    } else {
        b.sqrt()
    }
}

/// One blend invocation: mode, scalar opacity and optional coverage mask.
#[derive(Debug, Clone, Copy)]
pub struct BlendSpec<'m> {
    pub mode: BlendMode,
    pub opacity: f32,
    pub mask: Option<&'m Mask>,
}

impl<'m> BlendSpec<'m> {
    pub fn new(mode: BlendMode) -> Self {
        Self {
            mode,
            opacity: 1.0,
            mask: None,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_mask(mut self, mask: &'m Mask) -> Self {
        self.mask = Some(mask);
        self
    }
}

/// Normalized RGBA working pixel.
type Px = [f32; 4];

fn load(px: &[u8]) -> Px {
    let n = |v: u8| v as f32 / 255.0;
    match px.len() {
        1 => [n(px[0]), n(px[0]), n(px[0]), 1.0],
        3 => [n(px[0]), n(px[1]), n(px[2]), 1.0],
        _ => [n(px[0]), n(px[1]), n(px[2]), n(px[3])],
    }
}

fn load_luma(px: &[u8]) -> Px {
    if px.len() == 1 {
        return load(px);
    }
    let l = crate::raster::luma(px[0], px[1], px[2]) as f32 / 255.0;
    let a = if px.len() == 4 { px[3] as f32 / 255.0 } else { 1.0 };
    [l, l, l, a]
}

/// How much of the base an overlay pixel keeps under `dest-in`:
/// gray value for masks, alpha for RGBA, everything for RGB.
fn coverage(px: &[u8]) -> f32 {
    match px.len() {
        1 => px[0] as f32 / 255.0,
        4 => px[3] as f32 / 255.0,
        _ => 1.0,
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    if t <= 0.0 {
        from
    } else if t >= 1.0 {
        to
    } else {
        from + (to - from) * t
    }
}

fn check_dimensions(base: &Image, what: &'static str, other: (u32, u32)) -> Result<()> {
    let (base_w, base_h) = base.dimensions();
    if (base_w, base_h) != other {
        return Err(MockupError::DimensionMismatch {
            what,
            base_w,
            base_h,
            other_w: other.0,
            other_h: other.1,
        });
    }
    Ok(())
}

/// Blend `overlay` onto `base`.
///
/// The raw mode formula is applied first, then the result is pulled back
/// towards the base by the mask coverage, then again by the opacity. The
/// output keeps the base's channel layout, except `dest-in`, which always
/// returns RGBA so the carved alpha survives.
pub fn blend(base: &Image, overlay: &Image, spec: &BlendSpec) -> Result<Image> {
    check_dimensions(base, "overlay", overlay.dimensions())?;
    if let Some(mask) = spec.mask {
        check_dimensions(base, "mask", mask.dimensions())?;
    }
    if !(0.0..=1.0).contains(&spec.opacity) {
        return Err(MockupError::InvalidArgument(format!(
            "opacity must be 0.0–1.0, got {}",
            spec.opacity
        )));
    }

    let out_channels = match spec.mode {
        BlendMode::DestIn => Channels::Rgba,
        _ => base.channels(),
    };
    let out_n = out_channels.count();
    let gray_out = out_channels == Channels::Gray;

    let base_px = base.data().chunks_exact(base.channels().count());
    let overlay_px = overlay.data().chunks_exact(overlay.channels().count());

    let mut data = Vec::with_capacity(base.width() as usize * base.height() as usize * out_n);
    for (i, (a_raw, b_raw)) in base_px.zip(overlay_px).enumerate() {
        let a = load(a_raw);
        let b = if gray_out { load_luma(b_raw) } else { load(b_raw) };
        let blended = spec.mode.apply(a, b, b_raw);
        let weight = spec
            .mask
            .map(|m| m.coverage_at(i) as f32 / 255.0)
            .unwrap_or(1.0);

        let mut out = [0.0f32; 4];
        for k in 0..4 {
            let masked = lerp(a[k], blended[k], weight);
            out[k] = lerp(a[k], masked, spec.opacity);
        }

        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        match out_n {
            1 => data.push(to_u8(out[0])),
            3 => data.extend(out[..3].iter().map(|&v| to_u8(v))),
            _ => data.extend(out.iter().map(|&v| to_u8(v))),
        }
    }

    Image::new(base.width(), base.height(), out_channels, data)
}
