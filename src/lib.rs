//! Pattern mockups: print a flat design onto the masked region of a photo
//! while keeping the photo's own shading.

pub mod blend;
pub mod compositor;
pub mod config;
pub mod error;
pub mod mask;
pub mod mask_source;
pub mod raster;
pub mod resample;
pub mod server;

pub use blend::{blend, BlendMode, BlendSpec};
pub use compositor::{CompositorConfig, RenderRequest, ShadingMapCompositor, Stages};
pub use error::{MockupError, Result};
pub use mask::{make_mask, Mask, MaskParams};
pub use raster::{Channels, Image};
