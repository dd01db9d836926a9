use serde::Deserialize;
use std::path::Path;

use crate::compositor::{CompositorConfig, DEFAULT_FINAL_OPACITY, DEFAULT_MAX_DIMENSION};
use crate::mask::{MaskParams, DEFAULT_BLUR_RADIUS, DEFAULT_THRESHOLD};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub compositor: CompositorSettings,
    pub mask_service: Option<MaskServiceConfig>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            log_level: default_log_level(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_body_limit() -> usize {
    20 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompositorSettings {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_mask_threshold")]
    pub mask_threshold: u8,
    #[serde(default = "default_blur_radius")]
    pub blur_radius: u32,
    #[serde(default = "default_final_opacity")]
    pub final_opacity: f32,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            mask_threshold: default_mask_threshold(),
            blur_radius: default_blur_radius(),
            final_opacity: default_final_opacity(),
        }
    }
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

fn default_mask_threshold() -> u8 {
    DEFAULT_THRESHOLD
}

fn default_blur_radius() -> u32 {
    DEFAULT_BLUR_RADIUS
}

fn default_final_opacity() -> f32 {
    DEFAULT_FINAL_OPACITY
}

impl CompositorSettings {
    pub fn to_config(&self) -> CompositorConfig {
        CompositorConfig {
            max_dimension: self.max_dimension,
            mask: MaskParams {
                threshold: self.mask_threshold,
                blur_radius: self.blur_radius,
            },
            final_opacity: self.final_opacity,
        }
    }
}

/// Remote segmentation service that turns a photo plus a text prompt into a mask.
#[derive(Debug, Clone, Deserialize)]
pub struct MaskServiceConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub api_token: String,
    /// Model version id sent with every prediction.
    pub model_version: String,
    /// What to segment when the request does not say ("shirt", "sofa", ...).
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.replicate.com/v1".to_string()
}

fn default_prompt() -> String {
    "shirt".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_polls() -> u32 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    /// Like [`Config::load`], but a missing file yields the built-in defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.settings.port == 0 {
            anyhow::bail!("settings.port must be > 0");
        }
        if self.settings.body_limit_bytes == 0 {
            anyhow::bail!("settings.body_limit_bytes must be > 0");
        }
        let c = &self.compositor;
        if c.max_dimension == 0 {
            anyhow::bail!("compositor.max_dimension must be > 0");
        }
        if c.blur_radius > c.max_dimension {
            anyhow::bail!(
                "compositor.blur_radius must be <= max_dimension ({}), got {}",
                c.max_dimension,
                c.blur_radius
            );
        }
        if !(0.0..=1.0).contains(&c.final_opacity) {
            anyhow::bail!("compositor.final_opacity must be 0.0–1.0");
        }
        if let Some(ref svc) = self.mask_service {
            if svc.api_token.trim().is_empty() {
                anyhow::bail!("mask_service.api_token must not be empty");
            }
            if svc.model_version.trim().is_empty() {
                anyhow::bail!("mask_service.model_version must not be empty");
            }
            if svc.poll_interval_ms == 0 || svc.max_polls == 0 {
                anyhow::bail!("mask_service.poll_interval_ms and max_polls must be > 0");
            }
        }
        Ok(())
    }
}
