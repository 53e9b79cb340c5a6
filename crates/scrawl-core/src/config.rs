//! Runtime configuration for the digit pipeline.
//!
//! `ScrawlConfig` is read from JSON. Every field has a default, so an empty
//! object `{}` is a valid config describing the classic 280px canvas and
//! 28px MNIST-style model input.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::normalize::ResampleFilter;

/// Default canvas side length in pixels.
pub const DEFAULT_CANVAS_SIDE: u32 = 280;
/// Default model input side length in pixels.
pub const DEFAULT_MODEL_SIDE: u32 = 28;
/// Intensity of the background (white).
pub const DEFAULT_BACKGROUND: u8 = 255;
/// Intensity of the ink (black).
pub const DEFAULT_INK: u8 = 0;
/// Smallest brush size the size control accepts.
pub const MIN_BRUSH_SIZE: u32 = 4;
/// Largest brush size the size control accepts.
pub const MAX_BRUSH_SIZE: u32 = 40;
/// Brush size at startup.
pub const DEFAULT_BRUSH_SIZE: u32 = 12;
/// Number of digit classes.
pub const DEFAULT_NUM_CLASSES: usize = 10;
/// Inference timeout in milliseconds.
const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 10_000;

/// Canvas raster settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Side length of the square canvas.
    pub side: u32,
    /// Value written by `clear()` and by the background brush.
    pub background: u8,
    /// Value written by the ink brush.
    pub ink: u8,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            side: DEFAULT_CANVAS_SIDE,
            background: DEFAULT_BACKGROUND,
            ink: DEFAULT_INK,
        }
    }
}

/// Brush settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    /// Initial brush size (diameter). Clamped to `[MIN_BRUSH_SIZE, MAX_BRUSH_SIZE]`.
    pub size: u32,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_BRUSH_SIZE,
        }
    }
}

/// Normalizer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Side length of the model tensor.
    pub model_side: u32,
    /// Downsampling rule.
    pub resample: ResampleFilter,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            model_side: DEFAULT_MODEL_SIDE,
            resample: ResampleFilter::Area,
        }
    }
}

/// Inference settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Upper bound on a single classification, in milliseconds.
    pub timeout_ms: u64,
    /// Number of classes the engine is expected to score.
    pub num_classes: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_INFERENCE_TIMEOUT_MS,
            num_classes: DEFAULT_NUM_CLASSES,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrawlConfig {
    pub canvas: CanvasConfig,
    pub brush: BrushConfig,
    pub normalizer: NormalizerConfig,
    pub inference: InferenceConfig,
}

impl ScrawlConfig {
    /// Parse a config from JSON text and validate it.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&text)?;
        config.apply_env_overrides();
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SCRAWL_CANVAS_SIDE` and `SCRAWL_INFERENCE_TIMEOUT_MS` if set.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(side) = env_override("SCRAWL_CANVAS_SIDE") {
            self.canvas.side = side;
        }
        if let Some(timeout) = env_override("SCRAWL_INFERENCE_TIMEOUT_MS") {
            self.inference.timeout_ms = timeout;
        }
    }

    /// Reject configurations that would break the raster or tensor invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.canvas.side == 0 {
            return Err(ConfigError::Invalid("canvas.side must be non-zero".into()));
        }
        if self.normalizer.model_side == 0 {
            return Err(ConfigError::Invalid(
                "normalizer.model_side must be non-zero".into(),
            ));
        }
        if self.canvas.ink == self.canvas.background {
            return Err(ConfigError::Invalid(format!(
                "canvas.ink and canvas.background are both {}",
                self.canvas.ink
            )));
        }
        if self.inference.num_classes == 0 {
            return Err(ConfigError::Invalid(
                "inference.num_classes must be non-zero".into(),
            ));
        }
        if self.inference.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "inference.timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Inference timeout as a `Duration`.
    pub fn inference_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.inference.timeout_ms)
    }
}

fn env_override<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {key}={raw}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config = ScrawlConfig::from_json_str("{}").expect("empty config is valid");
        assert_eq!(config, ScrawlConfig::default());
        assert_eq!(config.canvas.side, 280);
        assert_eq!(config.normalizer.model_side, 28);
        assert_eq!(config.brush.size, 12);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = ScrawlConfig::from_json_str(r#"{"canvas": {"side": 140}}"#)
            .expect("partial config is valid");
        assert_eq!(config.canvas.side, 140);
        assert_eq!(config.canvas.background, DEFAULT_BACKGROUND);
        assert_eq!(config.normalizer, NormalizerConfig::default());
    }

    #[test]
    fn test_resample_filter_parses_lowercase() {
        let config =
            ScrawlConfig::from_json_str(r#"{"normalizer": {"resample": "nearest"}}"#)
                .expect("valid config");
        assert_eq!(config.normalizer.resample, ResampleFilter::Nearest);
    }

    #[test]
    fn test_zero_canvas_side_is_rejected() {
        let err = ScrawlConfig::from_json_str(r#"{"canvas": {"side": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn test_identical_ink_and_background_is_rejected() {
        let err = ScrawlConfig::from_json_str(r#"{"canvas": {"ink": 255, "background": 255}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("both 255"), "{err}");
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scrawl.json");
        std::fs::write(&path, r#"{"inference": {"num_classes": 10}}"#).expect("write");
        let config = ScrawlConfig::load(&path).expect("config loads");
        assert_eq!(config.inference.num_classes, 10);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ScrawlConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
