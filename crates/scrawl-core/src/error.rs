//! Error taxonomy for the digit pipeline.
//!
//! Each stage owns a narrow error type; [`ScrawlError`] folds them together
//! at the controller boundary where every failure is recovered.

use std::path::PathBuf;

/// An uploaded image could not be turned into a canvas raster.
#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// The normalizer was handed a raster it cannot downsample.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("raster is empty")]
    EmptyRaster,
    #[error("model resolution must be non-zero")]
    ZeroResolution,
    #[error("raster holds {actual} pixels, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("background and ink are both {level}")]
    IndistinctLevels { level: u8 },
}

/// Failure modes of the classifier boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("model not loaded")]
    ModelUnavailable,
    #[error("inference failed: {0}")]
    Inference(String),
}

/// The engine produced output that cannot be interpreted as a distribution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedDistribution {
    #[error("distribution is empty")]
    Empty,
    #[error("distribution holds non-finite score {value} at index {index}")]
    NonFinite { index: usize, value: f32 },
    #[error("distribution holds {actual} scores, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
}

/// Invalid or unreadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Umbrella error surfaced by the pipeline controller.
#[derive(Debug, thiserror::Error)]
pub enum ScrawlError {
    #[error(transparent)]
    ImageLoad(#[from] ImageLoadError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("malformed distribution: {0}")]
    MalformedDistribution(#[from] MalformedDistribution),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ScrawlError {
    /// Short status-bar text for this failure.
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::ImageLoad(_) => "Image load error",
            Self::Normalize(_) => "Prediction error",
            Self::Classify(ClassifyError::ModelUnavailable) => {
                "Prediction failed: model not loaded"
            }
            Self::Classify(ClassifyError::Inference(_)) => "Prediction error",
            Self::MalformedDistribution(_) => "Prediction error",
            Self::Config(_) => "Configuration error",
        }
    }
}
