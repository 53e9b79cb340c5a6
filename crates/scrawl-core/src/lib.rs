//! Scrawl Core: domain layer for handwritten digit capture and recognition.
//!
//! This crate owns the stroke canvas, canvas-to-tensor normalization, the
//! inference-engine boundary, and result interpretation. No async runtime or
//! UI dependencies.

pub mod canvas;
pub mod classifier;
pub mod config;
pub mod error;
pub mod interpret;
pub mod normalize;

// Re-exports for convenience.
pub use canvas::{BrushState, Intensity, Raster, StrokeCanvasBuffer, StrokePoint};
pub use classifier::{ClassifierAdapter, EngineError, InferenceEngine};
pub use config::ScrawlConfig;
pub use error::{
    ClassifyError, ConfigError, ImageLoadError, MalformedDistribution, NormalizeError,
    ScrawlError,
};
pub use interpret::{PredictionResult, ProbabilityDistribution, ResultInterpreter};
pub use normalize::{ImageNormalizer, ResampleFilter, Tensor};
