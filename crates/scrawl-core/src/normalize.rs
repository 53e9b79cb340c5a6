//! Canvas-to-tensor normalization.
//!
//! The classifier expects a dark background with a bright digit, whatever
//! levels the canvas uses. Normalization downsamples the raster to the model
//! resolution and maps the canvas background to 0 and its ink to 1:
//!
//! ```text
//! normalized = (background - pixel) / (background - ink)
//! ```
//!
//! With the default levels (background 255, ink 0) this is the usual
//! `(255 - pixel) / 255` inversion.
//!
//! Downsampling is separable. `Area` weighs every source pixel by the exact
//! fraction of it covered by the output pixel's footprint, so a 280px canvas
//! maps to 28px by averaging 10x10 blocks.

use serde::{Deserialize, Serialize};

use crate::canvas::Raster;
use crate::config::{CanvasConfig, DEFAULT_BACKGROUND, DEFAULT_INK, NormalizerConfig};
use crate::error::NormalizeError;

/// Resampling rule used to reach the model resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleFilter {
    /// Box filter with fractional pixel coverage.
    #[default]
    Area,
    /// Source pixel under each output pixel center.
    Nearest,
}

/// Single-channel model input of shape `(side, side, 1)`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    side: usize,
    data: Vec<f32>,
}

impl Tensor {
    /// Wrap `data` as a `side x side x 1` tensor. `None` on length mismatch.
    pub fn from_data(side: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == side * side).then_some(Self { side, data })
    }

    /// `[height, width, channels]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.side, self.side, 1]
    }

    /// `[batch, height, width, channels]` with a batch of one.
    pub fn batched_shape(&self) -> [usize; 4] {
        [1, self.side, self.side, 1]
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Value at `row`, `col`, or `None` when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.side || col >= self.side {
            return None;
        }
        Some(self.data[row * self.side + col])
    }
}

/// Stateless transform from a canvas raster to a model tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageNormalizer {
    model_side: u32,
    filter: ResampleFilter,
    background: u8,
    ink: u8,
}

impl ImageNormalizer {
    /// Normalizer for a canvas with the default levels.
    pub fn new(model_side: u32, filter: ResampleFilter) -> Self {
        Self {
            model_side,
            filter,
            background: DEFAULT_BACKGROUND,
            ink: DEFAULT_INK,
        }
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        Self::new(config.model_side, config.resample)
    }

    /// Normalizer matched to the levels of the canvas it reads.
    pub fn for_canvas(config: &NormalizerConfig, canvas: &CanvasConfig) -> Self {
        Self::from_config(config).with_levels(canvas.background, canvas.ink)
    }

    /// Map `background` to 0 and `ink` to 1.
    pub fn with_levels(mut self, background: u8, ink: u8) -> Self {
        self.background = background;
        self.ink = ink;
        self
    }

    pub fn model_side(&self) -> u32 {
        self.model_side
    }

    pub fn filter(&self) -> ResampleFilter {
        self.filter
    }

    /// `(background, ink)` levels.
    pub fn levels(&self) -> (u8, u8) {
        (self.background, self.ink)
    }

    /// Downsample, invert, and reshape `raster` into a fresh tensor.
    pub fn normalize(&self, raster: &Raster) -> Result<Tensor, NormalizeError> {
        let src = raster.side() as usize;
        let dst = self.model_side as usize;
        if dst == 0 {
            return Err(NormalizeError::ZeroResolution);
        }
        if src == 0 {
            return Err(NormalizeError::EmptyRaster);
        }
        if self.background == self.ink {
            return Err(NormalizeError::IndistinctLevels {
                level: self.background,
            });
        }
        let pixels = raster.pixels();
        if pixels.len() != src * src {
            return Err(NormalizeError::SizeMismatch {
                expected: src * src,
                actual: pixels.len(),
            });
        }

        let weights = match self.filter {
            ResampleFilter::Area => area_weights(src, dst),
            ResampleFilter::Nearest => nearest_weights(src, dst),
        };
        // Each axis' weights sum to `src`, so the 2D weights sum to `src^2`.
        let total = (src * src) as f64;
        let background = f64::from(self.background);
        let span = background - f64::from(self.ink);

        let mut data = Vec::with_capacity(dst * dst);
        for row_taps in &weights {
            for col_taps in &weights {
                let mut acc = 0_u64;
                for &(sy, wy) in row_taps {
                    let line = &pixels[sy * src..(sy + 1) * src];
                    for &(sx, wx) in col_taps {
                        acc += wy * wx * line[sx] as u64;
                    }
                }
                let value = acc as f64 / total;
                data.push(((background - value) / span).clamp(0.0, 1.0) as f32);
            }
        }

        Ok(Tensor { side: dst, data })
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::from_config(&NormalizerConfig::default())
    }
}

/// Per output index, the source indices it covers and their integer weights.
///
/// Measured in units of `1 / dst` source pixels, output `o` spans
/// `[o * src, (o + 1) * src)` and source pixel `i` spans
/// `[i * dst, (i + 1) * dst)`; the weight is their overlap. Weights for one
/// output always sum to `src`.
fn area_weights(src: usize, dst: usize) -> Vec<Vec<(usize, u64)>> {
    (0..dst)
        .map(|o| {
            let start = o * src;
            let end = (o + 1) * src;
            let first = start / dst;
            let last = end.div_ceil(dst).min(src);
            (first..last)
                .filter_map(|i| {
                    let covered = end.min((i + 1) * dst).saturating_sub(start.max(i * dst));
                    (covered > 0).then_some((i, covered as u64))
                })
                .collect()
        })
        .collect()
}

fn nearest_weights(src: usize, dst: usize) -> Vec<Vec<(usize, u64)>> {
    (0..dst)
        .map(|o| {
            // Center of output o is at (2o + 1) * src / (2 * dst) source pixels.
            let i = ((2 * o + 1) * src / (2 * dst)).min(src - 1);
            vec![(i, src as u64)]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster_from_rows(rows: &[&[u8]]) -> Raster {
        let side = rows.len() as u32;
        Raster::from_pixels(side, rows.concat()).expect("square rows")
    }

    #[test]
    fn test_all_background_is_all_zero() {
        let tensor = ImageNormalizer::default()
            .normalize(&Raster::filled(280, 255))
            .expect("normalizes");
        assert_eq!(tensor.shape(), [28, 28, 1]);
        assert!(tensor.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_all_ink_is_all_one() {
        for filter in [ResampleFilter::Area, ResampleFilter::Nearest] {
            let tensor = ImageNormalizer::new(28, filter)
                .normalize(&Raster::filled(280, 0))
                .expect("normalizes");
            assert!(
                tensor.as_slice().iter().all(|&v| (v - 1.0).abs() < 1e-6),
                "{filter:?}"
            );
        }
    }

    #[test]
    fn test_area_averages_blocks() {
        let raster = raster_from_rows(&[
            &[0, 0, 255, 255],
            &[0, 0, 255, 255],
            &[0, 255, 255, 255],
            &[255, 0, 255, 255],
        ]);
        let tensor = ImageNormalizer::new(2, ResampleFilter::Area)
            .normalize(&raster)
            .expect("normalizes");
        assert_eq!(tensor.get(0, 0), Some(1.0));
        assert_eq!(tensor.get(0, 1), Some(0.0));
        assert_eq!(tensor.get(1, 0), Some(0.5));
        assert_eq!(tensor.get(1, 1), Some(0.0));
    }

    #[test]
    fn test_area_handles_fractional_footprints() {
        // 3 -> 2: each output covers 1.5 source pixels.
        let raster = raster_from_rows(&[&[0, 255, 255], &[0, 255, 255], &[0, 255, 255]]);
        let tensor = ImageNormalizer::new(2, ResampleFilter::Area)
            .normalize(&raster)
            .expect("normalizes");
        let left = tensor.get(0, 0).expect("in bounds");
        assert!((left - 2.0 / 3.0).abs() < 1e-6, "{left}");
        assert_eq!(tensor.get(0, 1), Some(0.0));
    }

    #[test]
    fn test_nearest_samples_center_pixel() {
        let raster = raster_from_rows(&[
            &[255, 255, 255, 255],
            &[255, 0, 255, 255],
            &[255, 255, 255, 255],
            &[255, 255, 255, 255],
        ]);
        let tensor = ImageNormalizer::new(2, ResampleFilter::Nearest)
            .normalize(&raster)
            .expect("normalizes");
        // Output (0, 0) samples source (1, 1).
        assert_eq!(tensor.get(0, 0), Some(1.0));
        assert_eq!(tensor.get(1, 1), Some(0.0));
    }

    #[test]
    fn test_tensor_shape_is_independent_of_canvas_side() {
        let normalizer = ImageNormalizer::default();
        for side in [28, 100, 280, 512] {
            let tensor = normalizer
                .normalize(&Raster::filled(side, 255))
                .expect("normalizes");
            assert_eq!(tensor.shape(), [28, 28, 1]);
            assert_eq!(tensor.batched_shape(), [1, 28, 28, 1]);
        }
    }

    #[test]
    fn test_upsampling_small_raster() {
        let tensor = ImageNormalizer::new(4, ResampleFilter::Area)
            .normalize(&raster_from_rows(&[&[0, 255], &[255, 0]]))
            .expect("normalizes");
        assert_eq!(tensor.get(0, 0), Some(1.0));
        assert_eq!(tensor.get(0, 3), Some(0.0));
        assert_eq!(tensor.get(3, 3), Some(1.0));
    }

    #[test]
    fn test_custom_background_maps_to_zero() {
        let canvas = CanvasConfig {
            side: 40,
            background: 200,
            ink: 0,
        };
        let normalizer = ImageNormalizer::for_canvas(&NormalizerConfig::default(), &canvas);
        let blank = normalizer
            .normalize(&Raster::filled(40, 200))
            .expect("normalizes");
        assert!(blank.as_slice().iter().all(|&v| v == 0.0));
        let inked = normalizer
            .normalize(&Raster::filled(40, 0))
            .expect("normalizes");
        assert!(inked.as_slice().iter().all(|&v| v == 1.0));
        let half = normalizer
            .normalize(&Raster::filled(40, 100))
            .expect("normalizes");
        assert_eq!(half.get(0, 0), Some(0.5));
    }

    #[test]
    fn test_dark_canvas_levels_are_not_inverted_twice() {
        // Light ink on a black canvas already matches the model convention.
        let normalizer = ImageNormalizer::new(4, ResampleFilter::Area).with_levels(0, 255);
        let blank = normalizer
            .normalize(&Raster::filled(8, 0))
            .expect("normalizes");
        assert!(blank.as_slice().iter().all(|&v| v == 0.0));
        let inked = normalizer
            .normalize(&Raster::filled(8, 255))
            .expect("normalizes");
        assert!(inked.as_slice().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_equal_levels_are_rejected() {
        let err = ImageNormalizer::default()
            .with_levels(90, 90)
            .normalize(&Raster::filled(10, 90))
            .unwrap_err();
        assert_eq!(err, NormalizeError::IndistinctLevels { level: 90 });
    }

    #[test]
    fn test_zero_model_side_is_rejected() {
        let err = ImageNormalizer::new(0, ResampleFilter::Area)
            .normalize(&Raster::filled(10, 255))
            .unwrap_err();
        assert_eq!(err, NormalizeError::ZeroResolution);
    }

    #[test]
    fn test_empty_raster_is_rejected() {
        let err = ImageNormalizer::default()
            .normalize(&Raster::filled(0, 255))
            .unwrap_err();
        assert_eq!(err, NormalizeError::EmptyRaster);
    }
}
