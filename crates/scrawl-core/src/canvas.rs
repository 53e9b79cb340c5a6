//! Stroke canvas: the square intensity raster that accumulates ink.
//!
//! Individual strokes are not retained. Each paint call stamps a disk into
//! the raster and only the net effect survives, last write wins per pixel.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::config::{CanvasConfig, MAX_BRUSH_SIZE, MIN_BRUSH_SIZE};
use crate::error::ImageLoadError;

/// Filter used when an uploaded image is rescaled onto the canvas.
const UPLOAD_FILTER: FilterType = FilterType::CatmullRom;

/// Which of the two brush colors a stroke applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    /// Dark digit stroke.
    #[default]
    Ink,
    /// Eraser: paints the background value.
    Background,
}

/// A pointer position in canvas pixel space.
///
/// Pixel `(i, j)` covers `[i, i + 1) x [j, j + 1)`, so its center is at
/// `(i + 0.5, j + 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
}

impl StrokePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Current brush settings, mutated by UI controls and read by paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrushState {
    size: u32,
    intensity: Intensity,
}

impl BrushState {
    /// Brush with the given size (diameter), clamped to the control range.
    pub fn new(size: u32, intensity: Intensity) -> Self {
        Self {
            size: size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE),
            intensity,
        }
    }

    /// Brush diameter as shown on the size control.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Stroke radius. Always at least `MIN_BRUSH_SIZE / 2`.
    pub fn radius(&self) -> u32 {
        self.size / 2
    }

    pub fn intensity(&self) -> Intensity {
        self.intensity
    }

    /// Set the brush size, clamping to `[MIN_BRUSH_SIZE, MAX_BRUSH_SIZE]`.
    /// Returns the size actually applied.
    pub fn set_size(&mut self, size: u32) -> u32 {
        self.size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
        self.size
    }

    pub fn set_intensity(&mut self, intensity: Intensity) {
        self.intensity = intensity;
    }
}

/// Square single-channel raster, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    side: u32,
    pixels: Vec<u8>,
}

impl Raster {
    /// A `side x side` raster filled with `value`.
    pub fn filled(side: u32, value: u8) -> Self {
        Self {
            side,
            pixels: vec![value; (side as usize) * (side as usize)],
        }
    }

    /// Wrap existing pixel data. Returns `None` unless `pixels.len() == side * side`.
    pub fn from_pixels(side: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != (side as usize) * (side as usize) {
            return None;
        }
        Some(Self { side, pixels })
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at column `x`, row `y`, or `None` when out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.side || y >= self.side {
            return None;
        }
        Some(self.pixels[self.index(x, y)])
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.side as usize) + x as usize
    }
}

/// Owns the canvas raster and applies local edits.
#[derive(Debug, Clone)]
pub struct StrokeCanvasBuffer {
    raster: Raster,
    background: u8,
    ink: u8,
}

impl StrokeCanvasBuffer {
    /// A blank canvas described by `config`.
    pub fn new(config: &CanvasConfig) -> Self {
        Self {
            raster: Raster::filled(config.side, config.background),
            background: config.background,
            ink: config.ink,
        }
    }

    pub fn side(&self) -> u32 {
        self.raster.side
    }

    pub fn background(&self) -> u8 {
        self.background
    }

    pub fn ink(&self) -> u8 {
        self.ink
    }

    /// Raster value for a brush intensity.
    pub fn value_of(&self, intensity: Intensity) -> u8 {
        match intensity {
            Intensity::Ink => self.ink,
            Intensity::Background => self.background,
        }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn pixels(&self) -> &[u8] {
        &self.raster.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        self.raster.get(x, y)
    }

    /// True when every pixel holds the background value.
    pub fn is_blank(&self) -> bool {
        self.raster.pixels.iter().all(|&p| p == self.background)
    }

    /// Stamp a disk of `radius` around `point` with `intensity`.
    ///
    /// Sets every pixel whose center lies within `radius` of `point`.
    /// Parts of the disk outside the canvas are clipped. Non-finite
    /// coordinates are ignored.
    pub fn paint(&mut self, point: StrokePoint, radius: u32, intensity: Intensity) {
        if !point.x.is_finite() || !point.y.is_finite() {
            tracing::warn!("Ignoring paint at non-finite point {point:?}");
            return;
        }

        let value = self.value_of(intensity);
        let side = self.raster.side as i64;
        let r = radius as f64;
        let (px, py) = (point.x as f64, point.y as f64);

        // Candidate pixels: centers in [p - r, p + r].
        let x0 = ((px - r - 0.5).ceil() as i64).max(0);
        let x1 = ((px + r - 0.5).floor() as i64).min(side - 1);
        let y0 = ((py - r - 0.5).ceil() as i64).max(0);
        let y1 = ((py + r - 0.5).floor() as i64).min(side - 1);
        if x0 > x1 || y0 > y1 {
            return;
        }

        let r_sq = r * r;
        for y in y0..=y1 {
            let dy = y as f64 + 0.5 - py;
            for x in x0..=x1 {
                let dx = x as f64 + 0.5 - px;
                if dx * dx + dy * dy <= r_sq {
                    let idx = self.raster.index(x as u32, y as u32);
                    self.raster.pixels[idx] = value;
                }
            }
        }
    }

    /// Reset every pixel to the background value.
    pub fn clear(&mut self) {
        self.raster.pixels.fill(self.background);
    }

    /// Replace the canvas with a grayscale copy of `source`, resized to the
    /// canvas side.
    ///
    /// On error the canvas is left untouched.
    pub fn load_external(&mut self, source: &DynamicImage) -> Result<(), ImageLoadError> {
        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 {
            return Err(ImageLoadError::Empty { width, height });
        }

        let gray = source.to_luma8();
        let side = self.raster.side;
        let resized = if gray.dimensions() == (side, side) {
            gray
        } else {
            image::imageops::resize(&gray, side, side, UPLOAD_FILTER)
        };

        self.raster.pixels = resized.into_raw();
        tracing::debug!("Canvas replaced from {width}x{height} source");
        Ok(())
    }

    /// Decode an encoded image (PNG, JPEG, BMP, ...) and load it.
    pub fn load_external_bytes(&mut self, bytes: &[u8]) -> Result<(), ImageLoadError> {
        let decoded = image::load_from_memory(bytes)?;
        self.load_external(&decoded)
    }

    /// Read, decode, and load an image file.
    pub fn load_external_path(&mut self, path: &Path) -> Result<(), ImageLoadError> {
        let bytes = std::fs::read(path).map_err(|source| ImageLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_external_bytes(&bytes)
    }

    /// Copy of the canvas as an `image` grayscale buffer.
    pub fn to_gray_image(&self) -> GrayImage {
        let side = self.raster.side;
        GrayImage::from_raw(side, side, self.raster.pixels.clone())
            .unwrap_or_else(|| GrayImage::new(side, side))
    }
}
