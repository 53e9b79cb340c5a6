//! Softmax-regression engine loaded from JSON weights.

use std::path::Path;

use serde::Deserialize;

use scrawl_core::classifier::{EngineError, InferenceEngine};
use scrawl_core::normalize::Tensor;

use crate::DemoError;

/// On-disk layout of a weights file.
#[derive(Deserialize)]
struct WeightsFile {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// One weight row per class plus a bias per class.
#[derive(Debug, Clone)]
pub struct LinearEngine {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl LinearEngine {
    pub fn new(weights: Vec<Vec<f32>>, bias: Vec<f32>) -> Result<Self, DemoError> {
        let engine = Self { weights, bias };
        engine.check()?;
        Ok(engine)
    }

    /// Read `{"weights": [[..]..], "bias": [..]}` from disk.
    pub fn load(path: &Path) -> Result<Self, DemoError> {
        let text = std::fs::read_to_string(path).map_err(|source| DemoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: WeightsFile = serde_json::from_str(&text)?;
        let engine = Self::new(file.weights, file.bias)?;
        tracing::info!(
            "Loaded linear engine from {} ({} classes, {} inputs)",
            path.display(),
            engine.classes(),
            engine.inputs()
        );
        Ok(engine)
    }

    pub fn classes(&self) -> usize {
        self.weights.len()
    }

    pub fn inputs(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn check(&self) -> Result<(), DemoError> {
        if self.weights.is_empty() {
            return Err(DemoError::Weights("no weight rows".into()));
        }
        if self.bias.len() != self.weights.len() {
            return Err(DemoError::Weights(format!(
                "{} weight rows but {} bias terms",
                self.weights.len(),
                self.bias.len()
            )));
        }
        let inputs = self.inputs();
        if let Some(row) = self.weights.iter().position(|r| r.len() != inputs) {
            return Err(DemoError::Weights(format!(
                "row {row} has {} weights, expected {inputs}",
                self.weights[row].len()
            )));
        }
        Ok(())
    }
}

impl InferenceEngine for LinearEngine {
    fn name(&self) -> &str {
        "linear"
    }

    fn infer(&mut self, tensor: &Tensor) -> Result<Vec<f32>, EngineError> {
        let x = tensor.as_slice();
        if x.len() != self.inputs() {
            return Err(EngineError::new(format!(
                "tensor has {} values, weights expect {}",
                x.len(),
                self.inputs()
            )));
        }

        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + b)
            .collect();
        Ok(softmax(&logits))
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
