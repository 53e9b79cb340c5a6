//! Reduction of classifier scores to a user-facing prediction.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MalformedDistribution;

/// Per-class scores in label order, exactly as the engine produced them.
///
/// Scores are expected in `[0, 1]` but are not required to sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityDistribution {
    scores: Vec<f32>,
}

impl ProbabilityDistribution {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }

    /// Equal scores for `classes` labels.
    pub fn uniform(classes: usize) -> Self {
        let score = if classes == 0 { 0.0 } else { 1.0 / classes as f32 };
        Self::new(vec![score; classes])
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl From<Vec<f32>> for ProbabilityDistribution {
    fn from(scores: Vec<f32>) -> Self {
        Self::new(scores)
    }
}

/// The selected label and its confidence percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Index of the winning class.
    pub label: usize,
    /// `100 * score`, clamped to `[0, 100]`.
    pub confidence: f32,
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Predicted Digit: {}  (Confidence: {:.2}%)",
            self.label, self.confidence
        )
    }
}

/// Deterministic argmax with lowest-index tie-break.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultInterpreter;

impl ResultInterpreter {
    /// Pick the highest-scoring label.
    pub fn interpret(
        &self,
        distribution: &ProbabilityDistribution,
    ) -> Result<PredictionResult, MalformedDistribution> {
        validate(distribution)?;

        let mut best = 0;
        for (index, &score) in distribution.scores.iter().enumerate().skip(1) {
            // Strict comparison keeps the earliest index on ties.
            if score > distribution.scores[best] {
                best = index;
            }
        }

        Ok(result_for(distribution, best))
    }

    /// The `k` highest-scoring labels, best first, ties in label order.
    pub fn ranked(
        &self,
        distribution: &ProbabilityDistribution,
        k: usize,
    ) -> Result<Vec<PredictionResult>, MalformedDistribution> {
        validate(distribution)?;

        let mut order: Vec<usize> = (0..distribution.len()).collect();
        // Stable sort preserves label order among equal scores.
        order.sort_by(|&a, &b| {
            distribution.scores[b]
                .partial_cmp(&distribution.scores[a])
                .unwrap_or(Ordering::Equal)
        });

        Ok(order
            .into_iter()
            .take(k)
            .map(|label| result_for(distribution, label))
            .collect())
    }
}

fn validate(distribution: &ProbabilityDistribution) -> Result<(), MalformedDistribution> {
    if distribution.is_empty() {
        return Err(MalformedDistribution::Empty);
    }
    if let Some((index, &value)) = distribution
        .scores
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite())
    {
        return Err(MalformedDistribution::NonFinite { index, value });
    }
    Ok(())
}

fn result_for(distribution: &ProbabilityDistribution, label: usize) -> PredictionResult {
    let confidence = (100.0 * distribution.scores[label]).clamp(0.0, 100.0);
    PredictionResult { label, confidence }
}
