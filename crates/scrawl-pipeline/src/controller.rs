//! The pipeline state machine.
//!
//! `PipelineController` is the only place pipeline state changes. Input
//! events mutate the canvas synchronously; a predict request normalizes the
//! canvas and hands back a [`PredictionJob`] that can run anywhere. The job's
//! completion is applied with [`PipelineController::complete`], which drops
//! it if any paint, clear, or load happened in the meantime.

use std::path::Path;
use std::time::Duration;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use scrawl_core::canvas::{BrushState, Intensity, StrokeCanvasBuffer, StrokePoint};
use scrawl_core::classifier::ClassifierAdapter;
use scrawl_core::config::ScrawlConfig;
use scrawl_core::error::{ClassifyError, ImageLoadError, MalformedDistribution, ScrawlError};
use scrawl_core::interpret::{PredictionResult, ProbabilityDistribution, ResultInterpreter};
use scrawl_core::normalize::{ImageNormalizer, Tensor};

use crate::events::PipelineEvent;

const READY_HEADLINE: &str = "Draw a digit and click Predict";

/// Where the pipeline is in its draw / predict cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// Blank or freshly cleared canvas.
    Idle,
    /// Canvas holds strokes or a loaded image.
    Drawing,
    /// Canvas is being converted to a tensor.
    Normalizing,
    /// The engine is scoring the tensor.
    Predicting,
    /// A prediction is on display.
    Result,
    /// The last operation failed; the canvas is intact.
    Failed,
}

/// Identifies one prediction request. Only the newest token is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PredictionToken(u64);

/// A normalized tensor waiting to be classified.
#[derive(Debug)]
pub struct PredictionJob {
    token: PredictionToken,
    tensor: Tensor,
    classifier: ClassifierAdapter,
}

impl PredictionJob {
    pub fn token(&self) -> PredictionToken {
        self.token
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Classify on the current thread.
    pub fn run(self) -> PredictionCompletion {
        let outcome = self.classifier.classify(&self.tensor);
        PredictionCompletion {
            token: self.token,
            outcome,
        }
    }

    /// Classify on tokio's blocking pool, giving up after `timeout`.
    ///
    /// A timed-out engine call keeps running in the background and holds
    /// the engine lock until it returns. Later jobs wait at most part of
    /// their own timeout for that lock and then fail with "engine busy", so
    /// their worker threads exit instead of queueing behind the hung call.
    pub async fn run_with_timeout(self, timeout: Duration) -> PredictionCompletion {
        let token = self.token;
        let lock_wait = timeout.saturating_sub(timeout / 5);
        let blocking = tokio::task::spawn_blocking(move || PredictionCompletion {
            token,
            outcome: self.classifier.classify_within(&self.tensor, lock_wait),
        });

        let outcome = match tokio::time::timeout(timeout, blocking).await {
            Ok(Ok(completion)) => return completion,
            Ok(Err(e)) => Err(ClassifyError::Inference(format!(
                "inference task failed: {e}"
            ))),
            Err(_) => Err(ClassifyError::Inference(format!(
                "timed out after {} ms",
                timeout.as_millis()
            ))),
        };
        PredictionCompletion { token, outcome }
    }
}

/// The engine's answer for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionCompletion {
    pub token: PredictionToken,
    pub outcome: Result<ProbabilityDistribution, ClassifyError>,
}

/// What [`PipelineController::complete`] did with a completion.
#[derive(Debug)]
pub enum CompletionOutcome {
    /// The prediction is now on display.
    Published(PredictionResult),
    /// Classification or interpretation failed; state is `Failed`.
    Failed(ScrawlError),
    /// The request was superseded and its result dropped.
    Discarded,
}

/// Sequences canvas edits, normalization, classification, and results.
#[derive(Debug)]
pub struct PipelineController {
    canvas: StrokeCanvasBuffer,
    brush: BrushState,
    normalizer: ImageNormalizer,
    classifier: ClassifierAdapter,
    interpreter: ResultInterpreter,
    expected_classes: usize,
    inference_timeout: Duration,

    state: PipelineState,
    generation: u64,
    in_flight: Option<PredictionToken>,
    last_result: Option<PredictionResult>,
    headline: String,
    status: String,
    transitions: Option<Vec<PipelineState>>,
}

impl PipelineController {
    pub fn new(config: &ScrawlConfig, classifier: ClassifierAdapter) -> Self {
        if !classifier.is_bound() {
            tracing::warn!("No inference engine bound; predictions will fail");
        }
        Self {
            canvas: StrokeCanvasBuffer::new(&config.canvas),
            brush: BrushState::new(config.brush.size, Intensity::Ink),
            normalizer: ImageNormalizer::for_canvas(&config.normalizer, &config.canvas),
            classifier,
            interpreter: ResultInterpreter,
            expected_classes: config.inference.num_classes,
            inference_timeout: config.inference_timeout(),
            state: PipelineState::Idle,
            generation: 0,
            in_flight: None,
            last_result: None,
            headline: READY_HEADLINE.to_string(),
            status: "Ready".to_string(),
            transitions: None,
        }
    }

    /// Start recording every state entered, including short-lived ones
    /// like `Normalizing`, for [`take_transitions`](Self::take_transitions).
    pub fn record_transitions(&mut self) {
        self.transitions.get_or_insert_with(Vec::new);
    }

    /// States entered since the last call, oldest first. Empty unless
    /// [`record_transitions`](Self::record_transitions) was called.
    pub fn take_transitions(&mut self) -> Vec<PipelineState> {
        self.transitions.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn canvas(&self) -> &StrokeCanvasBuffer {
        &self.canvas
    }

    pub fn brush(&self) -> &BrushState {
        &self.brush
    }

    pub fn classifier(&self) -> &ClassifierAdapter {
        &self.classifier
    }

    /// The prediction on display, if the state is `Result`.
    pub fn last_result(&self) -> Option<PredictionResult> {
        self.last_result
    }

    /// Main result-line text.
    pub fn headline(&self) -> &str {
        &self.headline
    }

    /// Status-bar text.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn inference_timeout(&self) -> Duration {
        self.inference_timeout
    }

    /// Apply one UI event. `Predict` runs synchronously on this thread.
    pub fn handle(
        &mut self,
        event: PipelineEvent,
    ) -> Result<Option<PredictionResult>, ScrawlError> {
        match event {
            PipelineEvent::Paint { x, y } => self.paint(StrokePoint::new(x, y)),
            PipelineEvent::SetBrushSize { size } => {
                self.set_brush_size(size);
            }
            PipelineEvent::SetIntensity { intensity } => self.set_intensity(intensity),
            PipelineEvent::Clear => self.clear(),
            PipelineEvent::Predict => return self.predict().map(Some),
            PipelineEvent::LoadImage { path } => self.load_image_path(&path)?,
        }
        Ok(None)
    }

    /// Stamp the current brush at `point`.
    pub fn paint(&mut self, point: StrokePoint) {
        self.paint_with(point, self.brush.radius(), self.brush.intensity());
    }

    /// Stamp an explicit brush at `point`.
    ///
    /// Any state moves to `Drawing`; a pending prediction is invalidated and
    /// the previous result discarded.
    pub fn paint_with(&mut self, point: StrokePoint, radius: u32, intensity: Intensity) {
        self.canvas.paint(point, radius, intensity);
        self.invalidate();
        self.last_result = None;
        self.transition(PipelineState::Drawing);
    }

    /// Returns the size actually applied after clamping.
    pub fn set_brush_size(&mut self, size: u32) -> u32 {
        let applied = self.brush.set_size(size);
        self.status = format!("Brush size: {applied}");
        applied
    }

    pub fn set_intensity(&mut self, intensity: Intensity) {
        self.brush.set_intensity(intensity);
        self.status = match intensity {
            Intensity::Ink => "Brush color: ink".to_string(),
            Intensity::Background => "Brush color: background".to_string(),
        };
    }

    /// Blank the canvas and return to `Idle`.
    pub fn clear(&mut self) {
        self.canvas.clear();
        self.invalidate();
        self.last_result = None;
        self.headline = "Canvas cleared. Draw again.".to_string();
        self.status = "Canvas cleared".to_string();
        self.transition(PipelineState::Idle);
    }

    /// Replace the canvas with a decoded image.
    pub fn load_image(&mut self, source: &DynamicImage) -> Result<(), ScrawlError> {
        let result = self.canvas.load_external(source);
        self.finish_load(result, "Loaded image".to_string())
    }

    /// Replace the canvas with an encoded image (PNG, JPEG, BMP, ...).
    pub fn load_image_bytes(&mut self, bytes: &[u8]) -> Result<(), ScrawlError> {
        let result = self.canvas.load_external_bytes(bytes);
        self.finish_load(result, "Loaded image".to_string())
    }

    /// Replace the canvas with an image file.
    pub fn load_image_path(&mut self, path: &Path) -> Result<(), ScrawlError> {
        let result = self.canvas.load_external_path(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.finish_load(result, format!("Loaded image: {name}"))
    }

    fn finish_load(
        &mut self,
        result: Result<(), ImageLoadError>,
        status: String,
    ) -> Result<(), ScrawlError> {
        self.invalidate();
        match result {
            Ok(()) => {
                tracing::info!("{status}");
                self.last_result = None;
                self.headline = "Image loaded. Click Predict.".to_string();
                self.status = status;
                self.transition(PipelineState::Drawing);
                Ok(())
            }
            Err(e) => {
                let err = ScrawlError::from(e);
                tracing::error!("Failed to load image: {err}");
                self.headline = format!("Could not load image: {err}");
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Normalize the canvas and issue a job for it.
    ///
    /// Supersedes any job already in flight: its completion will be
    /// discarded. Callers that must keep at most one job running should
    /// check [`has_in_flight`](Self::has_in_flight) first.
    pub fn begin_prediction(&mut self) -> Result<PredictionJob, ScrawlError> {
        self.invalidate();
        self.transition(PipelineState::Normalizing);

        let tensor = match self.normalizer.normalize(self.canvas.raster()) {
            Ok(tensor) => tensor,
            Err(e) => {
                let err = ScrawlError::from(e);
                tracing::error!("Normalization failed: {err}");
                self.headline = format!("Error: {err}");
                self.fail(&err);
                return Err(err);
            }
        };

        let token = PredictionToken(self.generation);
        self.in_flight = Some(token);
        self.status = "Predicting...".to_string();
        self.transition(PipelineState::Predicting);

        Ok(PredictionJob {
            token,
            tensor,
            classifier: self.classifier.clone(),
        })
    }

    /// Apply a job's completion if its token is still current.
    pub fn complete(&mut self, completion: PredictionCompletion) -> CompletionOutcome {
        if self.in_flight != Some(completion.token) {
            tracing::debug!(
                "Discarding stale prediction {:?} (state {:?})",
                completion.token,
                self.state
            );
            return CompletionOutcome::Discarded;
        }
        self.in_flight = None;

        let result = completion
            .outcome
            .map_err(ScrawlError::from)
            .and_then(|distribution| {
                // Labels must stay within the configured classes.
                if distribution.len() != self.expected_classes {
                    return Err(ScrawlError::from(MalformedDistribution::WrongLength {
                        expected: self.expected_classes,
                        actual: distribution.len(),
                    }));
                }
                self.interpreter
                    .interpret(&distribution)
                    .map_err(ScrawlError::from)
            });

        match result {
            Ok(prediction) => {
                tracing::info!("{prediction}");
                self.last_result = Some(prediction);
                self.headline = prediction.to_string();
                self.status = "Prediction complete".to_string();
                self.transition(PipelineState::Result);
                CompletionOutcome::Published(prediction)
            }
            Err(err) => {
                tracing::error!("Prediction failed: {err}");
                self.headline = match err {
                    ScrawlError::Classify(ClassifyError::ModelUnavailable) => {
                        "Model not loaded".to_string()
                    }
                    _ => format!("Error: {err}"),
                };
                self.fail(&err);
                CompletionOutcome::Failed(err)
            }
        }
    }

    /// Normalize, classify, and interpret on the current thread.
    pub fn predict(&mut self) -> Result<PredictionResult, ScrawlError> {
        let job = self.begin_prediction()?;
        match self.complete(job.run()) {
            CompletionOutcome::Published(result) => Ok(result),
            CompletionOutcome::Failed(err) => Err(err),
            // The token cannot change between begin and complete here.
            CompletionOutcome::Discarded => Err(ScrawlError::from(ClassifyError::Inference(
                "prediction superseded".to_string(),
            ))),
        }
    }

    /// Fail the in-flight request without a completion, e.g. when its
    /// worker task died. No-op if `token` is not current.
    pub fn abandon(&mut self, token: PredictionToken, reason: &str) {
        if self.in_flight != Some(token) {
            return;
        }
        self.complete(PredictionCompletion {
            token,
            outcome: Err(ClassifyError::Inference(reason.to_string())),
        });
    }

    fn invalidate(&mut self) {
        self.generation += 1;
        if let Some(token) = self.in_flight.take() {
            tracing::debug!("Invalidated in-flight prediction {token:?}");
        }
    }

    fn fail(&mut self, err: &ScrawlError) {
        self.last_result = None;
        self.status = err.status_text().to_string();
        self.transition(PipelineState::Failed);
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            tracing::debug!("Pipeline {:?} -> {:?}", self.state, next);
            self.state = next;
            if let Some(log) = self.transitions.as_mut() {
                log.push(next);
            }
        }
    }
}
