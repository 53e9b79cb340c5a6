//! Capability boundary to an external inference engine.
//!
//! The adapter is a pass-through with typed failures: it neither normalizes
//! input nor interprets output. The engine is bound explicitly at
//! construction; an adapter built with [`ClassifierAdapter::unbound`] reports
//! [`ClassifyError::ModelUnavailable`] on every call.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::ClassifyError;
use crate::interpret::ProbabilityDistribution;
use crate::normalize::Tensor;

/// Error raised by an engine during inference.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A model that scores a normalized tensor, one score per class.
///
/// Engines may keep mutable scratch state and are not required to be
/// thread-safe; the adapter never calls `infer` concurrently.
pub trait InferenceEngine: Send {
    /// Name for logs and status text.
    fn name(&self) -> &str {
        "engine"
    }

    /// Score `tensor`. The returned vector is passed through unmodified.
    fn infer(&mut self, tensor: &Tensor) -> Result<Vec<f32>, EngineError>;
}

type SharedEngine = Arc<Mutex<Box<dyn InferenceEngine>>>;

/// Serialized, optionally-bound handle to an inference engine.
///
/// Clones share the same engine and the same lock.
#[derive(Clone, Default)]
pub struct ClassifierAdapter {
    engine: Option<SharedEngine>,
}

impl ClassifierAdapter {
    /// Bind `engine`.
    pub fn new(engine: impl InferenceEngine + 'static) -> Self {
        Self::from_boxed(Box::new(engine))
    }

    pub fn from_boxed(engine: Box<dyn InferenceEngine>) -> Self {
        Self {
            engine: Some(Arc::new(Mutex::new(engine))),
        }
    }

    /// An adapter with no engine behind it.
    pub fn unbound() -> Self {
        Self { engine: None }
    }

    pub fn is_bound(&self) -> bool {
        self.engine.is_some()
    }

    /// Name of the bound engine, if any.
    pub fn engine_name(&self) -> Option<String> {
        self.engine
            .as_ref()
            .map(|engine| engine.lock().name().to_string())
    }

    /// Run the engine on `tensor`.
    ///
    /// Blocks while another clone of this adapter is inside the engine.
    /// A panic inside the engine is reported as [`ClassifyError::Inference`].
    pub fn classify(&self, tensor: &Tensor) -> Result<ProbabilityDistribution, ClassifyError> {
        let engine = self.engine.as_ref().ok_or(ClassifyError::ModelUnavailable)?;
        let mut guard = engine.lock();
        infer_guarded(&mut **guard, tensor)
    }

    /// Like [`classify`](Self::classify), but gives up with
    /// `Inference("engine busy")` if the engine stays locked for `wait`.
    pub fn classify_within(
        &self,
        tensor: &Tensor,
        wait: Duration,
    ) -> Result<ProbabilityDistribution, ClassifyError> {
        let engine = self.engine.as_ref().ok_or(ClassifyError::ModelUnavailable)?;
        let Some(mut guard) = engine.try_lock_for(wait) else {
            tracing::warn!("Engine still busy after {} ms", wait.as_millis());
            return Err(ClassifyError::Inference("engine busy".to_string()));
        };
        infer_guarded(&mut **guard, tensor)
    }
}

fn infer_guarded(
    engine: &mut dyn InferenceEngine,
    tensor: &Tensor,
) -> Result<ProbabilityDistribution, ClassifyError> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| engine.infer(tensor))) {
        Ok(Ok(scores)) => Ok(ProbabilityDistribution::new(scores)),
        Ok(Err(e)) => Err(ClassifyError::Inference(e.to_string())),
        Err(payload) => Err(ClassifyError::Inference(panic_message(payload.as_ref()))),
    }
}

impl fmt::Debug for ClassifierAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierAdapter")
            .field("bound", &self.is_bound())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("engine panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("engine panicked: {s}")
    } else {
        "engine panicked".to_string()
    }
}
