//! Scrawl Pipeline: state machine and async session for the digit pipeline.
//!
//! [`PipelineController`] sequences canvas edits, normalization,
//! classification, and result publication. [`spawn_session`] wraps a
//! controller in a tokio task that keeps classification off the event path
//! and drops results made stale by newer input.

pub mod controller;
pub mod events;
pub mod session;

pub use controller::{
    CompletionOutcome, PipelineController, PipelineState, PredictionCompletion, PredictionJob,
    PredictionToken,
};
pub use events::{PipelineEvent, SessionUpdate};
pub use session::{SessionError, SessionHandle, spawn_session};
