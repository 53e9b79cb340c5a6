//! Async session loop around a [`PipelineController`].
//!
//! Events arrive on an unbounded channel and are applied strictly in arrival
//! order. A `Predict` event normalizes on the loop task, then classification
//! runs on tokio's blocking pool so paint events keep flowing while the
//! engine works. At most one request is honored at a time: `Predict` is
//! ignored while a current request is in flight. A paint, clear, or load
//! during classification invalidates the request, and its completion is
//! dropped when it arrives.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::controller::{
    CompletionOutcome, PipelineController, PipelineState, PredictionCompletion, PredictionToken,
};
use crate::events::{PipelineEvent, SessionUpdate};

/// Errors from talking to a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session has shut down")]
    Closed,
    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Front-end side of a running session.
pub struct SessionHandle {
    events: mpsc::UnboundedSender<PipelineEvent>,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    task: JoinHandle<PipelineController>,
}

impl SessionHandle {
    /// Queue an event. Events are applied in the order sent.
    pub fn send(&self, event: PipelineEvent) -> Result<(), SessionError> {
        self.events.send(event).map_err(|_| SessionError::Closed)
    }

    /// Wait for the next update. `None` once the session has ended and
    /// every update has been read.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }

    /// Next update if one is already queued.
    pub fn try_next_update(&mut self) -> Option<SessionUpdate> {
        self.updates.try_recv().ok()
    }

    /// Stop accepting events, let outstanding classifications finish, and
    /// return the controller along with any updates not yet read.
    pub async fn shutdown(self) -> Result<(PipelineController, Vec<SessionUpdate>), SessionError> {
        let Self {
            events,
            mut updates,
            task,
        } = self;
        drop(events);
        let controller = task.await?;

        let mut remaining = Vec::new();
        while let Ok(update) = updates.try_recv() {
            remaining.push(update);
        }
        Ok((controller, remaining))
    }
}

/// Spawn the session loop on the current tokio runtime.
///
/// Every state the controller enters is published as a `StateChanged`
/// update, so a predict request reports `Normalizing` before `Predicting`.
pub fn spawn_session(mut controller: PipelineController) -> SessionHandle {
    controller.record_transitions();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(run_session(controller, event_rx, update_tx));

    SessionHandle {
        events: event_tx,
        updates: update_rx,
        task,
    }
}

/// In-flight classification tasks keyed by task id.
struct Workers {
    tasks: JoinSet<PredictionCompletion>,
    tokens: HashMap<tokio::task::Id, PredictionToken>,
}

impl Workers {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            tokens: HashMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

async fn run_session(
    mut controller: PipelineController,
    mut events: mpsc::UnboundedReceiver<PipelineEvent>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
) -> PipelineController {
    let mut workers = Workers::new();
    tracing::info!("Pipeline session started");

    loop {
        // Queued events go first so a completion never lands on top of
        // strokes that arrived before it was picked up.
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => dispatch(&mut controller, &mut workers, event, &updates),
                None => break,
            },
            Some(joined) = workers.tasks.join_next_with_id(), if !workers.is_empty() => {
                settle(&mut controller, &mut workers, joined, &updates);
            }
        }
    }

    // Event channel closed: let outstanding work land before handing back.
    while let Some(joined) = workers.tasks.join_next_with_id().await {
        settle(&mut controller, &mut workers, joined, &updates);
    }

    tracing::info!("Pipeline session ended in state {:?}", controller.state());
    controller
}

fn dispatch(
    controller: &mut PipelineController,
    workers: &mut Workers,
    event: PipelineEvent,
    updates: &mpsc::UnboundedSender<SessionUpdate>,
) {
    let before = Snapshot::of(controller);

    match event {
        PipelineEvent::Predict => {
            if controller.has_in_flight() {
                tracing::debug!("Predict ignored: a prediction is already in flight");
            } else {
                match controller.begin_prediction() {
                    Ok(job) => {
                        let token = job.token();
                        let timeout = controller.inference_timeout();
                        let handle = workers.tasks.spawn(job.run_with_timeout(timeout));
                        workers.tokens.insert(handle.id(), token);
                    }
                    Err(e) => {
                        let _ = updates.send(SessionUpdate::Error {
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        other => {
            if let Err(e) = controller.handle(other) {
                let _ = updates.send(SessionUpdate::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    before.publish_changes(controller, updates);
}

fn settle(
    controller: &mut PipelineController,
    workers: &mut Workers,
    joined: Result<(tokio::task::Id, PredictionCompletion), tokio::task::JoinError>,
    updates: &mpsc::UnboundedSender<SessionUpdate>,
) {
    let before = Snapshot::of(controller);

    match joined {
        Ok((id, completion)) => {
            workers.tokens.remove(&id);
            match controller.complete(completion) {
                CompletionOutcome::Published(result) => {
                    let _ = updates.send(SessionUpdate::Prediction {
                        result,
                        headline: controller.headline().to_string(),
                    });
                }
                CompletionOutcome::Failed(e) => {
                    let _ = updates.send(SessionUpdate::Error {
                        message: e.to_string(),
                    });
                }
                CompletionOutcome::Discarded => {}
            }
        }
        Err(e) => {
            tracing::error!("Prediction worker failed: {e}");
            if let Some(token) = workers.tokens.remove(&e.id()) {
                controller.abandon(token, "prediction worker failed");
                if controller.state() == PipelineState::Failed {
                    let _ = updates.send(SessionUpdate::Error {
                        message: format!("prediction worker failed: {e}"),
                    });
                }
            }
        }
    }

    before.publish_changes(controller, updates);
}

/// Status before an operation, used to emit change updates.
struct Snapshot {
    status: String,
}

impl Snapshot {
    fn of(controller: &PipelineController) -> Self {
        Self {
            status: controller.status().to_string(),
        }
    }

    fn publish_changes(
        self,
        controller: &mut PipelineController,
        updates: &mpsc::UnboundedSender<SessionUpdate>,
    ) {
        for state in controller.take_transitions() {
            let _ = updates.send(SessionUpdate::StateChanged { state });
        }
        if controller.status() != self.status {
            let _ = updates.send(SessionUpdate::Status {
                message: controller.status().to_string(),
            });
        }
    }
}
