//! Message contracts between a front end and the pipeline session.
//!
//! Both enums use the `#[serde(tag = "type", content = "data")]` layout so a
//! front end can exchange them as JSON, e.g.
//! `{"type": "Paint", "data": {"x": 12.0, "y": 40.5}}`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use scrawl_core::canvas::Intensity;
use scrawl_core::interpret::PredictionResult;

use crate::controller::PipelineState;

/// Input events, one per UI action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    /// Pointer down or drag at canvas coordinates.
    Paint {
        /// Column in canvas pixels.
        x: f32,
        /// Row in canvas pixels.
        y: f32,
    },

    /// Brush size control moved.
    SetBrushSize {
        /// Requested diameter; clamped to the control range.
        size: u32,
    },

    /// Brush color switched between ink and eraser.
    SetIntensity {
        intensity: Intensity,
    },

    /// Clear button.
    Clear,

    /// Predict button.
    Predict,

    /// Upload an image file onto the canvas.
    LoadImage {
        /// File path to the image.
        path: PathBuf,
    },
}

/// Notifications from the session to the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionUpdate {
    /// The pipeline moved to a new state.
    StateChanged { state: PipelineState },

    /// Status-bar text changed.
    Status { message: String },

    /// A prediction was published.
    Prediction {
        /// The winning label.
        result: PredictionResult,
        /// Result-line text for display.
        headline: String,
    },

    /// An operation failed.
    Error {
        /// Error description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_event_json_layout() {
        let json = r#"{"type":"Paint","data":{"x":12.0,"y":40.5}}"#;
        let event: PipelineEvent = serde_json::from_str(json).expect("parses");
        assert_eq!(event, PipelineEvent::Paint { x: 12.0, y: 40.5 });
    }

    #[test]
    fn test_unit_events_parse_without_data() {
        let events: Vec<PipelineEvent> =
            serde_json::from_str(r#"[{"type":"Clear"},{"type":"Predict"}]"#).expect("parses");
        assert_eq!(events, vec![PipelineEvent::Clear, PipelineEvent::Predict]);
    }

    #[test]
    fn test_intensity_uses_lowercase_names() {
        let json = r#"{"type":"SetIntensity","data":{"intensity":"background"}}"#;
        let event: PipelineEvent = serde_json::from_str(json).expect("parses");
        assert_eq!(
            event,
            PipelineEvent::SetIntensity {
                intensity: Intensity::Background
            }
        );
    }

    #[test]
    fn test_state_update_serializes_state_name() {
        let update = SessionUpdate::StateChanged {
            state: PipelineState::Predicting,
        };
        let json = serde_json::to_string(&update).expect("serializes");
        assert_eq!(json, r#"{"type":"StateChanged","data":{"state":"Predicting"}}"#);
    }
}
