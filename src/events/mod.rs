//! Events pushed from the coordinator and perception loops to the presentation layer
//!
//! State events are serializable so they can be forwarded to IPC subscribers;
//! rendered frames stay in-process.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::camera::Frame;
use crate::state::Mode;

/// Why a perception loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Stop or exit was requested
    Requested,
    /// The camera reported end-of-stream
    EndOfStream,
    /// The camera failed to produce a frame
    ReadFailure,
}

/// Lifecycle and activity events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// A perception loop was launched
    ModeStarted { mode: Mode },

    /// A perception loop ended
    ModeStopped { mode: Mode, reason: StopReason },

    /// A line was appended to the activity log
    LogLine { line: String },

    /// The application is exiting; the presentation layer should tear down
    Exited,
}

/// A frame ready to be drawn, already scaled to the render size
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub mode: Mode,
    /// Iteration counter of the loop that produced it
    pub sequence: u64,
    pub image: Arc<Frame>,
}

/// Everything the presentation layer receives
#[derive(Debug, Clone)]
pub enum PresentationEvent {
    State(StateEvent),
    Frame(RenderedFrame),
}

impl From<StateEvent> for PresentationEvent {
    fn from(event: StateEvent) -> Self {
        Self::State(event)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Requested => write!(f, "requested"),
            StopReason::EndOfStream => write!(f, "end of stream"),
            StopReason::ReadFailure => write!(f, "read failure"),
        }
    }
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::ModeStarted { mode } => write!(f, "MODE_STARTED ({})", mode),
            StateEvent::ModeStopped { mode, reason } => {
                write!(f, "MODE_STOPPED ({}, {})", mode, reason)
            }
            StateEvent::LogLine { line } => write!(f, "LOG {}", line),
            StateEvent::Exited => write!(f, "EXITED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = StateEvent::ModeStopped {
            mode: Mode::TextReading,
            reason: StopReason::EndOfStream,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("mode_stopped"));
        assert!(json.contains("text_reading"));
        assert!(json.contains("end_of_stream"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"log_line","line":"[10:00:00] Mode stopped."}"#;
        let event: StateEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            StateEvent::LogLine {
                line: "[10:00:00] Mode stopped.".to_string()
            }
        );
    }
}
