//! Operating modes

use serde::{Deserialize, Serialize};

/// What the daemon is currently doing with the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// No perception loop running
    #[default]
    Idle,
    /// Announce detected objects
    ObjectDetection,
    /// Read visible text aloud
    TextReading,
}

impl Mode {
    pub fn is_active(self) -> bool {
        self != Self::Idle
    }

    /// Activity log line written when the mode starts
    pub(crate) fn start_message(self) -> Option<&'static str> {
        match self {
            Self::Idle => None,
            Self::ObjectDetection => Some("Starting object detection..."),
            Self::TextReading => Some("Starting text reader..."),
        }
    }

    /// Utterance queued when the mode starts
    pub(crate) fn activation_utterance(self) -> Option<&'static str> {
        match self {
            Self::Idle => None,
            Self::ObjectDetection => Some("Object detection mode activated."),
            Self::TextReading => Some("Text reading mode activated."),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Idle => write!(f, "Idle"),
            Mode::ObjectDetection => write!(f, "ObjectDetection"),
            Mode::TextReading => write!(f, "TextReading"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "object" | "objects" | "object_detection" => Ok(Self::ObjectDetection),
            "text" | "text_reading" => Ok(Self::TextReading),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(Mode::default(), Mode::Idle);
        assert!(!Mode::Idle.is_active());
        assert!(Mode::TextReading.is_active());
    }

    #[test]
    fn test_parse() {
        assert_eq!("object".parse::<Mode>(), Ok(Mode::ObjectDetection));
        assert_eq!("Text".parse::<Mode>(), Ok(Mode::TextReading));
        assert!("video".parse::<Mode>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Mode::ObjectDetection).unwrap();
        assert_eq!(json, "\"object_detection\"");
    }
}
