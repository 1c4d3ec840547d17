//! Object detection backends

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::encode_png;
use crate::camera::Frame;
use crate::config::DetectionConfig;
use crate::process::{expand_argv, run_with_stdin};
use crate::{Error, Result};

/// One labeled bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in frame pixels
    pub bbox: [i32; 4],
}

/// Finds objects in a frame
pub trait ObjectDetector: Send + 'static {
    /// Detections at or above `confidence`
    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>>;
}

/// Runs an external detector: PNG frame on stdin, JSON array of detections on stdout
pub struct CommandDetector {
    command: Vec<String>,
    model: String,
}

impl CommandDetector {
    /// # Errors
    ///
    /// Returns error if the command template is empty
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(Error::Config("detection command is empty".to_string()));
        }
        Ok(Self {
            command: config.command.clone(),
            model: config.model.clone(),
        })
    }
}

/// Parse detector output, dropping boxes under the threshold
fn parse_detections(stdout: &[u8], confidence: f32) -> Result<Vec<Detection>> {
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let detections: Vec<Detection> = serde_json::from_str(text.trim())
        .map_err(|e| Error::Detection(format!("failed to parse detector output: {e}")))?;
    Ok(detections
        .into_iter()
        .filter(|d| d.confidence >= confidence)
        .collect())
}

impl ObjectDetector for CommandDetector {
    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let threshold = confidence.to_string();
        let (program, args) = expand_argv(
            &self.command,
            &[("model", self.model.as_str()), ("confidence", threshold.as_str())],
        )
        .ok_or_else(|| Error::Config("detection command is empty".to_string()))?;

        let png = encode_png(frame.as_raw(), frame.width(), frame.height(), image::ExtendedColorType::Rgb8)?;
        let stdout = run_with_stdin(&program, &args, &png).map_err(Error::Detection)?;
        let detections = parse_detections(&stdout, confidence)?;
        debug!(count = detections.len(), "objects detected");
        Ok(detections)
    }
}
