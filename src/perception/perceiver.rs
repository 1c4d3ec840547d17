//! Mode-specific perception: turn one frame into an observation

use std::sync::{Arc, Mutex};

use image::imageops::{self, FilterType};

use super::annotate::draw_detections;
use super::detector::ObjectDetector;
use super::observation::{canonical_labels, clean_text};
use super::ocr::{preprocess, TextExtractor};
use crate::camera::Frame;
use crate::state::Mode;
use crate::{Error, Result};

/// Detector shared by successive object-mode loops
pub type SharedDetector = Arc<Mutex<Box<dyn ObjectDetector>>>;

/// Extractor shared by successive text-mode loops
pub type SharedExtractor = Arc<Mutex<Box<dyn TextExtractor>>>;

pub fn shared_detector<D: ObjectDetector>(detector: D) -> SharedDetector {
    let detector: Box<dyn ObjectDetector> = Box::new(detector);
    Arc::new(Mutex::new(detector))
}

pub fn shared_extractor<E: TextExtractor>(extractor: E) -> SharedExtractor {
    let extractor: Box<dyn TextExtractor> = Box::new(extractor);
    Arc::new(Mutex::new(extractor))
}

/// Result of perceiving one frame
pub struct Perceived {
    /// Canonical observation, or the backend failure
    pub observation: Result<String>,
    /// Frame to render, possibly resized or annotated
    pub frame: Frame,
}

/// The perception half of a loop, bound to one mode
pub trait Perceiver: Send + 'static {
    fn mode(&self) -> Mode;

    fn perceive(&mut self, frame: Frame) -> Perceived;

    /// Activity log line for an announced observation
    fn log_message(&self, observation: &str) -> String;

    /// Utterance for an announced observation
    fn announcement(&self, observation: &str) -> String;

    /// Activity log line for a failed perception call
    fn error_message(&self, error: &Error) -> String;
}

/// Object detection on frames resized to the working resolution
pub struct ObjectPerceiver {
    detector: SharedDetector,
    confidence: f32,
    working_size: (u32, u32),
}

impl ObjectPerceiver {
    pub fn new(detector: SharedDetector, confidence: f32, working_size: (u32, u32)) -> Self {
        Self {
            detector,
            confidence,
            working_size,
        }
    }
}

impl Perceiver for ObjectPerceiver {
    fn mode(&self) -> Mode {
        Mode::ObjectDetection
    }

    fn perceive(&mut self, frame: Frame) -> Perceived {
        let (width, height) = self.working_size;
        let mut frame = if frame.dimensions() == (width, height) {
            frame
        } else {
            imageops::resize(&frame, width, height, FilterType::Triangle)
        };

        let detected = self
            .detector
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .detect(&frame, self.confidence);

        let observation = detected.map(|detections| {
            draw_detections(&mut frame, &detections);
            let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
            canonical_labels(&labels)
        });

        Perceived { observation, frame }
    }

    fn log_message(&self, observation: &str) -> String {
        format!("Detected: {}", observation)
    }

    fn announcement(&self, observation: &str) -> String {
        format!("I can see {}", observation)
    }

    fn error_message(&self, error: &Error) -> String {
        match error {
            Error::Detection(reason) => format!("Detection error: {}", reason),
            other => format!("Detection error: {}", other),
        }
    }
}

/// Text extraction on a blurred grayscale copy; the frame renders unchanged
pub struct TextPerceiver {
    extractor: SharedExtractor,
}

impl TextPerceiver {
    pub fn new(extractor: SharedExtractor) -> Self {
        Self { extractor }
    }
}

impl Perceiver for TextPerceiver {
    fn mode(&self) -> Mode {
        Mode::TextReading
    }

    fn perceive(&mut self, frame: Frame) -> Perceived {
        let gray = preprocess(&frame);
        let observation = self
            .extractor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extract(&gray)
            .map(|raw| clean_text(&raw));

        Perceived { observation, frame }
    }

    fn log_message(&self, observation: &str) -> String {
        format!("Text detected: {}", observation)
    }

    fn announcement(&self, observation: &str) -> String {
        format!("The text says {}", observation)
    }

    fn error_message(&self, error: &Error) -> String {
        match error {
            Error::Ocr(reason) => format!("Text reading error: {}", reason),
            other => format!("Text reading error: {}", other),
        }
    }
}
