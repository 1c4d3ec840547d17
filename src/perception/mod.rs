//! Perception: detectors, text extraction, debouncing and the loop that ties them together

mod annotate;
pub mod debounce;
mod detector;
pub mod observation;
mod ocr;
mod perceiver;
mod run_loop;

use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::Result;

pub use annotate::draw_detections;
pub use debounce::{should_announce, DebouncePolicy, DebounceState};
pub use detector::{CommandDetector, Detection, ObjectDetector};
pub use ocr::{preprocess, CommandTextExtractor, TextExtractor};
pub use perceiver::{
    shared_detector, shared_extractor, ObjectPerceiver, Perceived, Perceiver, SharedDetector,
    SharedExtractor, TextPerceiver,
};
pub use run_loop::{LoopOutputs, LoopSettings, PerceptionLoop};

/// Encode raw pixels as PNG for handing to a backend process
pub(crate) fn encode_png(raw: &[u8], width: u32, height: u32, color: ExtendedColorType) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(Cursor::new(&mut buf)).write_image(raw, width, height, color)?;
    Ok(buf)
}
