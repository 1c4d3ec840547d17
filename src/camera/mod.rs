//! Frame acquisition
//!
//! A `CameraSource` opens a `Capture`, which yields frames until
//! end-of-stream. `SharedCamera` is the lazily opened handle the coordinator
//! owns and lends to one perception loop at a time.

mod directory;
mod ffmpeg;
mod shared;

use crate::config::{CameraBackend, CameraConfig};
use crate::Result;

pub use directory::DirectorySource;
pub use ffmpeg::FfmpegSource;
pub use shared::SharedCamera;

/// A captured frame, 8-bit RGB
pub type Frame = image::RgbImage;

/// An open capture stream
pub trait Capture: Send {
    /// Next frame; `Ok(None)` signals end-of-stream
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Whether the stream can still produce frames
    fn is_open(&mut self) -> bool {
        true
    }

    fn release(&mut self) -> Result<()>;
}

/// Something that can open a capture stream at a requested resolution
pub trait CameraSource: Send + 'static {
    fn open(&mut self, width: u32, height: u32) -> Result<Box<dyn Capture>>;
}

/// Build the configured camera source
pub fn source_from_config(config: &CameraConfig) -> Box<dyn CameraSource> {
    match &config.backend {
        CameraBackend::Ffmpeg { format, device } => {
            Box::new(FfmpegSource::new(format.clone(), device.clone()))
        }
        CameraBackend::Directory { path } => Box::new(DirectorySource::new(path.clone())),
    }
}
