//! Replays still images from a directory as a camera stream

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{CameraSource, Capture, Frame};
use crate::{Error, Result};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Frames from image files, in file name order
pub struct DirectorySource {
    path: PathBuf,
}

impl DirectorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

impl CameraSource for DirectorySource {
    fn open(&mut self, width: u32, height: u32) -> Result<Box<dyn Capture>> {
        if !self.path.is_dir() {
            return Err(Error::Camera(format!(
                "frame directory not found: {}",
                self.path.display()
            )));
        }

        let files = list_images(&self.path)?;
        info!(path = %self.path.display(), frames = files.len(), width, height, "frame directory opened");

        Ok(Box::new(DirectoryCapture {
            remaining: files.into(),
            released: false,
        }))
    }
}

struct DirectoryCapture {
    remaining: VecDeque<PathBuf>,
    released: bool,
}

impl Capture for DirectoryCapture {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Err(Error::Camera("capture already released".to_string()));
        }
        let Some(path) = self.remaining.pop_front() else {
            return Ok(None);
        };
        debug!(path = %path.display(), "reading frame");
        Ok(Some(image::open(&path)?.to_rgb8()))
    }

    fn is_open(&mut self) -> bool {
        !self.released
    }

    fn release(&mut self) -> Result<()> {
        self.released = true;
        self.remaining.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_images_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        Frame::from_pixel(4, 3, image::Rgb([255, 0, 0]))
            .save(dir.path().join("b.png"))
            .unwrap();
        Frame::from_pixel(2, 2, image::Rgb([0, 255, 0]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = DirectorySource::new(dir.path());
        let mut capture = source.open(1280, 720).unwrap();

        let first = capture.read_frame().unwrap().unwrap();
        assert_eq!(first.dimensions(), (2, 2));
        let second = capture.read_frame().unwrap().unwrap();
        assert_eq!(second.dimensions(), (4, 3));
        assert!(capture.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_directory_fails_to_open() {
        let mut source = DirectorySource::new("/definitely/not/here");
        assert!(matches!(source.open(1, 1), Err(Error::Camera(_))));
    }

    #[test]
    fn test_release_closes_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut capture = DirectorySource::new(dir.path()).open(1, 1).unwrap();
        assert!(capture.is_open());
        capture.release().unwrap();
        assert!(!capture.is_open());
        assert!(capture.read_frame().is_err());
    }
}
