//! Lazily opened camera handle shared between the coordinator and one loop

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::{CameraSource, Capture, Frame};
use crate::Result;

/// Camera owned by the coordinator
///
/// The capture is opened on first use and kept open across mode switches.
/// The lock is held for the duration of one read or one release, so a
/// release can never interleave with a read.
#[derive(Clone)]
pub struct SharedCamera {
    inner: Arc<Mutex<CameraSlot>>,
}

struct CameraSlot {
    source: Box<dyn CameraSource>,
    capture: Option<Box<dyn Capture>>,
    width: u32,
    height: u32,
    opened: u64,
}

impl CameraSlot {
    /// Open the capture unless an open one exists
    fn ensure_open(&mut self) -> Result<&mut Box<dyn Capture>> {
        let reusable = self
            .capture
            .take()
            .and_then(|mut capture| capture.is_open().then_some(capture));

        let capture = match reusable {
            Some(capture) => capture,
            None => {
                debug!(width = self.width, height = self.height, "opening camera");
                let capture = self.source.open(self.width, self.height)?;
                self.opened += 1;
                capture
            }
        };

        Ok(self.capture.insert(capture))
    }
}

impl SharedCamera {
    /// Wrap a source; nothing is opened until the first read
    pub fn new(source: Box<dyn CameraSource>, width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CameraSlot {
                source,
                capture: None,
                width,
                height,
                opened: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CameraSlot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the camera if needed without reading
    #[cfg(test)]
    fn ensure_open(&self) -> Result<()> {
        self.lock().ensure_open().map(|_| ())
    }

    /// Read the next frame, opening the camera first if needed
    ///
    /// `Ok(None)` is end-of-stream.
    pub fn read_frame(&self) -> Result<Option<Frame>> {
        self.lock().ensure_open()?.read_frame()
    }

    pub fn is_open(&self) -> bool {
        self.lock()
            .capture
            .as_mut()
            .map_or(false, |capture| capture.is_open())
    }

    /// How many times the underlying source has been opened
    pub fn open_count(&self) -> u64 {
        self.lock().opened
    }

    /// Release the capture if one is open
    pub fn release(&self) -> Result<()> {
        let mut slot = self.lock();
        match slot.capture.take() {
            Some(mut capture) => {
                info!("releasing camera");
                capture.release()
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        opens: Arc<AtomicU32>,
        frames: usize,
    }

    struct CountingCapture {
        left: usize,
        open: bool,
    }

    impl CameraSource for CountingSource {
        fn open(&mut self, width: u32, height: u32) -> Result<Box<dyn Capture>> {
            assert_eq!((width, height), (1280, 720));
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingCapture {
                left: self.frames,
                open: true,
            }))
        }
    }

    impl Capture for CountingCapture {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if self.left == 0 {
                return Ok(None);
            }
            self.left -= 1;
            Ok(Some(Frame::new(4, 4)))
        }

        fn is_open(&mut self) -> bool {
            self.open
        }

        fn release(&mut self) -> Result<()> {
            self.open = false;
            Ok(())
        }
    }

    fn camera(frames: usize) -> (SharedCamera, Arc<AtomicU32>) {
        let opens = Arc::new(AtomicU32::new(0));
        let source = CountingSource {
            opens: Arc::clone(&opens),
            frames,
        };
        (SharedCamera::new(Box::new(source), 1280, 720), opens)
    }

    #[test]
    fn test_opens_lazily_and_reuses() {
        let (camera, opens) = camera(3);
        assert!(!camera.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 0);

        assert!(camera.read_frame().unwrap().is_some());
        assert!(camera.read_frame().unwrap().is_some());
        camera.ensure_open().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(camera.open_count(), 1);
        assert!(camera.is_open());
    }

    #[test]
    fn test_reopens_after_release() {
        let (camera, opens) = camera(1);
        camera.ensure_open().unwrap();
        camera.release().unwrap();
        assert!(!camera.is_open());

        assert!(camera.read_frame().unwrap().is_some());
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_release_without_open_is_noop() {
        let (camera, opens) = camera(1);
        camera.release().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }
}
