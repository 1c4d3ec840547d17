//! Scripted backends shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::GrayImage;
use tokio::sync::broadcast;

use invision::activity_log::ActivityLog;
use invision::camera::{CameraSource, Capture, Frame, SharedCamera};
use invision::events::PresentationEvent;
use invision::perception::{
    shared_detector, shared_extractor, DebouncePolicy, Detection, LoopSettings, ObjectDetector,
    TextExtractor,
};
use invision::speech::{SpeechEngine, SpeechSerializer};
use invision::state::{Backends, CoordinatorSettings, ModeCoordinator};
use invision::{Error, Result};

/// Records every utterance it is asked to speak
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn spoken(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn heard(&self, text: &str) -> bool {
        self.0.lock().unwrap().iter().any(|t| t == text)
    }
}

impl SpeechEngine for Recorder {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Returns one scripted label set per call, repeating the last one forever
pub struct ScriptedDetector {
    script: VecDeque<Result<Vec<&'static str>>>,
    last: Vec<&'static str>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Result<Vec<&'static str>>>) -> Self {
        Self {
            script: script.into(),
            last: Vec::new(),
        }
    }

    pub fn always(labels: Vec<&'static str>) -> Self {
        Self::new(vec![Ok(labels)])
    }
}

impl ObjectDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame, _confidence: f32) -> Result<Vec<Detection>> {
        let labels = match self.script.pop_front() {
            Some(Ok(labels)) => {
                self.last = labels.clone();
                labels
            }
            Some(Err(e)) => return Err(e),
            None => self.last.clone(),
        };
        Ok(labels
            .into_iter()
            .map(|label| Detection {
                label: label.to_string(),
                confidence: 0.9,
                bbox: [1, 1, 4, 4],
            })
            .collect())
    }
}

/// Always reads the same text
pub struct FixedText(pub &'static str);

impl TextExtractor for FixedText {
    fn extract(&mut self, _image: &GrayImage) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Extraction that always fails
pub struct BrokenOcr;

impl TextExtractor for BrokenOcr {
    fn extract(&mut self, _image: &GrayImage) -> Result<String> {
        Err(Error::Ocr("engine missing".to_string()))
    }
}

/// Write `count` small PNG frames into `dir`
pub fn write_frames(dir: &Path, count: usize) {
    for i in 0..count {
        let frame = Frame::from_pixel(24, 16, image::Rgb([40, 80, (i * 10) as u8]));
        frame.save(dir.join(format!("frame-{:03}.png", i))).unwrap();
    }
}

pub fn settings(object_gap: Duration, text_gap: Duration) -> CoordinatorSettings {
    let loop_settings = |policy| LoopSettings {
        policy,
        interval: Duration::from_millis(5),
        render_size: (12, 8),
    };
    CoordinatorSettings {
        object: loop_settings(DebouncePolicy::objects(object_gap)),
        text: loop_settings(DebouncePolicy::text(text_gap, 5)),
        confidence: 0.35,
        working_size: (16, 12),
        exit_grace: Duration::from_secs(2),
    }
}

pub struct Harness {
    pub coordinator: ModeCoordinator,
    pub recorder: Recorder,
    pub events: broadcast::Receiver<PresentationEvent>,
}

pub fn harness(
    camera: SharedCamera,
    detector: impl ObjectDetector,
    extractor: impl TextExtractor,
    settings: CoordinatorSettings,
    log: impl FnOnce(broadcast::Sender<PresentationEvent>) -> ActivityLog,
) -> Harness {
    let recorder = Recorder::default();
    let (tx, events) = broadcast::channel(1024);
    let coordinator = ModeCoordinator::new(
        camera,
        SpeechSerializer::spawn(recorder.clone()).unwrap(),
        Backends {
            detector: shared_detector(detector),
            extractor: shared_extractor(extractor),
        },
        settings,
        log(tx.clone()),
        tx,
    );
    Harness {
        coordinator,
        recorder,
        events,
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Blank frames forever
pub struct EndlessSource;

struct EndlessCapture {
    released: bool,
}

impl CameraSource for EndlessSource {
    fn open(&mut self, _width: u32, _height: u32) -> Result<Box<dyn Capture>> {
        Ok(Box::new(EndlessCapture { released: false }))
    }
}

impl Capture for EndlessCapture {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        Ok(Some(Frame::new(32, 24)))
    }

    fn is_open(&mut self) -> bool {
        !self.released
    }

    fn release(&mut self) -> Result<()> {
        self.released = true;
        Ok(())
    }
}

pub fn endless_camera() -> SharedCamera {
    SharedCamera::new(Box::new(EndlessSource), 640, 480)
}
