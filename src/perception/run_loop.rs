//! The perception loop: frame → observation → debounce → speech, once per tick

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::imageops::{self, FilterType};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::debounce::{DebouncePolicy, DebounceState};
use super::perceiver::Perceiver;
use crate::activity_log::ActivityLog;
use crate::camera::{Frame, SharedCamera};
use crate::events::{PresentationEvent, RenderedFrame, StateEvent, StopReason};
use crate::lifecycle::StopToken;
use crate::speech::SpeechQueue;
use crate::state::Mode;

/// Timing and geometry for one loop
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub policy: DebouncePolicy,
    /// Pause after every iteration
    pub interval: Duration,
    /// Size of frames sent to the presentation layer
    pub render_size: (u32, u32),
}

/// Collaborators a loop reports to
#[derive(Clone)]
pub struct LoopOutputs {
    pub speech: SpeechQueue,
    pub log: ActivityLog,
    pub events: broadcast::Sender<PresentationEvent>,
}

/// A single run of one mode's perception
///
/// Runs on its own thread until its stop token is cancelled or the camera
/// stops producing frames.
pub struct PerceptionLoop {
    perceiver: Box<dyn Perceiver>,
    camera: SharedCamera,
    debounce: Arc<Mutex<DebounceState>>,
    settings: LoopSettings,
    outputs: LoopOutputs,
}

impl PerceptionLoop {
    pub fn new(
        perceiver: Box<dyn Perceiver>,
        camera: SharedCamera,
        debounce: Arc<Mutex<DebounceState>>,
        settings: LoopSettings,
        outputs: LoopOutputs,
    ) -> Self {
        Self {
            perceiver,
            camera,
            debounce,
            settings,
            outputs,
        }
    }

    pub fn mode(&self) -> Mode {
        self.perceiver.mode()
    }

    /// Run until stopped; returns why the loop ended
    pub fn run(mut self, stop: StopToken) -> StopReason {
        let mode = self.mode();
        info!(mode = %mode, "perception loop started");

        let mut sequence: u64 = 0;
        let reason = loop {
            if stop.is_cancelled() {
                break StopReason::Requested;
            }

            let frame = match self.camera.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.outputs.log.log("Camera stream ended.");
                    break StopReason::EndOfStream;
                }
                Err(e) => {
                    warn!(error = %e, "frame read failed");
                    self.outputs.log.log(format!("Camera read failed: {}", e));
                    break StopReason::ReadFailure;
                }
            };

            let perceived = self.perceiver.perceive(frame);
            let observation = match perceived.observation {
                Ok(observation) => observation,
                Err(e) => {
                    self.outputs.log.log(self.perceiver.error_message(&e));
                    String::new()
                }
            };

            self.consider(&observation, Instant::now());
            self.render(perceived.frame, sequence);
            sequence += 1;

            thread::sleep(self.settings.interval);
        };

        info!(mode = %mode, reason = %reason, iterations = sequence, "perception loop stopped");
        let _ = self
            .outputs
            .events
            .send(StateEvent::ModeStopped { mode, reason }.into());
        reason
    }

    /// Debounce an observation and announce it if it passes
    fn consider(&self, observation: &str, now: Instant) {
        let mut state = self
            .debounce
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !self.settings.policy.should_announce(observation, &state, now) {
            return;
        }
        state.record(observation, now);
        drop(state);

        debug!(observation, "announcing");
        self.outputs.log.log(self.perceiver.log_message(observation));
        self.outputs.speech.say(self.perceiver.announcement(observation));
    }

    fn render(&self, frame: Frame, sequence: u64) {
        // Skip the resize when nobody is watching
        if self.outputs.events.receiver_count() == 0 {
            return;
        }

        let (width, height) = self.settings.render_size;
        let image = if frame.dimensions() == (width, height) {
            frame
        } else {
            imageops::resize(&frame, width, height, FilterType::Triangle)
        };

        let _ = self.outputs.events.send(PresentationEvent::Frame(RenderedFrame {
            mode: self.mode(),
            sequence,
            image: Arc::new(image),
        }));
    }
}
