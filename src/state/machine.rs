//! Mode coordinator
//!
//! Owns the camera, the speech serializer and at most one running
//! perception loop. Handles start, stop and exit requests, either called
//! directly or delivered as `ControlCommand`s on its own thread.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::Mode;
use crate::activity_log::ActivityLog;
use crate::camera::{self, SharedCamera};
use crate::config::Config;
use crate::events::{PresentationEvent, StateEvent, StopReason};
use crate::lifecycle::StopToken;
use crate::perception::{
    shared_detector, shared_extractor, CommandDetector, CommandTextExtractor, DebouncePolicy,
    DebounceState, LoopOutputs, LoopSettings, ObjectPerceiver, PerceptionLoop, Perceiver,
    SharedDetector, SharedExtractor, TextPerceiver,
};
use crate::speech::{CommandSpeech, SpeechQueue, SpeechSerializer};
use crate::Result;

const WELCOME: &str =
    "Welcome to Invision AI. An eye for the blind. Choose object detection or text reading mode.";
const STOPPING: &str = "Stopping current mode.";
const GOODBYE: &str = "Invision AI shutting down. Goodbye.";

/// Lines of recent activity included in a status snapshot
const STATUS_LOG_LINES: usize = 20;

/// Requests delivered to a coordinator running on its own thread
#[derive(Debug)]
pub enum ControlCommand {
    Start(Mode),
    Stop,
    Status(oneshot::Sender<CoordinatorStatus>),
    Exit,
}

/// Snapshot of the coordinator for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub mode: Mode,
    pub camera_open: bool,
    pub speech_pending: u64,
    pub speech_spoken: u64,
    pub speech_failed: u64,
    pub recent_log: Vec<String>,
}

/// What exit managed to finish within its grace period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub speech_drained: bool,
    pub loop_finished: bool,
}

/// Perception backends reused by every loop of their mode
#[derive(Clone)]
pub struct Backends {
    pub detector: SharedDetector,
    pub extractor: SharedExtractor,
}

/// Per-mode loop parameters
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    pub object: LoopSettings,
    pub text: LoopSettings,
    pub confidence: f32,
    /// Object frames are resized to this before detection
    pub working_size: (u32, u32),
    pub exit_grace: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        let render_size = (config.camera.render_width, config.camera.render_height);
        Self {
            object: LoopSettings {
                policy: DebouncePolicy::objects(Duration::from_secs_f64(config.timing.object_gap_secs)),
                interval: Duration::from_millis(config.timing.object_interval_ms),
                render_size,
            },
            text: LoopSettings {
                policy: DebouncePolicy::text(
                    Duration::from_secs_f64(config.timing.text_gap_secs),
                    config.ocr.min_text_len,
                ),
                interval: Duration::from_millis(config.timing.text_interval_ms),
                render_size,
            },
            confidence: config.detection.confidence,
            working_size: (config.camera.working_width, config.camera.working_height),
            exit_grace: config.exit_grace(),
        }
    }
}

/// A launched perception loop
struct ActiveLoop {
    mode: Mode,
    stop: StopToken,
    handle: JoinHandle<StopReason>,
}

impl ActiveLoop {
    fn is_running(&self) -> bool {
        !self.stop.is_cancelled() && !self.handle.is_finished()
    }
}

/// Coordinates modes, the camera and speech
pub struct ModeCoordinator {
    active: Option<ActiveLoop>,
    camera: SharedCamera,
    speech: SpeechSerializer,
    backends: Backends,
    settings: CoordinatorSettings,
    object_debounce: Arc<Mutex<DebounceState>>,
    text_debounce: Arc<Mutex<DebounceState>>,
    log: ActivityLog,
    events: broadcast::Sender<PresentationEvent>,
    exited: bool,
}

impl ModeCoordinator {
    /// Create a coordinator; greets the user and logs startup
    pub fn new(
        camera: SharedCamera,
        speech: SpeechSerializer,
        backends: Backends,
        settings: CoordinatorSettings,
        log: ActivityLog,
        events: broadcast::Sender<PresentationEvent>,
    ) -> Self {
        let coordinator = Self {
            active: None,
            camera,
            speech,
            backends,
            settings,
            object_debounce: Arc::default(),
            text_debounce: Arc::default(),
            log,
            events,
            exited: false,
        };

        coordinator.speech().say(WELCOME);
        coordinator.log.log("Application started.");
        coordinator
    }

    /// Build a coordinator with the command-line backends named in `config`
    ///
    /// # Errors
    ///
    /// Returns error if a backend is misconfigured or the speech thread
    /// cannot be spawned
    pub fn from_config(config: &Config, events: broadcast::Sender<PresentationEvent>) -> Result<Self> {
        let camera = SharedCamera::new(
            camera::source_from_config(&config.camera),
            config.camera.capture_width,
            config.camera.capture_height,
        );
        let speech = SpeechSerializer::spawn(CommandSpeech::new(&config.speech)?)?;
        let backends = Backends {
            detector: shared_detector(CommandDetector::new(&config.detection)?),
            extractor: shared_extractor(CommandTextExtractor::new(&config.ocr)?),
        };
        let log = ActivityLog::new(&config.log_file, events.clone());

        Ok(Self::new(
            camera,
            speech,
            backends,
            CoordinatorSettings::from_config(config),
            log,
            events,
        ))
    }

    /// Mode of the running loop; Idle once it has been stopped or has ended
    pub fn mode(&self) -> Mode {
        self.active
            .as_ref()
            .filter(|active| active.is_running())
            .map_or(Mode::Idle, |active| active.mode)
    }

    pub fn is_running(&self) -> bool {
        self.mode().is_active()
    }

    pub fn speech(&self) -> SpeechQueue {
        self.speech.queue()
    }

    pub fn camera(&self) -> &SharedCamera {
        &self.camera
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    /// Last announcement made in `mode`
    pub fn debounce_state(&self, mode: Mode) -> Option<DebounceState> {
        let state = self.debounce_for(mode)?;
        let guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Some(guard.clone())
    }

    fn debounce_for(&self, mode: Mode) -> Option<&Arc<Mutex<DebounceState>>> {
        match mode {
            Mode::Idle => None,
            Mode::ObjectDetection => Some(&self.object_debounce),
            Mode::TextReading => Some(&self.text_debounce),
        }
    }

    fn perceiver_for(&self, mode: Mode) -> Option<(Box<dyn Perceiver>, LoopSettings)> {
        let perceiver: Box<dyn Perceiver> = match mode {
            Mode::Idle => return None,
            Mode::ObjectDetection => Box::new(ObjectPerceiver::new(
                Arc::clone(&self.backends.detector),
                self.settings.confidence,
                self.settings.working_size,
            )),
            Mode::TextReading => Box::new(TextPerceiver::new(Arc::clone(&self.backends.extractor))),
        };
        let settings = match mode {
            Mode::TextReading => self.settings.text,
            _ => self.settings.object,
        };
        Some((perceiver, settings))
    }

    /// Launch the loop for `mode`
    ///
    /// Returns false without changing anything if a loop is already running,
    /// `mode` is Idle, or the coordinator has exited.
    pub fn start(&mut self, mode: Mode) -> bool {
        if self.exited {
            warn!(mode = %mode, "start requested after exit");
            return false;
        }
        if self.is_running() {
            debug!(requested = %mode, current = %self.mode(), "mode already active, ignoring start");
            return false;
        }
        let (Some((perceiver, settings)), Some(debounce)) =
            (self.perceiver_for(mode), self.debounce_for(mode).cloned())
        else {
            debug!("ignoring start of idle mode");
            return false;
        };

        // A stopped loop may still be finishing its last iteration
        self.reap();

        if let Some(message) = mode.start_message() {
            self.log.log(message);
        }
        if let Some(utterance) = mode.activation_utterance() {
            self.speech().say(utterance);
        }

        let run = PerceptionLoop::new(
            perceiver,
            self.camera.clone(),
            debounce,
            settings,
            LoopOutputs {
                speech: self.speech(),
                log: self.log.clone(),
                events: self.events.clone(),
            },
        );
        let stop = StopToken::new();
        let token = stop.clone();

        let spawned = thread::Builder::new()
            .name(format!("perception-{}", mode).to_lowercase())
            .spawn(move || run.run(token));

        match spawned {
            Ok(handle) => {
                info!(mode = %mode, "mode started");
                self.active = Some(ActiveLoop { mode, stop, handle });
                let _ = self.events.send(StateEvent::ModeStarted { mode }.into());
                true
            }
            Err(e) => {
                error!(error = %e, "failed to spawn perception loop");
                self.log.log(format!("Could not start {}: {}", mode, e));
                false
            }
        }
    }

    /// Ask the running loop to stop after its current iteration
    ///
    /// Returns false, after logging a notice, if nothing is running.
    pub fn stop(&mut self) -> bool {
        let Some(active) = self.active.as_ref().filter(|active| active.is_running()) else {
            self.log.log("No active mode to stop.");
            return false;
        };

        info!(mode = %active.mode, "stopping mode");
        active.stop.cancel();
        self.speech().say(STOPPING);
        self.log.log("Mode stopped.");
        true
    }

    /// Join a previous loop that has been stopped or has ended
    fn reap(&mut self) {
        if let Some(previous) = self.active.take() {
            previous.stop.cancel();
            match previous.handle.join() {
                Ok(reason) => debug!(mode = %previous.mode, reason = %reason, "previous loop joined"),
                Err(_) => warn!(mode = %previous.mode, "perception loop panicked"),
            }
        }
    }

    /// Wait up to `grace` for the active loop to finish
    fn wait_for_loop(&mut self, grace: Duration) -> bool {
        let Some(active) = self.active.take() else {
            return true;
        };
        active.stop.cancel();

        let deadline = Instant::now() + grace;
        while !active.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        if active.handle.is_finished() {
            if active.handle.join().is_err() {
                warn!(mode = %active.mode, "perception loop panicked");
            }
            true
        } else {
            warn!(mode = %active.mode, "perception loop still busy at exit, detaching");
            false
        }
    }

    /// Stop everything: say goodbye, drain speech, release the camera
    ///
    /// The termination sentinel is always the last utterance queued. Calling
    /// exit twice does nothing the second time.
    pub fn exit(&mut self) -> ExitReport {
        if self.exited {
            return ExitReport {
                speech_drained: self.speech.is_finished(),
                loop_finished: self.active.is_none(),
            };
        }
        self.exited = true;

        if let Some(active) = &self.active {
            active.stop.cancel();
        }
        self.speech().say(GOODBYE);
        self.log.log("Application closed.");

        let grace = self.settings.exit_grace;
        let speech_drained = self.speech.shutdown(grace);
        let loop_finished = self.wait_for_loop(grace);

        if let Err(e) = self.camera.release() {
            debug!(error = %e, "camera release failed during exit");
        }

        let _ = self.events.send(StateEvent::Exited.into());
        info!(speech_drained, loop_finished, "coordinator exited");

        ExitReport {
            speech_drained,
            loop_finished,
        }
    }

    pub fn status(&self) -> CoordinatorStatus {
        let queue = self.speech();
        let stats = queue.stats();
        CoordinatorStatus {
            mode: self.mode(),
            camera_open: self.camera.is_open(),
            speech_pending: stats.pending(),
            speech_spoken: stats.spoken(),
            speech_failed: stats.failed(),
            recent_log: self.log.recent(STATUS_LOG_LINES),
        }
    }

    /// Process commands until `Exit` arrives or every sender is gone
    ///
    /// Blocks the calling thread; run it on a dedicated thread.
    pub fn run(mut self, mut commands: mpsc::Receiver<ControlCommand>) -> ExitReport {
        info!("mode coordinator started in Idle mode");

        while let Some(command) = commands.blocking_recv() {
            debug!(?command, "control command");
            match command {
                ControlCommand::Start(mode) => {
                    self.start(mode);
                }
                ControlCommand::Stop => {
                    self.stop();
                }
                ControlCommand::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                ControlCommand::Exit => break,
            }
        }

        self.exit()
    }
}
