//! Headless presentation sink
//!
//! Drains the presentation channel so producers never wait on a display.
//! State events are traced; the newest rendered frame is written to the
//! preview file, at most once per `PREVIEW_INTERVAL`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::camera::Frame;
use crate::events::{PresentationEvent, StateEvent};

/// Minimum spacing between preview writes
pub const PREVIEW_INTERVAL: Duration = Duration::from_millis(500);

/// What the sink did before it returned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub state_events: u64,
    pub frames_seen: u64,
    pub previews_written: u64,
}

/// Consumes presentation events until the application exits
pub struct PresentationSink {
    events: broadcast::Receiver<PresentationEvent>,
    preview_path: Option<PathBuf>,
    last_write: Option<Instant>,
    summary: SinkSummary,
}

impl PresentationSink {
    pub fn new(events: broadcast::Receiver<PresentationEvent>, preview_path: Option<PathBuf>) -> Self {
        Self {
            events,
            preview_path,
            last_write: None,
            summary: SinkSummary::default(),
        }
    }

    /// Run until `Exited` arrives or every sender is dropped
    pub async fn run(mut self) -> SinkSummary {
        loop {
            match self.events.recv().await {
                Ok(PresentationEvent::State(event)) => {
                    self.summary.state_events += 1;
                    match &event {
                        StateEvent::LogLine { line } => debug!(%line, "activity"),
                        other => info!(event = %other, "state event"),
                    }
                    if event == StateEvent::Exited {
                        break;
                    }
                }
                Ok(PresentationEvent::Frame(frame)) => {
                    self.summary.frames_seen += 1;
                    self.maybe_write_preview(frame.image).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "presentation sink lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        debug!(?self.summary, "presentation sink finished");
        self.summary
    }

    async fn maybe_write_preview(&mut self, image: Arc<Frame>) {
        let Some(path) = self.preview_path.clone() else {
            return;
        };
        let now = Instant::now();
        if self
            .last_write
            .is_some_and(|at| now.duration_since(at) < PREVIEW_INTERVAL)
        {
            return;
        }
        self.last_write = Some(now);

        let written = tokio::task::spawn_blocking(move || {
            image.save_with_format(&path, image::ImageFormat::Png)
        })
        .await;

        match written {
            Ok(Ok(())) => self.summary.previews_written += 1,
            Ok(Err(e)) => warn!(error = %e, "failed to write preview frame"),
            Err(e) => warn!(error = %e, "preview writer panicked"),
        }
    }
}
