//! User-facing activity log
//!
//! Every line is timestamped `[HH:MM:SS] message`, appended to the log file,
//! kept in a short in-memory history and pushed to the presentation layer.
//! The file is only ever appended to.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::events::{PresentationEvent, StateEvent};

/// Number of recent lines kept for status queries
const HISTORY_LEN: usize = 200;

/// Cloneable handle to the activity log
#[derive(Clone)]
pub struct ActivityLog {
    inner: Arc<Inner>,
}

struct Inner {
    path: Option<PathBuf>,
    events: broadcast::Sender<PresentationEvent>,
    /// Serializes file appends, history and event emission so all three agree on order
    history: Mutex<VecDeque<String>>,
}

impl ActivityLog {
    /// Log that appends to `path`
    pub fn new(path: impl Into<PathBuf>, events: broadcast::Sender<PresentationEvent>) -> Self {
        Self::build(Some(path.into()), events)
    }

    /// Log that only keeps history and emits events
    pub fn in_memory(events: broadcast::Sender<PresentationEvent>) -> Self {
        Self::build(None, events)
    }

    fn build(path: Option<PathBuf>, events: broadcast::Sender<PresentationEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                events,
                history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
            }),
        }
    }

    /// Timestamp and record a message
    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        let line = format_line(&chrono::Local::now().format("%H:%M:%S").to_string(), message);

        let mut history = self
            .inner
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(path) = &self.inner.path {
            if let Err(e) = append_line(path, &line) {
                warn!(?path, error = %e, "failed to append to activity log");
            }
        }

        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(line.clone());

        info!(target: "invision::activity", "{}", message);
        // No receivers is fine; the presentation layer may not be attached yet
        let _ = self
            .inner
            .events
            .send(StateEvent::LogLine { line }.into());
    }

    /// Most recent lines, oldest first
    pub fn recent(&self, limit: usize) -> Vec<String> {
        let history = self
            .inner
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Messages without their timestamps, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.recent(HISTORY_LEN)
            .into_iter()
            .map(|line| strip_timestamp(&line).to_string())
            .collect()
    }
}

fn format_line(timestamp: &str, message: &str) -> String {
    format!("[{}] {}", timestamp, message)
}

fn strip_timestamp(line: &str) -> &str {
    match line.find("] ") {
        Some(idx) if line.starts_with('[') => &line[idx + 2..],
        _ => line,
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        assert_eq!(format_line("09:05:01", "Mode stopped."), "[09:05:01] Mode stopped.");
        assert_eq!(strip_timestamp("[09:05:01] Mode stopped."), "Mode stopped.");
        assert_eq!(strip_timestamp("no stamp"), "no stamp");
    }

    #[test]
    fn test_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "[00:00:00] earlier run\n").unwrap();

        let (tx, _rx) = broadcast::channel(16);
        let log = ActivityLog::new(&path, tx);
        log.log("Application started.");
        log.log("Detected: cat");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[00:00:00] earlier run");
        assert!(lines[1].starts_with('['));
        assert!(lines[1].ends_with("] Application started."));
        assert!(lines[2].ends_with("] Detected: cat"));
    }

    #[test]
    fn test_emits_log_events() {
        let (tx, mut rx) = broadcast::channel(16);
        let log = ActivityLog::in_memory(tx);
        log.log("hello");

        match rx.try_recv().unwrap() {
            PresentationEvent::State(StateEvent::LogLine { line }) => {
                assert!(line.ends_with("] hello"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let (tx, _rx) = broadcast::channel(16);
        let log = ActivityLog::in_memory(tx);
        for i in 0..(HISTORY_LEN + 10) {
            log.log(format!("line {}", i));
        }

        let messages = log.messages();
        assert_eq!(messages.len(), HISTORY_LEN);
        assert_eq!(messages[0], "line 10");
        assert_eq!(log.recent(2), log.recent(HISTORY_LEN)[HISTORY_LEN - 2..].to_vec());
    }
}
