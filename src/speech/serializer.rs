//! Single-consumer speech queue
//!
//! Any thread may enqueue; one dedicated worker speaks items in enqueue
//! order, so utterances never overlap. Enqueueing never blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::engine::SpeechEngine;
use crate::{Error, Result};

/// One queued unit of speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Utterance {
    Speak(String),
    /// Sentinel: the worker exits when it dequeues this
    Terminate,
}

/// Counters maintained by the worker
#[derive(Debug, Default)]
pub struct SpeechStats {
    enqueued: AtomicU64,
    spoken: AtomicU64,
    failed: AtomicU64,
}

impl SpeechStats {
    pub fn spoken(&self) -> u64 {
        self.spoken.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Utterances enqueued but not yet finished
    pub fn pending(&self) -> u64 {
        self.enqueued
            .load(Ordering::SeqCst)
            .saturating_sub(self.spoken() + self.failed())
    }
}

/// Cloneable producer side of the speech queue
#[derive(Clone)]
pub struct SpeechQueue {
    /// `None` once the sentinel has been sent; the lock keeps the sentinel last
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Utterance>>>>,
    stats: Arc<SpeechStats>,
}

impl SpeechQueue {
    /// Queue text for speech; empty text is ignored
    ///
    /// # Errors
    ///
    /// Returns `SpeechClosed` after termination was requested
    pub fn enqueue(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        if text.trim().is_empty() {
            return Ok(());
        }

        let guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tx = guard.as_ref().ok_or(Error::SpeechClosed)?;
        tx.send(Utterance::Speak(text)).map_err(|_| Error::SpeechClosed)?;
        self.stats.enqueued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Like `enqueue`, but a closed queue is only traced
    pub fn say(&self, text: impl Into<String>) {
        let text = text.into();
        if let Err(e) = self.enqueue(text.as_str()) {
            debug!(error = %e, text = %text, "utterance dropped");
        }
    }

    /// Send the termination sentinel; returns false if it was already sent
    fn terminate(&self) -> bool {
        let mut guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.take() {
            Some(tx) => {
                let _ = tx.send(Utterance::Terminate);
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    pub fn stats(&self) -> &SpeechStats {
        &self.stats
    }
}

/// Owns the speech worker thread
pub struct SpeechSerializer {
    queue: SpeechQueue,
    worker: Option<JoinHandle<()>>,
}

impl SpeechSerializer {
    /// Spawn the worker thread around a speech engine
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn spawn<E: SpeechEngine>(mut engine: E) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Utterance>();
        let stats = Arc::new(SpeechStats::default());
        let worker_stats = Arc::clone(&stats);

        let worker = thread::Builder::new()
            .name("speech-serializer".to_string())
            .spawn(move || {
                info!("speech worker started");

                while let Some(utterance) = rx.blocking_recv() {
                    match utterance {
                        Utterance::Terminate => break,
                        Utterance::Speak(text) => match engine.speak(&text) {
                            Ok(()) => {
                                worker_stats.spoken.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(e) => {
                                warn!(error = %e, text = %text, "speech failed");
                                worker_stats.failed.fetch_add(1, Ordering::SeqCst);
                            }
                        },
                    }
                }

                info!("speech worker stopped");
            })?;

        Ok(Self {
            queue: SpeechQueue {
                tx: Arc::new(Mutex::new(Some(tx))),
                stats,
            },
            worker: Some(worker),
        })
    }

    /// Producer handle for loops and the coordinator
    pub fn queue(&self) -> SpeechQueue {
        self.queue.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Enqueue the sentinel and wait up to `grace` for the worker to drain
    ///
    /// Returns true if the worker finished in time. A worker stuck in a
    /// synthesis call is left detached.
    pub fn shutdown(&mut self, grace: Duration) -> bool {
        if self.queue.terminate() {
            debug!("speech termination requested");
        }

        let Some(worker) = self.worker.take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        if worker.is_finished() {
            if worker.join().is_err() {
                warn!("speech worker panicked");
            }
            true
        } else {
            warn!(
                pending = self.queue.stats().pending(),
                "speech did not drain within grace period"
            );
            self.worker = Some(worker);
            false
        }
    }
}

impl Drop for SpeechSerializer {
    fn drop(&mut self) {
        self.queue.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Records utterances and checks no two calls overlap
    #[derive(Clone, Default)]
    struct Recorder {
        spoken: Arc<Mutex<Vec<String>>>,
        active: Arc<AtomicUsize>,
        overlapped: Arc<AtomicUsize>,
        delay: Duration,
        fail_on: Option<&'static str>,
    }

    impl SpeechEngine for Recorder {
        fn speak(&mut self, text: &str) -> Result<()> {
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.map_or(false, |bad| bad == text) {
                return Err(Error::Speech("synthesizer crashed".to_string()));
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_speaks_in_submission_order_without_overlap() {
        let recorder = Recorder {
            delay: Duration::from_millis(2),
            ..Recorder::default()
        };
        let mut serializer = SpeechSerializer::spawn(recorder.clone()).unwrap();

        let mut producers = Vec::new();
        let queue = serializer.queue();
        for i in 0..10 {
            queue.enqueue(format!("main {}", i)).unwrap();
        }
        for p in 0..3 {
            let queue = serializer.queue();
            producers.push(thread::spawn(move || {
                for i in 0..5 {
                    queue.enqueue(format!("producer {} item {}", p, i)).unwrap();
                }
            }));
        }
        for producer in producers {
            producer.join().unwrap();
        }

        assert!(serializer.shutdown(Duration::from_secs(5)));
        let spoken = recorder.spoken.lock().unwrap().clone();
        assert_eq!(spoken.len(), 25);
        assert_eq!(&spoken[..10], &(0..10).map(|i| format!("main {}", i)).collect::<Vec<_>>()[..]);
        for p in 0..3 {
            let mine: Vec<_> = spoken
                .iter()
                .filter(|s| s.starts_with(&format!("producer {} ", p)))
                .cloned()
                .collect();
            let expected: Vec<_> = (0..5).map(|i| format!("producer {} item {}", p, i)).collect();
            assert_eq!(mine, expected);
        }
        assert_eq!(recorder.overlapped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_does_not_stop_worker() {
        let recorder = Recorder {
            fail_on: Some("bad"),
            ..Recorder::default()
        };
        let mut serializer = SpeechSerializer::spawn(recorder.clone()).unwrap();
        let queue = serializer.queue();
        queue.enqueue("first").unwrap();
        queue.enqueue("bad").unwrap();
        queue.enqueue("after").unwrap();

        assert!(serializer.shutdown(Duration::from_secs(5)));
        assert_eq!(*recorder.spoken.lock().unwrap(), vec!["first", "after"]);
        assert_eq!(queue.stats().spoken(), 2);
        assert_eq!(queue.stats().failed(), 1);
        assert_eq!(queue.stats().pending(), 0);
    }

    #[test]
    fn test_empty_text_is_ignored() {
        let recorder = Recorder::default();
        let mut serializer = SpeechSerializer::spawn(recorder.clone()).unwrap();
        serializer.queue().enqueue("").unwrap();
        serializer.queue().enqueue("   ").unwrap();

        assert!(serializer.shutdown(Duration::from_secs(5)));
        assert!(recorder.spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn test_enqueue_after_shutdown_is_refused() {
        let mut serializer = SpeechSerializer::spawn(Recorder::default()).unwrap();
        let queue = serializer.queue();
        assert!(serializer.shutdown(Duration::from_secs(5)));

        assert!(queue.is_closed());
        assert!(matches!(queue.enqueue("too late"), Err(Error::SpeechClosed)));
        assert!(serializer.is_finished());
        // second shutdown is a no-op
        assert!(serializer.shutdown(Duration::from_millis(1)));
    }

    #[test]
    fn test_shutdown_grace_expires_on_slow_engine() {
        let recorder = Recorder {
            delay: Duration::from_millis(300),
            ..Recorder::default()
        };
        let mut serializer = SpeechSerializer::spawn(recorder).unwrap();
        serializer.queue().enqueue("slow one").unwrap();
        serializer.queue().enqueue("slow two").unwrap();

        assert!(!serializer.shutdown(Duration::from_millis(20)));
        assert!(serializer.shutdown(Duration::from_secs(5)));
    }
}
