//! Announcement throttling
//!
//! A changed observation is announced at once; an unchanged one only after
//! the mode's minimum gap, so a steady scene is repeated periodically while
//! detection flicker stays quiet.

use std::time::{Duration, Instant};

/// Last announcement made by a mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebounceState {
    pub last: String,
    /// `None` until the first announcement
    pub at: Option<Instant>,
}

impl DebounceState {
    pub fn record(&mut self, observation: &str, now: Instant) {
        self.last = observation.to_string();
        self.at = Some(now);
    }
}

/// Per-mode throttling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    /// Unchanged observations are repeated only after this gap
    pub min_gap: Duration,
    /// Observations shorter than this many characters are never announced
    pub min_len: usize,
}

impl DebouncePolicy {
    pub fn objects(min_gap: Duration) -> Self {
        Self { min_gap, min_len: 1 }
    }

    pub fn text(min_gap: Duration, min_len: usize) -> Self {
        Self {
            min_gap,
            min_len: min_len.max(1),
        }
    }

    /// Decide against `state`; see [`should_announce`]
    pub fn should_announce(&self, observation: &str, state: &DebounceState, now: Instant) -> bool {
        should_announce(observation, &state.last, state.at, now, self.min_gap, self.min_len)
    }
}

/// Whether `observation` should be announced now
///
/// False when the observation is empty or shorter than `min_len` characters.
/// Otherwise true when it differs from `last`, or when strictly more than
/// `min_gap` has passed since `last_at`. A mode that never announced has no
/// gap to wait out.
pub fn should_announce(
    observation: &str,
    last: &str,
    last_at: Option<Instant>,
    now: Instant,
    min_gap: Duration,
    min_len: usize,
) -> bool {
    if observation.is_empty() || observation.chars().count() < min_len {
        return false;
    }
    if observation != last {
        return true;
    }
    match last_at {
        Some(at) => now.saturating_duration_since(at) > min_gap,
        None => true,
    }
}
