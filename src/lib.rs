//! invision: camera-driven assistance for blind and low-vision users
//!
//! A mode coordinator runs at most one perception loop at a time. Object
//! detection announces what the camera sees; text reading reads visible
//! text aloud. Every utterance goes through one speech serializer so the
//! user never hears two voices at once.

pub mod activity_log;
pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod ipc;
pub mod lifecycle;
pub mod perception;
pub mod presentation;
pub(crate) mod process;
pub mod speech;
pub mod state;

pub use error::{Error, Result};
