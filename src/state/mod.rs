//! Mode management
//!
//! Provides the three operating modes and the coordinator that moves
//! between them:
//! - Idle: no perception loop, camera kept open if it was opened before
//! - ObjectDetection: announce what the camera sees
//! - TextReading: read visible text aloud

mod machine;
mod mode;

pub use machine::{
    Backends, ControlCommand, CoordinatorSettings, CoordinatorStatus, ExitReport, ModeCoordinator,
};
pub use mode::Mode;
