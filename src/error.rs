//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the capture scheduler and
//! its collaborators. Using the `thiserror` crate, it provides a centralized and consistent
//! way to handle everything from bad arguments to a camera that refuses to open.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: Invalid arguments to `start`/`set_interval` or a settings file that
//!   parses but is logically wrong (empty camera set, interval out of bounds). Rejected
//!   synchronously; scheduler state is left unchanged.
//! - **`ConfigLoad`**: Wraps errors from `figment` while reading TOML files or environment
//!   overrides.
//! - **`HardwareUnavailable`**: An open or capture failure for one camera during a tick.
//!   Isolated to that camera and counted toward quarantine.
//! - **`CameraBusy`**: The system-wide camera slot could not be acquired in time.
//! - **`TimerFault`**: The cadence source itself failed. Fatal to the current run.
//! - **`SchedulerRunning`**: Live preview was requested while the rotation owns the cameras.
//! - **`SchedulerUnavailable`**: The scheduler task is gone (shut down or panicked).

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Invalid configuration or command arguments.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration file or environment could not be parsed.
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] figment::Error),

    /// A single camera failed to open or capture.
    #[error("Camera '{camera}' unavailable: {message}")]
    HardwareUnavailable {
        /// Camera that failed.
        camera: String,
        /// Driver-provided failure description.
        message: String,
    },

    /// Exclusive camera access could not be obtained before the timeout.
    #[error("Camera slot held by '{owner}', gave up after {waited:?}")]
    CameraBusy {
        /// Component that requested the slot.
        owner: String,
        /// How long the request waited.
        waited: Duration,
    },

    /// The tick source driving the scheduler failed.
    #[error("Timer fault: {0}")]
    TimerFault(String),

    /// Live preview rejected because periodic rotation is active.
    #[error("Periodic capture is running; stop it before starting live preview")]
    SchedulerRunning,

    /// The scheduler task is no longer accepting commands.
    #[error("Capture scheduler is not running")]
    SchedulerUnavailable,
}

impl DaqError {
    /// Build a `HardwareUnavailable` error for `camera`.
    pub fn hardware(camera: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HardwareUnavailable {
            camera: camera.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a per-camera failure that counts toward quarantine.
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            DaqError::HardwareUnavailable { .. } | DaqError::CameraBusy { .. }
        )
    }
}
