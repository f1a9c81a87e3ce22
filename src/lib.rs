//! Core library for the capture_daq application.
//!
//! Periodically captures frames from a set of cameras in round-robin order,
//! one open camera handle at a time, and shows each camera's latest frame on
//! its own display surface. Cameras that keep failing are quarantined for the
//! rest of the run. A live preview of a single camera can run whenever
//! periodic capture is idle.
//!
//! The pieces:
//!
//! - [`camera`]: camera traits, exclusive hardware access, simulated cameras
//! - [`scheduler`]: the capture scheduler actor and its handle
//! - [`preview`]: single-camera live preview
//! - [`display`]: per-camera display surfaces
//! - [`reporting`]: error reporting sink
//! - [`config`]: layered settings
//! - [`app`]: wiring everything together

pub mod app;
pub mod camera;
pub mod config;
pub mod display;
pub mod error;
pub mod messages;
pub mod preview;
pub mod reporting;
pub mod scheduler;

pub use app::CaptureSystem;
pub use error::{AppResult, DaqError};
