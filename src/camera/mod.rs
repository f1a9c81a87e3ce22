//! Camera hardware boundary.
//!
//! The scheduler never talks to a vendor SDK directly. It sees three
//! capability traits:
//!
//! - [`CameraRegistry`]: enumerates the cameras present on the system
//! - [`CameraDriver`]: opens a handle to one camera
//! - [`CameraHandle`]: captures frames from an open camera and closes it
//!
//! Every call may fail; failures surface as [`DaqError::HardwareUnavailable`].
//! Exclusive, scoped use of handles is enforced by [`access::CameraAccess`].

pub mod access;
pub mod mock;

use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use access::{AcquisitionMode, CameraAccess, ExclusiveCamera};
pub use mock::MockCameraBank;

/// Opaque identifier of a physical camera.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CameraId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single 16-bit monochrome frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Camera that produced the frame
    pub camera: CameraId,
    /// Per-camera frame counter
    pub frame_number: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major pixel data, `width * height` entries
    pub pixels: Vec<u16>,
    /// Capture time
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Mean pixel value, 0.0 for an empty frame.
    pub fn mean_intensity(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.pixels.iter().map(|&v| u64::from(v)).sum();
        sum as f64 / self.pixels.len() as f64
    }
}

/// Hardware enumeration.
#[async_trait]
pub trait CameraRegistry: Send + Sync {
    /// Identifiers of all cameras currently attached.
    async fn list(&self) -> AppResult<Vec<CameraId>>;
}

/// Opens camera handles.
#[async_trait]
pub trait CameraDriver: Send + Sync {
    /// Open the camera `id`. The caller owns the returned handle and must
    /// close it.
    async fn open(&self, id: &CameraId) -> AppResult<Box<dyn CameraHandle>>;
}

/// An open camera.
#[async_trait]
pub trait CameraHandle: Send {
    /// Camera this handle belongs to.
    fn id(&self) -> &CameraId;

    /// Acquire one frame.
    async fn capture(&mut self) -> AppResult<Frame>;

    /// Release the device. Synchronous so it can run from `Drop`.
    fn close(&mut self) -> AppResult<()>;
}

/// Parse a comma-separated camera list, ignoring blanks.
pub fn parse_camera_list(list: &str) -> AppResult<Vec<CameraId>> {
    let ids: Vec<CameraId> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(CameraId::from)
        .collect();
    if ids.is_empty() {
        return Err(DaqError::Configuration(format!(
            "no camera ids in '{list}'"
        )));
    }
    Ok(ids)
}
