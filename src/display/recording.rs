//! In-memory surface that records every call, for tests and embedding UIs
//! that poll instead of receiving callbacks.

use super::{DisplayState, DisplaySurface};
use crate::camera::{CameraId, Frame};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// One call made on a [`RecordingSurface`].
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceEvent {
    /// Surface created
    Created(CameraId),
    /// Frame shown
    Updated {
        /// Camera
        camera: CameraId,
        /// Frame number shown
        frame_number: u64,
    },
    /// Error annotation
    Error {
        /// Camera
        camera: CameraId,
        /// Error count after the failure
        count: u32,
    },
    /// Quarantine annotation
    Disabled(CameraId),
    /// Surface destroyed
    Destroyed(CameraId),
}

/// Records surface calls and tracks the current title of each live surface.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
    titles: Mutex<BTreeMap<CameraId, String>>,
}

impl RecordingSurface {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far.
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().clone()
    }

    /// Surfaces created and not yet destroyed.
    pub fn live_surfaces(&self) -> usize {
        self.titles.lock().len()
    }

    /// Current title of `camera`'s surface.
    pub fn title(&self, camera: &CameraId) -> Option<String> {
        self.titles.lock().get(camera).cloned()
    }

    /// Frames shown for `camera`.
    pub fn frames_shown(&self, camera: &CameraId) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::Updated { camera: c, .. } if c == camera))
            .count()
    }

    fn record(&self, event: SurfaceEvent) {
        self.events.lock().push(event);
    }

    fn retitle(&self, state: &DisplayState) {
        self.titles.lock().insert(state.camera.clone(), state.title());
    }
}

impl DisplaySurface for RecordingSurface {
    fn create(&self, state: &DisplayState) {
        self.retitle(state);
        self.record(SurfaceEvent::Created(state.camera.clone()));
    }

    fn update(&self, state: &DisplayState, frame: &Frame) {
        self.retitle(state);
        self.record(SurfaceEvent::Updated {
            camera: state.camera.clone(),
            frame_number: frame.frame_number,
        });
    }

    fn mark_error(&self, state: &DisplayState) {
        self.retitle(state);
        self.record(SurfaceEvent::Error {
            camera: state.camera.clone(),
            count: state.error_count,
        });
    }

    fn mark_disabled(&self, state: &DisplayState) {
        self.retitle(state);
        self.record(SurfaceEvent::Disabled(state.camera.clone()));
    }

    fn destroy(&self, camera: &CameraId) {
        self.titles.lock().remove(camera);
        self.record(SurfaceEvent::Destroyed(camera.clone()));
    }
}
