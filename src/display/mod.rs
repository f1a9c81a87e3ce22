//! Per-camera display surfaces.
//!
//! A [`DisplaySurface`] is whatever renders frames (a GUI window, a log line,
//! a test recorder). The [`DisplayBoard`] sits between the scheduler and the
//! surface: it keeps one [`DisplayState`] per camera of the current run, in
//! rotation order, and forwards every change to the surface.

pub mod recording;

use crate::camera::{CameraId, Frame};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use recording::{RecordingSurface, SurfaceEvent};

/// Rendering surface for camera frames.
///
/// Calls are fire-and-forget; implementations must not block for long since
/// they run inside scheduler ticks.
pub trait DisplaySurface: Send + Sync {
    /// Create the surface for `state.camera` showing a placeholder.
    fn create(&self, state: &DisplayState);
    /// Replace the displayed image.
    fn update(&self, state: &DisplayState, frame: &Frame);
    /// Annotate the surface with the current error count.
    fn mark_error(&self, state: &DisplayState);
    /// Mark the surface as quarantined for the rest of the run.
    fn mark_disabled(&self, state: &DisplayState);
    /// Release the surface.
    fn destroy(&self, camera: &CameraId);
}

/// Display bookkeeping for one camera.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayState {
    /// Camera shown on this surface
    pub camera: CameraId,
    /// Time of the last displayed frame
    pub last_update: Option<DateTime<Utc>>,
    /// Whether at least one frame has been shown
    pub active: bool,
    /// Failures since the last displayed frame
    pub error_count: u32,
    /// Quarantined
    pub disabled: bool,
}

impl DisplayState {
    pub(crate) fn new(camera: CameraId) -> Self {
        Self {
            camera,
            last_update: None,
            active: false,
            error_count: 0,
            disabled: false,
        }
    }

    /// Window title with error or quarantine annotation.
    pub fn title(&self) -> String {
        if self.disabled {
            format!("{} [DISABLED]", self.camera)
        } else if self.error_count > 0 {
            format!("{} [errors: {}]", self.camera, self.error_count)
        } else {
            self.camera.to_string()
        }
    }
}

/// Ordered collection of display states for one run.
pub struct DisplayBoard {
    surface: Arc<dyn DisplaySurface>,
    order: Vec<CameraId>,
    states: HashMap<CameraId, DisplayState>,
}

impl DisplayBoard {
    /// Empty board forwarding to `surface`.
    pub fn new(surface: Arc<dyn DisplaySurface>) -> Self {
        Self {
            surface,
            order: Vec::new(),
            states: HashMap::new(),
        }
    }

    /// Create one surface per camera, in the given order.
    pub fn open(&mut self, cameras: &[CameraId]) {
        self.teardown();
        for camera in cameras {
            let state = DisplayState::new(camera.clone());
            self.surface.create(&state);
            self.order.push(camera.clone());
            self.states.insert(camera.clone(), state);
        }
        debug!(surfaces = self.order.len(), "display surfaces created");
    }

    /// Show `frame` on its camera's surface and clear the error annotation.
    pub fn update(&mut self, frame: &Frame) {
        let Some(state) = self.states.get_mut(&frame.camera) else {
            warn!(camera = %frame.camera, "frame for camera without a surface");
            return;
        };
        state.last_update = Some(frame.captured_at);
        state.active = true;
        state.error_count = 0;
        self.surface.update(state, frame);
    }

    /// Count a failure on `camera`'s surface.
    pub fn mark_error(&mut self, camera: &CameraId) {
        if let Some(state) = self.states.get_mut(camera) {
            state.error_count += 1;
            self.surface.mark_error(state);
        }
    }

    /// Permanently mark `camera` as quarantined.
    pub fn mark_disabled(&mut self, camera: &CameraId) {
        if let Some(state) = self.states.get_mut(camera) {
            state.disabled = true;
            state.active = false;
            self.surface.mark_disabled(state);
        }
    }

    /// Destroy every surface.
    pub fn teardown(&mut self) {
        for camera in self.order.drain(..) {
            self.surface.destroy(&camera);
        }
        self.states.clear();
    }

    /// State of one camera's surface.
    pub fn state(&self, camera: &CameraId) -> Option<&DisplayState> {
        self.states.get(camera)
    }

    /// All states in creation order.
    pub fn snapshot(&self) -> Vec<DisplayState> {
        self.order
            .iter()
            .filter_map(|id| self.states.get(id).cloned())
            .collect()
    }

    /// Number of surfaces.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// No surfaces exist.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Surface that only logs, for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSurface;

impl DisplaySurface for TracingSurface {
    fn create(&self, state: &DisplayState) {
        info!(camera = %state.camera, "surface created: {}", state.title());
    }

    fn update(&self, state: &DisplayState, frame: &Frame) {
        info!(
            camera = %state.camera,
            frame = frame.frame_number,
            width = frame.width,
            height = frame.height,
            mean = frame.mean_intensity(),
            "frame"
        );
    }

    fn mark_error(&self, state: &DisplayState) {
        warn!(camera = %state.camera, "surface annotated: {}", state.title());
    }

    fn mark_disabled(&self, state: &DisplayState) {
        warn!(camera = %state.camera, "surface annotated: {}", state.title());
    }

    fn destroy(&self, camera: &CameraId) {
        debug!(camera = %camera, "surface destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(camera: &str) -> Frame {
        Frame {
            camera: camera.into(),
            frame_number: 1,
            width: 1,
            height: 1,
            pixels: vec![7],
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_title_annotations() {
        let mut state = DisplayState::new("side".into());
        assert_eq!(state.title(), "side");
        state.error_count = 3;
        assert_eq!(state.title(), "side [errors: 3]");
        state.disabled = true;
        assert_eq!(state.title(), "side [DISABLED]");
    }

    #[test]
    fn test_board_lifecycle() {
        let surface = Arc::new(RecordingSurface::new());
        let mut board = DisplayBoard::new(surface.clone());
        board.open(&[CameraId::from("a"), CameraId::from("b")]);
        assert_eq!(board.len(), 2);
        assert!(!board.state(&"a".into()).unwrap().active);

        board.mark_error(&"a".into());
        board.mark_error(&"a".into());
        assert_eq!(board.state(&"a".into()).unwrap().error_count, 2);

        board.update(&frame("a"));
        let a = board.state(&"a".into()).unwrap();
        assert!(a.active);
        assert_eq!(a.error_count, 0);
        assert!(a.last_update.is_some());

        board.mark_disabled(&"b".into());
        assert!(board.state(&"b".into()).unwrap().disabled);

        let order: Vec<_> = board.snapshot().into_iter().map(|s| s.camera).collect();
        assert_eq!(order, vec![CameraId::from("a"), "b".into()]);

        board.teardown();
        assert!(board.is_empty());
        assert_eq!(surface.live_surfaces(), 0);
    }

    #[test]
    fn test_unknown_camera_ignored() {
        let surface = Arc::new(RecordingSurface::new());
        let mut board = DisplayBoard::new(surface.clone());
        board.open(&[CameraId::from("a")]);
        board.update(&frame("zzz"));
        board.mark_error(&"zzz".into());
        assert_eq!(surface.events().len(), 1);
    }
}
