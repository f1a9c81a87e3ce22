//! Mock Camera Bank
//!
//! Simulated cameras for testing and demos without physical hardware.
//! All delays use `tokio::time::sleep`, never `std::thread::sleep`.
//!
//! Each camera can be scripted to misbehave:
//!
//! - refuse to open
//! - fail every capture from a given attempt on
//! - fail the next N captures (then recover)
//! - fail randomly at a given rate
//! - take a fixed readout time per capture
//!
//! The bank also records what happened: the order of capture attempts, how
//! many handles are open right now and the most that were ever open at once.
//! The last one is how tests prove the single-open-handle invariant.

use super::{CameraDriver, CameraHandle, CameraId, CameraRegistry, Frame};
use crate::config::{MockCameraDefinition, MockConfig};
use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Behavior of one simulated camera.
#[derive(Clone, Debug)]
pub struct MockCameraSpec {
    id: CameraId,
    width: u32,
    height: u32,
    fail_open: bool,
    fail_from_attempt: Option<u64>,
    failure_rate: f64,
    capture_delay: Option<Duration>,
}

impl MockCameraSpec {
    /// A well-behaved 64x48 camera.
    pub fn new(id: impl Into<CameraId>) -> Self {
        Self {
            id: id.into(),
            width: 64,
            height: 48,
            fail_open: false,
            fail_from_attempt: None,
            failure_rate: 0.0,
            capture_delay: None,
        }
    }

    /// Set the frame size.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Every `open` fails.
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Capture attempt `n` (1-based) and every later one fails.
    pub fn fail_from_frame(mut self, n: u64) -> Self {
        self.fail_from_attempt = Some(n);
        self
    }

    /// Probability in [0, 1] that a capture fails.
    pub fn failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    /// Simulated readout time per capture.
    pub fn capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = Some(delay);
        self
    }
}

impl From<&MockCameraDefinition> for MockCameraSpec {
    fn from(def: &MockCameraDefinition) -> Self {
        Self {
            id: CameraId::new(def.id.clone()),
            width: def.width,
            height: def.height,
            fail_open: false,
            fail_from_attempt: def.fail_from_frame,
            failure_rate: def.failure_rate,
            capture_delay: def.capture_delay,
        }
    }
}

#[derive(Default)]
struct CameraCounters {
    attempts: u64,
    frames: u64,
    fail_next: u32,
}

#[derive(Default)]
struct BankState {
    cameras: Vec<MockCameraSpec>,
    counters: HashMap<CameraId, CameraCounters>,
    capture_log: Vec<CameraId>,
    open_now: usize,
    max_open: usize,
    total_opens: u64,
}

impl BankState {
    fn spec(&self, id: &CameraId) -> Option<&MockCameraSpec> {
        self.cameras.iter().find(|c| &c.id == id)
    }
}

/// Simulated camera registry and driver.
#[derive(Clone, Default)]
pub struct MockCameraBank {
    state: Arc<Mutex<BankState>>,
}

impl MockCameraBank {
    /// Empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bank of well-behaved cameras.
    pub fn with_cameras<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CameraId>,
    {
        let bank = Self::new();
        for id in ids {
            bank.add_camera(MockCameraSpec::new(id));
        }
        bank
    }

    /// Bank described by the `[mock]` settings section.
    pub fn from_config(config: &MockConfig) -> Self {
        let bank = Self::new();
        for def in &config.cameras {
            bank.add_camera(MockCameraSpec::from(def));
        }
        bank
    }

    /// Attach a camera (replacing one with the same id).
    pub fn add_camera(&self, spec: MockCameraSpec) {
        let mut state = self.state.lock();
        state.cameras.retain(|c| c.id != spec.id);
        state.counters.entry(spec.id.clone()).or_default();
        state.cameras.push(spec);
    }

    /// Make the next `n` captures of `id` fail, then behave normally again.
    pub fn fail_next(&self, id: &CameraId, n: u32) {
        self.state
            .lock()
            .counters
            .entry(id.clone())
            .or_default()
            .fail_next = n;
    }

    /// Every capture attempt so far, in order.
    pub fn capture_log(&self) -> Vec<CameraId> {
        self.state.lock().capture_log.clone()
    }

    /// Handles open right now.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_now
    }

    /// Most handles ever open at the same time.
    pub fn max_concurrent_open(&self) -> usize {
        self.state.lock().max_open
    }

    /// Number of successful `open` calls.
    pub fn total_opens(&self) -> u64 {
        self.state.lock().total_opens
    }

    fn close_handle(&self, id: &CameraId) {
        let mut state = self.state.lock();
        state.open_now = state.open_now.saturating_sub(1);
        trace!(camera = %id, open = state.open_now, "mock camera closed");
    }
}

#[async_trait]
impl CameraRegistry for MockCameraBank {
    async fn list(&self) -> AppResult<Vec<CameraId>> {
        Ok(self.state.lock().cameras.iter().map(|c| c.id.clone()).collect())
    }
}

#[async_trait]
impl CameraDriver for MockCameraBank {
    async fn open(&self, id: &CameraId) -> AppResult<Box<dyn CameraHandle>> {
        let mut state = self.state.lock();
        let spec = state
            .spec(id)
            .ok_or_else(|| DaqError::hardware(id.as_str(), "no such camera"))?;
        if spec.fail_open {
            return Err(DaqError::hardware(id.as_str(), "device refused to open"));
        }

        state.open_now += 1;
        state.max_open = state.max_open.max(state.open_now);
        state.total_opens += 1;
        trace!(camera = %id, open = state.open_now, "mock camera opened");

        Ok(Box::new(MockCameraHandle {
            id: id.clone(),
            bank: self.clone(),
            closed: false,
        }))
    }
}

/// Open handle to a simulated camera.
pub struct MockCameraHandle {
    id: CameraId,
    bank: MockCameraBank,
    closed: bool,
}

impl MockCameraHandle {
    fn synthesize(&self, spec: &MockCameraSpec, frame_number: u64) -> Frame {
        let width = spec.width as usize;
        let height = spec.height as usize;
        let mut pixels = vec![0u16; width * height];
        for y in 0..height {
            for x in 0..width {
                let value = ((x + y + frame_number as usize) % 256) as u16 * 256;
                pixels[y * width + x] = value;
            }
        }

        Frame {
            camera: self.id.clone(),
            frame_number,
            width: spec.width,
            height: spec.height,
            pixels,
            captured_at: Utc::now(),
        }
    }
}

#[async_trait]
impl CameraHandle for MockCameraHandle {
    fn id(&self) -> &CameraId {
        &self.id
    }

    async fn capture(&mut self) -> AppResult<Frame> {
        if self.closed {
            return Err(DaqError::hardware(self.id.as_str(), "handle is closed"));
        }

        let delay = self
            .bank
            .state
            .lock()
            .spec(&self.id)
            .and_then(|s| s.capture_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.bank.state.lock();
        state.capture_log.push(self.id.clone());
        let spec = state
            .spec(&self.id)
            .cloned()
            .ok_or_else(|| DaqError::hardware(self.id.as_str(), "camera detached"))?;
        let counters = state.counters.entry(self.id.clone()).or_default();
        counters.attempts += 1;

        let scripted = counters.fail_next > 0;
        if scripted {
            counters.fail_next -= 1;
        }
        let past_limit = spec
            .fail_from_attempt
            .is_some_and(|n| counters.attempts >= n);
        let random = spec.failure_rate > 0.0 && rand::random::<f64>() < spec.failure_rate;
        if scripted || past_limit || random {
            return Err(DaqError::hardware(
                self.id.as_str(),
                format!("readout failed on attempt {}", counters.attempts),
            ));
        }

        counters.frames += 1;
        let frame_number = counters.frames;
        drop(state);
        Ok(self.synthesize(&spec, frame_number))
    }

    fn close(&mut self) -> AppResult<()> {
        if !self.closed {
            self.closed = true;
            self.bank.close_handle(&self.id);
        }
        Ok(())
    }
}

impl Drop for MockCameraHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
