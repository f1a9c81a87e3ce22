//! Shared fixtures for capture_daq integration tests.

#![allow(dead_code)] // Not every test binary uses every helper

use capture_daq::camera::{CameraId, MockCameraBank};
use capture_daq::config::Settings;
use capture_daq::display::RecordingSurface;
use capture_daq::reporting::MemoryReporter;
use capture_daq::scheduler::Cadence;
use capture_daq::CaptureSystem;
use std::sync::Arc;
use std::time::Duration;

/// A running system wired to simulated cameras and recording sinks.
pub struct Harness {
    pub system: CaptureSystem,
    pub bank: MockCameraBank,
    pub surface: Arc<RecordingSurface>,
    pub reporter: Arc<MemoryReporter>,
}

/// Settings with short timeouts suited to paused-clock tests.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.scheduler.acquire_timeout = Duration::from_millis(500);
    settings.scheduler.capture_timeout = Duration::from_secs(1);
    settings.scheduler.handoff_settle = Duration::from_millis(200);
    settings.preview.frame_period = Duration::from_millis(50);
    settings
}

pub fn harness(bank: MockCameraBank) -> Harness {
    build(bank, test_settings(), None)
}

pub fn harness_with_cadence(bank: MockCameraBank, cadence: Arc<dyn Cadence>) -> Harness {
    build(bank, test_settings(), Some(cadence))
}

pub fn build(
    bank: MockCameraBank,
    settings: Settings,
    cadence: Option<Arc<dyn Cadence>>,
) -> Harness {
    let surface = Arc::new(RecordingSurface::new());
    let reporter = Arc::new(MemoryReporter::new());
    let mut builder =
        CaptureSystem::builder(settings, bank.clone(), surface.clone(), reporter.clone());
    if let Some(cadence) = cadence {
        builder = builder.cadence(cadence);
    }
    Harness {
        system: builder.build(),
        bank,
        surface,
        reporter,
    }
}

pub fn ids(names: &[&str]) -> Vec<CameraId> {
    names.iter().map(|n| CameraId::from(*n)).collect()
}

/// Advance the paused clock.
pub async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
