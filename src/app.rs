//! Application assembly.
//!
//! Wires one camera driver, one display surface and one error reporter into
//! the shared [`CameraAccess`], the [`LivePreviewManager`] and the scheduler
//! task. The UI layer holds a [`CaptureSystem`] and nothing else.

use crate::camera::{CameraAccess, CameraDriver, CameraId, CameraRegistry};
use crate::config::Settings;
use crate::display::DisplaySurface;
use crate::error::AppResult;
use crate::preview::LivePreviewManager;
use crate::reporting::ErrorReporter;
use crate::scheduler::{Cadence, CaptureScheduler, SchedulerHandle};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Builder for [`CaptureSystem`].
pub struct CaptureSystemBuilder {
    settings: Settings,
    registry: Arc<dyn CameraRegistry>,
    driver: Arc<dyn CameraDriver>,
    surface: Arc<dyn DisplaySurface>,
    reporter: Arc<dyn ErrorReporter>,
    cadence: Option<Arc<dyn Cadence>>,
}

impl CaptureSystemBuilder {
    /// Use `cadence` instead of the tokio interval timer.
    pub fn cadence(mut self, cadence: Arc<dyn Cadence>) -> Self {
        self.cadence = Some(cadence);
        self
    }

    /// Spawn the scheduler task. Must be called inside a tokio runtime.
    pub fn build(self) -> CaptureSystem {
        let access = CameraAccess::new(self.driver, self.settings.scheduler.acquire_timeout);
        let preview = LivePreviewManager::new(
            access.clone(),
            Arc::clone(&self.surface),
            Arc::clone(&self.reporter),
            self.settings.preview.frame_period,
        );

        let mut scheduler = CaptureScheduler::new(
            self.settings.scheduler.clone(),
            access.clone(),
            preview.clone(),
            self.surface,
            self.reporter,
        );
        if let Some(cadence) = self.cadence {
            scheduler = scheduler.with_cadence(cadence);
        }
        let (scheduler, task) = scheduler.spawn();
        info!(app = %self.settings.application.name, "capture system ready");

        CaptureSystem {
            settings: self.settings,
            registry: self.registry,
            access,
            preview,
            scheduler,
            task,
        }
    }
}

/// Running capture system.
pub struct CaptureSystem {
    settings: Settings,
    registry: Arc<dyn CameraRegistry>,
    access: CameraAccess,
    preview: LivePreviewManager,
    scheduler: SchedulerHandle,
    task: JoinHandle<()>,
}

impl CaptureSystem {
    /// Start assembling a system. `cameras` serves as both registry and driver.
    pub fn builder<C>(
        settings: Settings,
        cameras: C,
        surface: Arc<dyn DisplaySurface>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> CaptureSystemBuilder
    where
        C: CameraRegistry + CameraDriver + 'static,
    {
        let cameras = Arc::new(cameras);
        CaptureSystemBuilder {
            settings,
            registry: cameras.clone(),
            driver: cameras,
            surface,
            reporter,
            cadence: None,
        }
    }

    /// Cameras the driver can see.
    pub async fn available_cameras(&self) -> AppResult<Vec<CameraId>> {
        self.registry.list().await
    }

    /// Start periodic capture over every available camera at the default interval.
    pub async fn start_all(&self) -> AppResult<()> {
        let cameras = self.available_cameras().await?;
        self.scheduler
            .start(cameras, self.settings.scheduler.default_interval_secs)
            .await
    }

    /// Scheduler facade.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Live preview facade.
    pub fn preview(&self) -> &LivePreviewManager {
        &self.preview
    }

    /// Shared camera gatekeeper.
    pub fn access(&self) -> &CameraAccess {
        &self.access
    }

    /// Loaded settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stop preview and capture, then wait for the scheduler task to exit.
    pub async fn shutdown(self) {
        self.preview.stop().await;
        self.scheduler.shutdown().await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "scheduler task ended abnormally");
        }
        info!("capture system shut down");
    }
}
