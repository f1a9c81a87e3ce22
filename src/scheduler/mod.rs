//! Periodic multi-camera capture scheduler
//!
//! The scheduler is an actor: a single tokio task owns the rotation, the
//! failure counts, the display board and the tick source. The UI talks to it
//! only through [`SchedulerHandle`], which sends [`SchedulerCommand`]s and
//! awaits the replies. Because the command queue and the timer are polled in
//! the same `select!` loop, commands and ticks are strictly serialized and
//! two ticks can never overlap.
//!
//! # Tick
//!
//! ```text
//! rotation[index] --capture_frame--> ok   -> display.update, errors = 0, index += 1
//!                                    err  -> report, errors += 1
//!                                            <= threshold: display.mark_error, index += 1
//!                                            >  threshold: quarantine (remove, disable)
//! ```
//!
//! The camera handle is acquired and released inside `capture_frame`, so it
//! is always closed by the time a tick returns.

pub mod cadence;
pub mod error_tracker;
pub mod rotation;

use crate::camera::access::SCHEDULER_OWNER;
use crate::camera::{CameraAccess, CameraId};
use crate::config::SchedulerConfig;
use crate::display::{DisplayBoard, DisplayState, DisplaySurface};
use crate::error::{AppResult, DaqError};
use crate::messages::SchedulerCommand;
use crate::preview::LivePreviewManager;
use crate::reporting::ErrorReporter;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use cadence::{Cadence, IntervalCadence, TickSource};
pub use error_tracker::{ErrorTracker, FailureVerdict};
pub use rotation::Rotation;

const COMPONENT: &str = "CaptureScheduler";
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Scheduler lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    /// Not capturing
    Idle,
    /// Ticking through the rotation
    Running,
}

/// Aggregate status published after every tick and command.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SchedulerStatus {
    /// Lifecycle state
    pub state: SchedulerState,
    /// Identifier of the current run
    pub run_id: Option<Uuid>,
    /// Cameras in the rotation below the failure threshold
    pub active_count: usize,
    /// Cameras in the rotation
    pub total_count: usize,
    /// Camera the next tick will capture
    pub next_camera: Option<CameraId>,
    /// Configured tick interval
    pub interval_secs: f64,
    /// Ticks executed in the current run
    pub ticks: u64,
    /// Why the last run ended abnormally
    pub last_fault: Option<String>,
}

impl SchedulerStatus {
    fn idle(interval_secs: f64) -> Self {
        Self {
            state: SchedulerState::Idle,
            run_id: None,
            active_count: 0,
            total_count: 0,
            next_camera: None,
            interval_secs,
            ticks: 0,
            last_fault: None,
        }
    }
}

impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            SchedulerState::Idle => write!(f, "Idle")?,
            SchedulerState::Running => write!(
                f,
                "Running: {}/{} cameras active, next {}",
                self.active_count,
                self.total_count,
                self.next_camera
                    .as_ref()
                    .map_or("-", CameraId::as_str)
            )?,
        }
        if let Some(fault) = &self.last_fault {
            write!(f, " (last fault: {fault})")?;
        }
        Ok(())
    }
}

/// Detailed view of the scheduler's per-camera state.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RotationSnapshot {
    /// Cameras still in the rotation, in capture order
    pub rotation: Vec<CameraId>,
    /// Index of the next capture within `rotation`
    pub index: usize,
    /// Consecutive failure counts, in the order cameras were started,
    /// including quarantined cameras
    pub error_counts: Vec<(CameraId, u32)>,
    /// Display states in the order cameras were started
    pub displays: Vec<DisplayState>,
}

/// The scheduler actor. Construct, then [`spawn`](CaptureScheduler::spawn).
pub struct CaptureScheduler {
    config: SchedulerConfig,
    access: CameraAccess,
    preview: LivePreviewManager,
    display: DisplayBoard,
    reporter: Arc<dyn ErrorReporter>,
    cadence: Arc<dyn Cadence>,
    state: SchedulerState,
    run_id: Option<Uuid>,
    started_with: Vec<CameraId>,
    rotation: Rotation,
    errors: ErrorTracker,
    interval_secs: f64,
    ticker: Option<Box<dyn TickSource>>,
    ticks: u64,
    last_fault: Option<String>,
    status_tx: watch::Sender<SchedulerStatus>,
}

impl CaptureScheduler {
    /// Creates a new, idle scheduler.
    pub fn new(
        config: SchedulerConfig,
        access: CameraAccess,
        preview: LivePreviewManager,
        surface: Arc<dyn DisplaySurface>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let interval_secs = config.default_interval_secs;
        let (status_tx, _) = watch::channel(SchedulerStatus::idle(interval_secs));
        let errors = ErrorTracker::new(config.max_consecutive_failures);

        Self {
            config,
            access,
            preview,
            display: DisplayBoard::new(surface),
            reporter,
            cadence: Arc::new(IntervalCadence),
            state: SchedulerState::Idle,
            run_id: None,
            started_with: Vec::new(),
            rotation: Rotation::default(),
            errors,
            interval_secs,
            ticker: None,
            ticks: 0,
            last_fault: None,
            status_tx,
        }
    }

    /// Replace the tick source factory.
    pub fn with_cadence(mut self, cadence: Arc<dyn Cadence>) -> Self {
        self.cadence = cadence;
        self
    }

    /// Start the actor task and return a handle to it.
    pub fn spawn(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = SchedulerHandle {
            command_tx,
            status_rx: self.status_tx.subscribe(),
        };
        let task = tokio::spawn(self.run(command_rx));
        (handle, task)
    }

    /// Runs the actor event loop until shutdown or until every handle is dropped.
    async fn run(mut self, mut command_rx: mpsc::Receiver<SchedulerCommand>) {
        info!("CaptureScheduler started");

        loop {
            tokio::select! {
                biased;

                command = command_rx.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle_command(command).await {
                        break;
                    }
                }

                tick = next_tick(&mut self.ticker), if self.ticker.is_some() => {
                    match tick {
                        Ok(()) => self.tick().await,
                        Err(e) => self.timer_fault(&e),
                    }
                }
            }
        }

        self.stop();
        info!("CaptureScheduler shutting down");
    }

    /// Returns false when the actor should exit.
    async fn handle_command(&mut self, command: SchedulerCommand) -> bool {
        match command {
            SchedulerCommand::Start {
                cameras,
                interval_secs,
                response,
            } => {
                let result = self.start(cameras, interval_secs).await;
                let _ = response.send(result);
            }

            SchedulerCommand::Stop { response } => {
                self.stop();
                let _ = response.send(());
            }

            SchedulerCommand::SetInterval { seconds, response } => {
                let result = self.set_interval(seconds);
                let _ = response.send(result);
            }

            SchedulerCommand::GetStatus { response } => {
                let _ = response.send(self.status());
            }

            SchedulerCommand::GetSnapshot { response } => {
                let _ = response.send(self.snapshot());
            }

            SchedulerCommand::Shutdown { response } => {
                info!("Shutdown command received");
                self.stop();
                let _ = response.send(());
                return false;
            }
        }
        true
    }

    async fn start(&mut self, cameras: Vec<CameraId>, interval_secs: f64) -> AppResult<()> {
        let period = self.config.check_interval(interval_secs)?;
        let rotation = Rotation::new(cameras)?;

        if self.state == SchedulerState::Running {
            if rotation.same_members(&self.started_with) {
                if interval_secs != self.interval_secs {
                    return self.set_interval(interval_secs);
                }
                debug!("start with unchanged camera set ignored");
                return Ok(());
            }
            info!("camera set changed; restarting periodic capture");
            self.stop();
        }

        if let Some(camera) = self.access.claim_rotation() {
            debug!(camera = %camera, "preview mode active at start");
        }
        if self.preview.stop().await {
            info!(
                settle = ?self.config.handoff_settle,
                "live preview released its camera; letting hardware settle"
            );
            tokio::time::sleep(self.config.handoff_settle).await;
        }

        let ticker = match self.cadence.ticks(period, Duration::ZERO) {
            Ok(ticker) => ticker,
            Err(e) => {
                self.access.release_rotation();
                self.reporter
                    .log_exception(COMPONENT, &e, "could not start tick source");
                self.last_fault = Some(e.to_string());
                self.publish();
                return Err(e);
            }
        };

        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.started_with = rotation.cameras().to_vec();
        self.rotation = rotation;
        self.errors.clear();
        self.display.open(&self.started_with);
        self.interval_secs = interval_secs;
        self.ticker = Some(ticker);
        self.ticks = 0;
        self.last_fault = None;
        self.state = SchedulerState::Running;

        info!(
            %run_id,
            cameras = self.rotation.len(),
            interval_secs,
            "periodic capture started"
        );
        self.publish();
        Ok(())
    }

    fn stop(&mut self) {
        if self.state == SchedulerState::Idle {
            return;
        }

        self.ticker = None;
        self.display.teardown();
        self.rotation.clear();
        self.errors.clear();
        self.started_with.clear();
        self.state = SchedulerState::Idle;
        self.access.release_rotation();

        if let Some(run_id) = self.run_id.take() {
            info!(%run_id, ticks = self.ticks, "periodic capture stopped");
        }
        self.publish();
    }

    fn set_interval(&mut self, seconds: f64) -> AppResult<()> {
        let period = self.config.check_interval(seconds)?;
        self.interval_secs = seconds;

        if self.state == SchedulerState::Running {
            self.ticker = None;
            match self.cadence.ticks(period, period) {
                Ok(ticker) => self.ticker = Some(ticker),
                Err(e) => {
                    self.timer_fault(&e);
                    return Err(e);
                }
            }
            info!(interval_secs = seconds, "tick interval changed");
        }

        self.publish();
        Ok(())
    }

    async fn tick(&mut self) {
        let Some(camera) = self.rotation.current().cloned() else {
            debug!("rotation is empty; stopping");
            self.stop();
            return;
        };
        self.ticks += 1;

        let result = self
            .access
            .capture_frame(SCHEDULER_OWNER, &camera, self.config.capture_timeout)
            .await;

        match result {
            Ok(frame) => {
                self.errors.record_success(&camera);
                self.display.update(&frame);
                self.rotation.advance();
            }
            Err(err) => {
                self.reporter.log_exception(
                    COMPONENT,
                    &err,
                    &format!("capture failed for camera {camera}"),
                );
                match self.errors.record_failure(&camera) {
                    FailureVerdict::Tolerated(count) => {
                        debug!(camera = %camera, count, "failure tolerated");
                        self.display.mark_error(&camera);
                        self.rotation.advance();
                    }
                    FailureVerdict::Quarantine(count) => self.quarantine(&camera, count),
                }
            }
        }

        self.publish();
    }

    /// Remove `camera` for the rest of the run. The cursor already addresses
    /// its successor afterwards, so no advance follows.
    fn quarantine(&mut self, camera: &CameraId, failures: u32) {
        self.rotation.remove(camera);
        self.display.mark_disabled(camera);
        warn!(
            camera = %camera,
            failures,
            remaining = self.rotation.len(),
            "camera quarantined"
        );

        if self.rotation.is_empty() {
            warn!("every camera quarantined; stopping periodic capture");
            self.stop();
        }
    }

    fn timer_fault(&mut self, err: &DaqError) {
        self.reporter
            .log_exception(COMPONENT, err, "tick source failed; stopping periodic capture");
        self.last_fault = Some(err.to_string());
        self.stop();
        // stop() is a no-op when already idle; make sure the fault is visible.
        self.publish();
    }

    fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state,
            run_id: self.run_id,
            active_count: self
                .rotation
                .cameras()
                .iter()
                .filter(|c| self.errors.is_healthy(c))
                .count(),
            total_count: self.rotation.len(),
            next_camera: self.rotation.current().cloned(),
            interval_secs: self.interval_secs,
            ticks: self.ticks,
            last_fault: self.last_fault.clone(),
        }
    }

    fn snapshot(&self) -> RotationSnapshot {
        RotationSnapshot {
            rotation: self.rotation.cameras().to_vec(),
            index: self.rotation.index(),
            error_counts: self
                .started_with
                .iter()
                .filter(|c| self.errors.has_entry(c))
                .map(|c| (c.clone(), self.errors.count(c)))
                .collect(),
            displays: self.display.snapshot(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

async fn next_tick(ticker: &mut Option<Box<dyn TickSource>>) -> AppResult<()> {
    match ticker {
        Some(ticker) => ticker.next_tick().await,
        None => std::future::pending().await,
    }
}

/// Cloneable command/query facade over the scheduler task.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    status_rx: watch::Receiver<SchedulerStatus>,
}

impl SchedulerHandle {
    async fn request<T>(
        &self,
        (command, reply): (SchedulerCommand, tokio::sync::oneshot::Receiver<T>),
    ) -> AppResult<T> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| DaqError::SchedulerUnavailable)?;
        reply.await.map_err(|_| DaqError::SchedulerUnavailable)
    }

    /// Begin periodic capture over `cameras` every `interval_secs` seconds.
    ///
    /// # Errors
    /// `Configuration` for an empty or duplicated camera list or an interval
    /// outside the configured bounds; the scheduler is left unchanged.
    pub async fn start(&self, cameras: Vec<CameraId>, interval_secs: f64) -> AppResult<()> {
        self.request(SchedulerCommand::start(cameras, interval_secs)).await?
    }

    /// Halt periodic capture. Always succeeds; any camera handle is closed
    /// before this returns.
    pub async fn stop(&self) {
        if self.request(SchedulerCommand::stop()).await.is_err() {
            debug!("stop requested but scheduler task is gone");
        }
    }

    /// Change the cadence without disturbing the rotation.
    pub async fn set_interval(&self, seconds: f64) -> AppResult<()> {
        self.request(SchedulerCommand::set_interval(seconds)).await?
    }

    /// Current status. Falls back to the last published status if the task
    /// has exited.
    pub async fn status(&self) -> SchedulerStatus {
        match self.request(SchedulerCommand::get_status()).await {
            Ok(status) => status,
            Err(_) => self.status_rx.borrow().clone(),
        }
    }

    /// Rotation order, cursor, failure counts and display states.
    pub async fn snapshot(&self) -> AppResult<RotationSnapshot> {
        self.request(SchedulerCommand::get_snapshot()).await
    }

    /// Lifecycle state.
    pub async fn state(&self) -> SchedulerState {
        self.status().await.state
    }

    /// Receiver updated after every tick and command.
    pub fn subscribe_status(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_rx.clone()
    }

    /// Stop capturing and end the scheduler task.
    pub async fn shutdown(&self) {
        if self.request(SchedulerCommand::shutdown()).await.is_err() {
            debug!("scheduler task already gone");
        }
    }
}
