//! Live preview
//!
//! Streams frames from a single camera that stays open for the whole session.
//! The preview is the other contender for the exclusive camera slot: it is
//! refused while periodic capture runs, and the scheduler stops it (and waits
//! for the handle to close) before its first tick.

use crate::camera::access::PREVIEW_OWNER;
use crate::camera::{CameraAccess, CameraId, ExclusiveCamera};
use crate::display::{DisplayBoard, DisplaySurface};
use crate::error::AppResult;
use crate::reporting::ErrorReporter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const COMPONENT: &str = "LivePreview";

struct PreviewSession {
    camera: CameraId,
    cancel_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Starts and stops the single live preview stream.
#[derive(Clone)]
pub struct LivePreviewManager {
    access: CameraAccess,
    surface: Arc<dyn DisplaySurface>,
    reporter: Arc<dyn ErrorReporter>,
    frame_period: Duration,
    session: Arc<Mutex<Option<PreviewSession>>>,
}

impl LivePreviewManager {
    /// New manager with no active stream.
    pub fn new(
        access: CameraAccess,
        surface: Arc<dyn DisplaySurface>,
        reporter: Arc<dyn ErrorReporter>,
        frame_period: Duration,
    ) -> Self {
        Self {
            access,
            surface,
            reporter,
            frame_period,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Stream `camera`, replacing any other preview.
    ///
    /// # Errors
    /// - `SchedulerRunning` while periodic capture owns the cameras
    /// - `CameraBusy` or a hardware error if the camera cannot be opened
    pub async fn start(&self, camera: CameraId) -> AppResult<()> {
        let mut session = self.session.lock().await;

        if let Some(current) = session.as_ref() {
            if current.camera == camera && !current.task.is_finished() {
                return Ok(());
            }
        }
        if let Some(old) = session.take() {
            end_session(old).await;
        }

        self.access.claim_preview(&camera)?;
        let opened = match self.access.open_exclusive(PREVIEW_OWNER, &camera).await {
            Ok(opened) => opened,
            Err(e) => {
                self.access.release_preview();
                return Err(e);
            }
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(stream(
            opened,
            DisplayBoard::new(Arc::clone(&self.surface)),
            Arc::clone(&self.reporter),
            self.frame_period,
            cancel_rx,
        ));
        info!(camera = %camera, "live preview started");

        *session = Some(PreviewSession {
            camera,
            cancel_tx,
            task,
        });
        Ok(())
    }

    /// Stop the stream and wait until its camera is closed. Returns whether a
    /// stream was running.
    pub async fn stop(&self) -> bool {
        let Some(old) = self.session.lock().await.take() else {
            return false;
        };
        let camera = old.camera.clone();
        end_session(old).await;
        self.access.release_preview();
        info!(camera = %camera, "live preview stopped");
        true
    }

    /// Whether a stream is running.
    pub async fn is_active(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Camera being streamed.
    pub async fn camera(&self) -> Option<CameraId> {
        self.session.lock().await.as_ref().map(|s| s.camera.clone())
    }
}

async fn end_session(session: PreviewSession) {
    let _ = session.cancel_tx.send(());
    if let Err(e) = session.task.await {
        warn!(camera = %session.camera, error = %e, "preview task ended abnormally");
    }
}

async fn stream(
    mut camera: ExclusiveCamera,
    mut board: DisplayBoard,
    reporter: Arc<dyn ErrorReporter>,
    frame_period: Duration,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    board.open(std::slice::from_ref(camera.id()));
    let mut ticks = interval(frame_period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut cancel_rx => break,

            _ = ticks.tick() => match camera.capture().await {
                Ok(frame) => board.update(&frame),
                Err(e) => {
                    reporter.log_exception(COMPONENT, &e, "preview frame failed");
                    board.mark_error(camera.id());
                }
            },
        }
    }

    board.teardown();
    let id = camera.id().clone();
    if let Err(e) = camera.close() {
        warn!(camera = %id, error = %e, "preview camera close failed");
    }
    debug!(camera = %id, "preview stream finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::{MockCameraBank, MockCameraSpec};
    use crate::display::RecordingSurface;
    use crate::error::DaqError;
    use crate::reporting::MemoryReporter;

    fn manager(bank: &MockCameraBank) -> (LivePreviewManager, CameraAccess, Arc<RecordingSurface>) {
        let access = CameraAccess::new(Arc::new(bank.clone()), Duration::from_millis(100));
        let surface = Arc::new(RecordingSurface::new());
        let preview = LivePreviewManager::new(
            access.clone(),
            surface.clone(),
            Arc::new(MemoryReporter::new()),
            Duration::from_millis(10),
        );
        (preview, access, surface)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_holds_camera_until_stopped() {
        let bank = MockCameraBank::with_cameras(["a", "b"]);
        let (preview, access, surface) = manager(&bank);

        preview.start("a".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(preview.is_active().await);
        assert_eq!(bank.open_count(), 1);
        assert!(!access.is_available());
        assert!(surface.frames_shown(&"a".into()) >= 5);

        assert!(preview.stop().await);
        assert_eq!(bank.open_count(), 0);
        assert!(access.is_available());
        assert_eq!(surface.live_surfaces(), 0);
        assert!(!preview.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_camera_closes_previous() {
        let bank = MockCameraBank::with_cameras(["a", "b"]);
        let (preview, _access, _surface) = manager(&bank);

        preview.start("a".into()).await.unwrap();
        preview.start("b".into()).await.unwrap();
        assert_eq!(preview.camera().await, Some("b".into()));
        assert_eq!(bank.max_concurrent_open(), 1);
        preview.stop().await;
    }

    #[tokio::test]
    async fn test_refused_while_rotation_active() {
        let bank = MockCameraBank::with_cameras(["a"]);
        let (preview, access, _surface) = manager(&bank);

        access.claim_rotation();
        let err = preview.start("a".into()).await.unwrap_err();
        assert!(matches!(err, DaqError::SchedulerRunning));
        assert_eq!(bank.total_opens(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_idle() {
        let bank = MockCameraBank::new();
        bank.add_camera(MockCameraSpec::new("dead").fail_open());
        let (preview, access, _surface) = manager(&bank);

        assert!(preview.start("dead".into()).await.is_err());
        assert!(!preview.is_active().await);
        assert_eq!(access.mode(), crate::camera::AcquisitionMode::Idle);
    }
}
