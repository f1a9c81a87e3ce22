//! Exclusive camera access
//!
//! The camera hardware tolerates exactly one open device handle system-wide.
//! `CameraAccess` owns that single slot and hands it out through RAII guards:
//!
//! - [`CameraAccess::open_exclusive`] waits (with timeout) for the slot, opens the
//!   camera and returns an [`ExclusiveCamera`]. Dropping it closes the handle and
//!   releases the slot, so release happens on every exit path including
//!   cancellation and panic unwinding.
//! - [`CameraAccess::capture_frame`] is the scoped form used by the scheduler:
//!   acquire, capture one frame, close, release.
//!
//! It also arbitrates which component may use the cameras at all
//! ([`AcquisitionMode`]): the periodic rotation and the live preview are
//! mutually exclusive, and the rotation always wins.

use super::{CameraDriver, CameraHandle, CameraId, Frame};
use crate::error::{AppResult, DaqError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Owner tag used by the capture scheduler.
pub const SCHEDULER_OWNER: &str = "capture_scheduler";
/// Owner tag used by the live preview.
pub const PREVIEW_OWNER: &str = "live_preview";

/// Which component is entitled to use the cameras.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// Nobody
    Idle,
    /// Live preview holds one camera open continuously
    Preview(CameraId),
    /// The periodic scheduler rotates through cameras
    Rotation,
}

/// Shared gatekeeper for camera hardware.
#[derive(Clone)]
pub struct CameraAccess {
    driver: Arc<dyn CameraDriver>,
    slot: Arc<tokio::sync::Mutex<()>>,
    owner: Arc<Mutex<Option<String>>>,
    mode: Arc<Mutex<AcquisitionMode>>,
    acquire_timeout: Duration,
}

impl fmt::Debug for CameraAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraAccess")
            .field("owner", &*self.owner.lock())
            .field("mode", &*self.mode.lock())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl CameraAccess {
    /// Wrap `driver` behind a single exclusive slot.
    pub fn new(driver: Arc<dyn CameraDriver>, acquire_timeout: Duration) -> Self {
        Self {
            driver,
            slot: Arc::new(tokio::sync::Mutex::new(())),
            owner: Arc::new(Mutex::new(None)),
            mode: Arc::new(Mutex::new(AcquisitionMode::Idle)),
            acquire_timeout,
        }
    }

    /// Acquire the slot and open camera `id` for `owner`.
    ///
    /// # Errors
    /// - `CameraBusy` if the slot is not released within the acquire timeout
    /// - whatever the driver returns from `open`
    pub async fn open_exclusive(&self, owner: &str, id: &CameraId) -> AppResult<ExclusiveCamera> {
        let permit = timeout(self.acquire_timeout, Arc::clone(&self.slot).lock_owned())
            .await
            .map_err(|_| DaqError::CameraBusy {
                owner: owner.to_string(),
                waited: self.acquire_timeout,
            })?;

        *self.owner.lock() = Some(owner.to_string());
        let lease = SlotLease {
            _permit: permit,
            owner: Arc::clone(&self.owner),
        };

        // An open failure drops `lease` here and frees the slot.
        let handle = self.driver.open(id).await?;
        debug!(camera = %id, owner, "camera opened");

        Ok(ExclusiveCamera {
            camera: id.clone(),
            handle: Some(handle),
            _lease: lease,
        })
    }

    /// Open `id`, capture one frame and close it again.
    ///
    /// The handle is closed before this returns, whether the capture succeeded,
    /// failed or ran past `capture_timeout`.
    pub async fn capture_frame(
        &self,
        owner: &str,
        id: &CameraId,
        capture_timeout: Duration,
    ) -> AppResult<Frame> {
        let mut camera = self.open_exclusive(owner, id).await?;

        let result = match timeout(capture_timeout, camera.capture()).await {
            Ok(result) => result,
            Err(_) => Err(DaqError::hardware(
                id.as_str(),
                format!("capture timed out after {capture_timeout:?}"),
            )),
        };

        if let Err(e) = camera.close() {
            warn!(camera = %id, error = %e, "camera close reported an error");
        }
        result
    }

    /// Whether no component currently holds the slot.
    pub fn is_available(&self) -> bool {
        self.slot.try_lock().is_ok()
    }

    /// Component currently holding the slot, if any.
    pub fn current_owner(&self) -> Option<String> {
        self.owner.lock().clone()
    }

    /// Current acquisition mode.
    pub fn mode(&self) -> AcquisitionMode {
        self.mode.lock().clone()
    }

    /// Switch to rotation mode. Returns the camera live preview was using, if
    /// it was active; the caller must stop that preview before capturing.
    pub fn claim_rotation(&self) -> Option<CameraId> {
        let mut mode = self.mode.lock();
        match std::mem::replace(&mut *mode, AcquisitionMode::Rotation) {
            AcquisitionMode::Preview(id) => Some(id),
            _ => None,
        }
    }

    /// Leave rotation mode.
    pub fn release_rotation(&self) {
        let mut mode = self.mode.lock();
        if *mode == AcquisitionMode::Rotation {
            *mode = AcquisitionMode::Idle;
        }
    }

    /// Enter preview mode for `id`.
    ///
    /// # Errors
    /// `SchedulerRunning` while the rotation owns the cameras.
    pub fn claim_preview(&self, id: &CameraId) -> AppResult<()> {
        let mut mode = self.mode.lock();
        if *mode == AcquisitionMode::Rotation {
            return Err(DaqError::SchedulerRunning);
        }
        *mode = AcquisitionMode::Preview(id.clone());
        Ok(())
    }

    /// Leave preview mode. No effect if the rotation has taken over.
    pub fn release_preview(&self) {
        let mut mode = self.mode.lock();
        if matches!(*mode, AcquisitionMode::Preview(_)) {
            *mode = AcquisitionMode::Idle;
        }
    }
}

/// Holds the system-wide slot; clears the owner tag when dropped.
struct SlotLease {
    _permit: OwnedMutexGuard<()>,
    owner: Arc<Mutex<Option<String>>>,
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        *self.owner.lock() = None;
    }
}

/// An open camera plus exclusive ownership of the hardware slot.
///
/// Closing (explicitly or by drop) releases the device before the slot.
pub struct ExclusiveCamera {
    camera: CameraId,
    handle: Option<Box<dyn CameraHandle>>,
    _lease: SlotLease,
}

impl fmt::Debug for ExclusiveCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveCamera")
            .field("camera", &self.camera)
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl ExclusiveCamera {
    /// Camera held by this guard.
    pub fn id(&self) -> &CameraId {
        &self.camera
    }

    /// Capture one frame.
    pub async fn capture(&mut self) -> AppResult<Frame> {
        match self.handle.as_mut() {
            Some(handle) => handle.capture().await,
            None => Err(DaqError::hardware(self.camera.as_str(), "handle already closed")),
        }
    }

    /// Close the device and release the slot.
    pub fn close(mut self) -> AppResult<()> {
        self.close_handle()
    }

    fn close_handle(&mut self) -> AppResult<()> {
        match self.handle.take() {
            Some(mut handle) => {
                let result = handle.close();
                debug!(camera = %self.camera, "camera closed");
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for ExclusiveCamera {
    fn drop(&mut self) {
        if let Err(e) = self.close_handle() {
            warn!(camera = %self.camera, error = %e, "camera close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::{MockCameraBank, MockCameraSpec};

    fn access_for(bank: &MockCameraBank) -> CameraAccess {
        CameraAccess::new(Arc::new(bank.clone()), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_capture_frame_releases_slot() {
        let bank = MockCameraBank::with_cameras(["a", "b"]);
        let access = access_for(&bank);

        let frame = access
            .capture_frame(SCHEDULER_OWNER, &"a".into(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame.camera, CameraId::from("a"));
        assert!(access.is_available());
        assert_eq!(bank.open_count(), 0);
        assert!(access.current_owner().is_none());
    }

    #[tokio::test]
    async fn test_capture_failure_still_closes() {
        let bank = MockCameraBank::new();
        bank.add_camera(MockCameraSpec::new("bad").fail_from_frame(1));
        let access = access_for(&bank);

        let result = access
            .capture_frame(SCHEDULER_OWNER, &"bad".into(), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(DaqError::HardwareUnavailable { .. })));
        assert_eq!(bank.open_count(), 0);
        assert!(access.is_available());
    }

    #[tokio::test]
    async fn test_open_failure_releases_slot() {
        let bank = MockCameraBank::new();
        bank.add_camera(MockCameraSpec::new("dead").fail_open());
        let access = access_for(&bank);

        assert!(access.open_exclusive(PREVIEW_OWNER, &"dead".into()).await.is_err());
        assert!(access.is_available());
        assert!(access.current_owner().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_timeout_closes_handle() {
        let bank = MockCameraBank::new();
        bank.add_camera(MockCameraSpec::new("slow").capture_delay(Duration::from_secs(30)));
        let access = access_for(&bank);

        let err = access
            .capture_frame(SCHEDULER_OWNER, &"slow".into(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(bank.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_owner_times_out() {
        let bank = MockCameraBank::with_cameras(["a", "b"]);
        let access = access_for(&bank);

        let held = access.open_exclusive(PREVIEW_OWNER, &"a".into()).await.unwrap();
        assert_eq!(access.current_owner().as_deref(), Some(PREVIEW_OWNER));

        let err = access
            .capture_frame(SCHEDULER_OWNER, &"b".into(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DaqError::CameraBusy { .. }));

        drop(held);
        assert!(access.is_available());
        assert_eq!(bank.max_concurrent_open(), 1);
    }

    #[tokio::test]
    async fn test_drop_closes_open_camera() {
        let bank = MockCameraBank::with_cameras(["a"]);
        let access = access_for(&bank);

        {
            let mut camera = access.open_exclusive(PREVIEW_OWNER, &"a".into()).await.unwrap();
            camera.capture().await.unwrap();
            assert_eq!(bank.open_count(), 1);
        }
        assert_eq!(bank.open_count(), 0);
        assert!(access.is_available());
    }

    #[test]
    fn test_mode_arbitration() {
        let bank = MockCameraBank::with_cameras(["a"]);
        let access = access_for(&bank);

        access.claim_preview(&"a".into()).unwrap();
        assert_eq!(access.mode(), AcquisitionMode::Preview("a".into()));

        assert_eq!(access.claim_rotation(), Some("a".into()));
        assert_eq!(access.mode(), AcquisitionMode::Rotation);

        assert!(matches!(
            access.claim_preview(&"a".into()),
            Err(DaqError::SchedulerRunning)
        ));
        access.release_preview();
        assert_eq!(access.mode(), AcquisitionMode::Rotation);

        access.release_rotation();
        assert_eq!(access.mode(), AcquisitionMode::Idle);
        assert_eq!(access.claim_rotation(), None);
    }
}
