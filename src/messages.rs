//! Message types for actor-based communication
//!
//! This module defines the command and response types used for message-passing
//! between the UI layer and the capture scheduler task. All scheduler state is
//! owned by that single task; the UI only ever sends these commands.

use crate::camera::CameraId;
use crate::error::AppResult;
use crate::scheduler::{RotationSnapshot, SchedulerStatus};
use tokio::sync::oneshot;

/// Commands that can be sent to the capture scheduler
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Begin periodic capture over `cameras`
    Start {
        cameras: Vec<CameraId>,
        interval_secs: f64,
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Halt periodic capture and tear down displays
    Stop { response: oneshot::Sender<()> },

    /// Change the tick cadence
    SetInterval {
        seconds: f64,
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Query the current status
    GetStatus {
        response: oneshot::Sender<SchedulerStatus>,
    },

    /// Query rotation order, cursor, failure counts and display states
    GetSnapshot {
        response: oneshot::Sender<RotationSnapshot>,
    },

    /// Stop capturing and exit the scheduler task
    Shutdown { response: oneshot::Sender<()> },
}

impl SchedulerCommand {
    /// Helper to create a Start command
    pub fn start(
        cameras: Vec<CameraId>,
        interval_secs: f64,
    ) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Start {
                cameras,
                interval_secs,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Stop command
    pub fn stop() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Stop { response: tx }, rx)
    }

    /// Helper to create a SetInterval command
    pub fn set_interval(seconds: f64) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::SetInterval {
                seconds,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a GetStatus command
    pub fn get_status() -> (Self, oneshot::Receiver<SchedulerStatus>) {
        let (tx, rx) = oneshot::channel();
        (Self::GetStatus { response: tx }, rx)
    }

    /// Helper to create a GetSnapshot command
    pub fn get_snapshot() -> (Self, oneshot::Receiver<RotationSnapshot>) {
        let (tx, rx) = oneshot::channel();
        (Self::GetSnapshot { response: tx }, rx)
    }

    /// Helper to create a Shutdown command
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
