//! Consecutive-failure bookkeeping and the quarantine policy.
//!
//! A camera may fail `threshold` times in a row and stay in the rotation.
//! The next consecutive failure quarantines it. A success resets the count to
//! zero but keeps the entry, so the history of a run stays inspectable.

use crate::camera::CameraId;
use std::collections::HashMap;

/// Outcome of recording a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureVerdict {
    /// Still within tolerance; carries the consecutive count.
    Tolerated(u32),
    /// Threshold exceeded; the camera must leave the rotation.
    Quarantine(u32),
}

/// Per-camera consecutive failure counts.
#[derive(Clone, Debug)]
pub struct ErrorTracker {
    threshold: u32,
    counts: HashMap<CameraId, u32>,
}

impl ErrorTracker {
    /// Tracker tolerating `threshold` consecutive failures.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counts: HashMap::new(),
        }
    }

    /// Failures tolerated before quarantine.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Reset `camera`'s count after a good frame.
    pub fn record_success(&mut self, camera: &CameraId) {
        if let Some(count) = self.counts.get_mut(camera) {
            *count = 0;
        }
    }

    /// Count a failure of `camera` and decide whether it is quarantined.
    pub fn record_failure(&mut self, camera: &CameraId) -> FailureVerdict {
        let count = self.counts.entry(camera.clone()).or_insert(0);
        *count = count.saturating_add(1);
        if *count > self.threshold {
            FailureVerdict::Quarantine(*count)
        } else {
            FailureVerdict::Tolerated(*count)
        }
    }

    /// Current consecutive failures of `camera` (0 if never failed).
    pub fn count(&self, camera: &CameraId) -> u32 {
        self.counts.get(camera).copied().unwrap_or(0)
    }

    /// Below the threshold, i.e. counted as active in status reports.
    pub fn is_healthy(&self, camera: &CameraId) -> bool {
        self.count(camera) < self.threshold
    }

    /// Whether `camera` has an entry (failed at least once this run).
    pub fn has_entry(&self, camera: &CameraId) -> bool {
        self.counts.contains_key(camera)
    }

    /// Forget everything; used when a run ends.
    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Number of cameras with an entry.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// No entries.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
