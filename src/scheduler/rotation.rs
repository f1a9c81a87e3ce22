//! Ordered camera rotation with a cursor.
//!
//! Invariants:
//! - no duplicate ids; order changes only through [`Rotation::remove`]
//! - `index < len()` whenever the rotation is non-empty, `index == 0` otherwise

use crate::camera::CameraId;
use crate::error::{AppResult, DaqError};
use std::collections::HashSet;

/// Cameras cycled by the scheduler and the position of the next capture.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rotation {
    cameras: Vec<CameraId>,
    index: usize,
}

impl Rotation {
    /// Build a rotation starting at the first camera.
    ///
    /// # Errors
    /// `Configuration` if `cameras` is empty or contains duplicates.
    pub fn new(cameras: Vec<CameraId>) -> AppResult<Self> {
        if cameras.is_empty() {
            return Err(DaqError::Configuration("camera list is empty".into()));
        }
        let mut seen = HashSet::with_capacity(cameras.len());
        for id in &cameras {
            if !seen.insert(id) {
                return Err(DaqError::Configuration(format!(
                    "camera '{id}' listed more than once"
                )));
            }
        }
        Ok(Self { cameras, index: 0 })
    }

    /// Camera the next tick will capture.
    pub fn current(&self) -> Option<&CameraId> {
        self.cameras.get(self.index)
    }

    /// Position of the next capture.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Move to the next camera, wrapping at the end.
    pub fn advance(&mut self) {
        if self.cameras.is_empty() {
            self.index = 0;
        } else {
            self.index = (self.index + 1) % self.cameras.len();
        }
    }

    /// Remove `id`, keeping every other camera's relative order.
    ///
    /// Afterwards the cursor addresses the camera that followed the removed
    /// one at the time of removal (wrapping to the start). Returns `false` if
    /// `id` was not present.
    pub fn remove(&mut self, id: &CameraId) -> bool {
        let Some(pos) = self.cameras.iter().position(|c| c == id) else {
            return false;
        };
        self.cameras.remove(pos);
        if pos < self.index {
            self.index -= 1;
        }
        if self.index >= self.cameras.len() {
            self.index = 0;
        }
        true
    }

    /// Whether `id` is still being cycled.
    pub fn contains(&self, id: &CameraId) -> bool {
        self.cameras.contains(id)
    }

    /// Cameras in capture order.
    pub fn cameras(&self) -> &[CameraId] {
        &self.cameras
    }

    /// Number of cameras.
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// No cameras left.
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Drop every camera and reset the cursor.
    pub fn clear(&mut self) {
        self.cameras.clear();
        self.index = 0;
    }

    /// Same camera set, ignoring order.
    pub fn same_members(&self, other: &[CameraId]) -> bool {
        self.cameras.len() == other.len() && other.iter().all(|id| self.cameras.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<CameraId> {
        names.iter().map(|n| CameraId::from(*n)).collect()
    }

    fn rotation(names: &[&str]) -> Rotation {
        Rotation::new(ids(names)).unwrap()
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(matches!(
            Rotation::new(Vec::new()),
            Err(DaqError::Configuration(_))
        ));
        assert!(Rotation::new(ids(&["a", "b", "a"])).is_err());
    }

    #[test]
    fn test_round_robin_visits_each_once() {
        let mut r = rotation(&["a", "b", "c"]);
        let mut visited = Vec::new();
        for _ in 0..3 {
            visited.push(r.current().unwrap().clone());
            r.advance();
        }
        assert_eq!(visited, ids(&["a", "b", "c"]));
        assert_eq!(r.index(), 0);
    }

    #[test]
    fn test_remove_current_points_at_successor() {
        let mut r = rotation(&["a", "b", "c"]);
        r.advance();
        assert!(r.remove(&"b".into()));
        assert_eq!(r.cameras(), ids(&["a", "c"]).as_slice());
        assert_eq!(r.current(), Some(&"c".into()));
    }

    #[test]
    fn test_remove_last_wraps() {
        let mut r = rotation(&["a", "b", "c"]);
        r.advance();
        r.advance();
        assert!(r.remove(&"c".into()));
        assert_eq!(r.index(), 0);
        assert_eq!(r.current(), Some(&"a".into()));
    }

    #[test]
    fn test_remove_before_cursor_keeps_target() {
        let mut r = rotation(&["a", "b", "c"]);
        r.advance();
        r.advance();
        assert!(r.remove(&"a".into()));
        assert_eq!(r.current(), Some(&"c".into()));
    }

    #[test]
    fn test_remove_unknown_and_to_empty() {
        let mut r = rotation(&["a"]);
        assert!(!r.remove(&"z".into()));
        assert!(r.remove(&"a".into()));
        assert!(r.is_empty());
        assert_eq!(r.index(), 0);
        assert!(r.current().is_none());
        r.advance();
        assert_eq!(r.index(), 0);
    }

    #[test]
    fn test_index_stays_in_range_under_churn() {
        let names = ["a", "b", "c", "d", "e"];
        for victim in 0..names.len() {
            for start in 0..names.len() {
                let mut r = rotation(&names);
                for _ in 0..start {
                    r.advance();
                }
                r.remove(&names[victim].into());
                assert!(r.index() < r.len());
                r.advance();
                assert!(r.index() < r.len());
            }
        }
    }

    #[test]
    fn test_same_members() {
        let r = rotation(&["a", "b"]);
        assert!(r.same_members(&ids(&["b", "a"])));
        assert!(!r.same_members(&ids(&["a"])));
        assert!(!r.same_members(&ids(&["a", "c"])));
    }
}
