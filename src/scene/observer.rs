//! Observers whose sight feeds the fog

use glam::Vec3;
use parking_lot::RwLock;
use std::sync::Arc;

/// Eye position and facing of one observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverPose {
    pub eye_position: Vec3,
    /// Facing direction. Expected to be unit length; the packer normalises it.
    pub forward: Vec3,
}

impl ObserverPose {
    pub fn new(eye_position: Vec3, forward: Vec3) -> Self {
        Self {
            eye_position,
            forward,
        }
    }
}

/// Anything that can report where it looks from
pub trait VisionObserver: Send + Sync {
    /// Current pose, or `None` once the observer is no longer valid
    fn pose(&self) -> Option<ObserverPose>;

    /// Name used in diagnostics
    fn name(&self) -> &str {
        "observer"
    }
}

/// Shared reference to an externally owned observer
pub type ObserverHandle = Arc<dyn VisionObserver>;

impl VisionObserver for ObserverPose {
    fn pose(&self) -> Option<ObserverPose> {
        Some(*self)
    }
}

/// Pose slot written by the caller every tick and read by the packer
#[derive(Debug)]
pub struct ObserverCell {
    name: String,
    pose: RwLock<Option<ObserverPose>>,
}

impl ObserverCell {
    pub fn new(name: impl Into<String>, pose: ObserverPose) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            pose: RwLock::new(Some(pose)),
        })
    }

    pub fn set_pose(&self, pose: ObserverPose) {
        *self.pose.write() = Some(pose);
    }

    /// Mark the observer as gone; its slot packs as empty until a new pose arrives
    pub fn invalidate(&self) {
        *self.pose.write() = None;
    }
}

impl VisionObserver for ObserverCell {
    fn pose(&self) -> Option<ObserverPose> {
        *self.pose.read()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
