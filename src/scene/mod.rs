//! Scene-side collaborators: camera projection, observers and spatial queries

pub mod camera;
pub mod observer;

pub use camera::{ProjectionBuilder, WORLD_UP};
pub use observer::{ObserverCell, ObserverHandle, ObserverPose, VisionObserver};

use glam::Vec3;

/// Collision channel a spatial query runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollisionChannel {
    #[default]
    WorldStatic,
    WorldDynamic,
    Visibility,
    Camera,
    Custom(u8),
}

/// Ray queries against the collision world
pub trait SpatialQuery: Send + Sync {
    /// First hit along the segment `origin -> end`, if any
    fn raycast(&self, origin: Vec3, end: Vec3, channel: CollisionChannel) -> Option<Vec3>;
}

/// Infinite horizontal plane at a fixed height, blocking every channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlane {
    pub height: f32,
}

impl GroundPlane {
    pub fn new(height: f32) -> Self {
        Self { height }
    }
}

impl SpatialQuery for GroundPlane {
    fn raycast(&self, origin: Vec3, end: Vec3, _channel: CollisionChannel) -> Option<Vec3> {
        let (from, to) = (origin.z - self.height, end.z - self.height);
        if from == 0.0 {
            return Some(origin);
        }
        if to != 0.0 && from.signum() == to.signum() {
            return None;
        }
        let t = from / (from - to);
        let hit = origin + (end - origin) * t;
        Some(Vec3::new(hit.x, hit.y, self.height))
    }
}
