//! Ground footprint resolution

use crate::scene::{CollisionChannel, SpatialQuery, WORLD_UP};
use glam::Vec3;
use std::sync::Arc;

/// Finds the ground point under an observer with a downward ray.
///
/// A miss (over a gap, off the level) falls back to a fixed drop below the
/// eye so the proximity footprint never disappears.
#[derive(Clone)]
pub struct GroundProjector {
    query: Arc<dyn SpatialQuery>,
    channel: CollisionChannel,
    fallback_height: f32,
}

impl GroundProjector {
    pub fn new(query: Arc<dyn SpatialQuery>, channel: CollisionChannel, fallback_height: f32) -> Self {
        Self {
            query,
            channel,
            fallback_height,
        }
    }

    pub fn channel(&self) -> CollisionChannel {
        self.channel
    }

    pub fn fallback_height(&self) -> f32 {
        self.fallback_height
    }

    pub fn project(&self, eye_position: Vec3, max_probe_distance: f32) -> Vec3 {
        let end = eye_position - WORLD_UP * max_probe_distance;
        match self.query.raycast(eye_position, end, self.channel) {
            Some(hit) => hit,
            None => {
                log::trace!("Ground probe from {eye_position} missed, using fallback");
                self.fallback(eye_position)
            }
        }
    }

    pub fn fallback(&self, eye_position: Vec3) -> Vec3 {
        eye_position - Vec3::new(0.0, 0.0, self.fallback_height)
    }
}
