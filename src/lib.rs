//! Vision Fog - per-tick "who can see what" streaming for fog-of-war shaders
//!
//! Collects the pose of a local observer and up to `max_team_size - 1`
//! teammates, resolves each one's ground footprint and reversed-Z
//! view-projection, packs everything into two fixed-layout float textures and
//! streams them to a render thread without per-observer draw calls.
//!
//! # Features
//! - Fixed slot pool with one depth capture target per slot
//! - Deterministic packing: 2 texels per source, 4 matrix rows per source
//! - Move-only staging buffers released exactly once across the thread boundary
//! - Headless CPU backend and an optional wgpu backend (`wgpu-backend`)
//!
//! # Example
//!
//! ```ignore
//! let render = RenderThread::spawn(HeadlessBackend::new())?;
//! let mut fog = VisionFog::builder(VisionFogConfig::default())
//!     .render_queue(render.queue())
//!     .spatial_query(Arc::new(GroundPlane::new(0.0)))
//!     .parameter_store(parameters)
//!     .fog_material(material)
//!     .build();
//! fog.initialize()?;
//! fog.register_sources(local_player, &teammates)?;
//! loop {
//!     fog.tick();
//! }
//! ```

pub mod backend;
pub mod engine;
pub mod error;
pub mod scene;
pub mod vision;

pub use backend::{HeadlessBackend, RenderQueue, RenderThread};
pub use engine::{FogState, OwnerAuthority, TickOutcome, VisionFog, VisionFogBuilder};
pub use error::{FogError, FogResult};
pub use scene::{CollisionChannel, GroundPlane, ObserverCell, ObserverPose, SpatialQuery, VisionObserver};
pub use vision::{InMemoryParameterStore, PackedFrame, ParameterStore, VisionSourceRecord};

#[cfg(feature = "wgpu-backend")]
pub use backend::WgpuBackend;

/// Hard upper bound for [`VisionFogConfig::max_team_size`]
pub const MAX_SUPPORTED_TEAM_SIZE: usize = 64;

/// Configuration for the vision fog pipeline
#[derive(Debug, Clone)]
pub struct VisionFogConfig {
    /// Number of slots; slot 0 belongs to the local observer
    pub max_team_size: usize,
    /// Reach of the vision cone, also the far plane of every capture
    pub vision_distance: f32,
    /// Full horizontal opening of the vision cone in degrees
    pub vision_angle_degrees: f32,
    /// Radius of the ground footprint around each observer
    pub proximity_radius: f32,
    /// Height above the footprint still revealed by proximity
    pub proximity_max_height: f32,
    /// Size of each per-slot depth target (width, height)
    pub render_target_resolution: (u32, u32),
    /// Channel used by the downward ground probe
    pub probe_channel: CollisionChannel,
    /// Near plane of every capture
    pub near_plane: f32,
    /// Drop below the eye used when the ground probe misses
    pub ground_fallback_height: f32,
}

impl Default for VisionFogConfig {
    fn default() -> Self {
        Self {
            max_team_size: 8,
            vision_distance: 2000.0,
            vision_angle_degrees: 90.0,
            proximity_radius: 100.0,
            proximity_max_height: 200.0,
            render_target_resolution: (512, 512),
            probe_channel: CollisionChannel::WorldStatic,
            near_plane: 10.0,
            ground_fallback_height: 88.0,
        }
    }
}

impl VisionFogConfig {
    /// Reject configurations the pipeline cannot allocate for.
    ///
    /// Value ranges are otherwise the caller's business.
    pub fn validate(&self) -> FogResult<()> {
        if self.max_team_size == 0 || self.max_team_size > MAX_SUPPORTED_TEAM_SIZE {
            return Err(FogError::InvalidConfig(format!(
                "max_team_size must be in 1..={MAX_SUPPORTED_TEAM_SIZE}, got {}",
                self.max_team_size
            )));
        }
        let (width, height) = self.render_target_resolution;
        if width == 0 || height == 0 {
            return Err(FogError::InvalidConfig(format!(
                "render target resolution {width}x{height} has no area"
            )));
        }
        Ok(())
    }

    pub fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.render_target_resolution;
        width as f32 / height as f32
    }

    pub fn cone_half_angle_degrees(&self) -> f32 {
        self.vision_angle_degrees * 0.5
    }

    /// Length of the downward ground probe
    pub fn ground_probe_distance(&self) -> f32 {
        2.0 * self.vision_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = VisionFogConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_team_size, 8);
        assert_eq!(config.aspect_ratio(), 1.0);
        assert_eq!(config.cone_half_angle_degrees(), 45.0);
        assert_eq!(config.ground_probe_distance(), 4000.0);
    }

    #[test]
    fn test_config_rejects_bad_capacity() {
        let config = VisionFogConfig {
            max_team_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FogError::InvalidConfig(_))));

        let config = VisionFogConfig {
            max_team_size: MAX_SUPPORTED_TEAM_SIZE + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FogError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_rejects_empty_resolution() {
        let config = VisionFogConfig {
            render_target_resolution: (512, 0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FogError::InvalidConfig(_))));
    }
}
