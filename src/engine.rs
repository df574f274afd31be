//! Main pipeline orchestrator
//!
//! [`VisionFog`] owns the slot pool, the frame packer and the streaming
//! bridge. An external driver calls [`VisionFog::tick`] once per simulation
//! tick, or the three steps it wraps ([`VisionFog::pack_frame`],
//! [`VisionFog::submit`], [`VisionFog::publish`]) itself:
//!
//! ```text
//! Uninitialized --initialize--> Configured --register_sources--> Active
//!       |                           |                              |
//!       +------ missing dependency / remote owner / shutdown ------+--> Disabled
//! ```

use crate::backend::{CaptureSettings, RenderQueue, ResourceStatus, StagingStats};
use crate::error::{FogError, FogResult};
use crate::scene::{ObserverHandle, SpatialQuery};
use crate::vision::{
    names, FramePacker, GroundProjector, PackedFrame, ParameterStore, Registration, SourcePool,
    StreamingBridge, SubmitReport, VisionParameters,
};
use crate::VisionFogConfig;
use std::fmt;
use std::sync::Arc;

/// Pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FogState {
    Uninitialized,
    /// Resources requested, no sources registered
    Configured,
    /// Packing and streaming every tick
    Active,
    /// Permanently off; ticks are no-ops
    Disabled,
}

impl FogState {
    pub fn name(&self) -> &'static str {
        match self {
            FogState::Uninitialized => "Uninitialized",
            FogState::Configured => "Configured",
            FogState::Active => "Active",
            FogState::Disabled => "Disabled",
        }
    }
}

impl fmt::Display for FogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether the owning context is controlled on this machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnerAuthority {
    #[default]
    Local,
    /// Replicated copy of another machine's player; never captures
    Remote,
}

/// Result of one [`VisionFog::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing done in this state
    Suppressed(FogState),
    /// Data textures are still being created on the render thread
    AwaitingResources,
    Submitted {
        active_count: usize,
        captured: usize,
        skipped: usize,
        /// Both uploads reached the render queue
        uploads_queued: bool,
    },
}

/// Builder for [`VisionFog`]
pub struct VisionFogBuilder {
    config: VisionFogConfig,
    authority: OwnerAuthority,
    render: Option<RenderQueue>,
    spatial_query: Option<Arc<dyn SpatialQuery>>,
    parameters: Option<Arc<dyn ParameterStore>>,
    material: Option<Arc<dyn ParameterStore>>,
}

impl VisionFogBuilder {
    pub fn render_queue(mut self, render: RenderQueue) -> Self {
        self.render = Some(render);
        self
    }

    pub fn spatial_query(mut self, query: Arc<dyn SpatialQuery>) -> Self {
        self.spatial_query = Some(query);
        self
    }

    /// Global parameter collection receiving the per-tick scalars
    pub fn parameter_store(mut self, store: Arc<dyn ParameterStore>) -> Self {
        self.parameters = Some(store);
        self
    }

    /// Post-process material receiving texture bindings and `FogEnabled`
    pub fn fog_material(mut self, material: Arc<dyn ParameterStore>) -> Self {
        self.material = Some(material);
        self
    }

    pub fn authority(mut self, authority: OwnerAuthority) -> Self {
        self.authority = authority;
        self
    }

    pub fn build(self) -> VisionFog {
        VisionFog {
            config: self.config,
            authority: self.authority,
            state: FogState::Uninitialized,
            render: self.render,
            spatial_query: self.spatial_query,
            parameters: self.parameters,
            material: self.material,
            pipeline: None,
        }
    }
}

/// Everything that exists once configuration succeeded
struct Pipeline {
    pool: SourcePool,
    packer: FramePacker,
    bridge: StreamingBridge,
    parameters: Arc<dyn ParameterStore>,
    resources_ready: bool,
}

impl Pipeline {
    fn build(
        config: &VisionFogConfig,
        render: RenderQueue,
        query: Arc<dyn SpatialQuery>,
        parameters: Arc<dyn ParameterStore>,
    ) -> FogResult<Self> {
        let settings = CaptureSettings::depth_perspective(
            config.vision_angle_degrees,
            config.near_plane,
            config.vision_distance,
        );
        let pool = SourcePool::initialize(
            render.clone(),
            config.max_team_size,
            config.render_target_resolution,
            settings,
        )?;
        let bridge = StreamingBridge::allocate(render, config.max_team_size)?;
        let ground = GroundProjector::new(query, config.probe_channel, config.ground_fallback_height);

        Ok(Self {
            pool,
            packer: FramePacker::new(config, ground),
            bridge,
            parameters,
            resources_ready: false,
        })
    }

    fn bind(&self, material: &dyn ParameterStore) {
        material.set_texture_binding(names::SOURCE_DATA_TEXTURE, self.bridge.source_texture());
        material.set_texture_binding(names::SOURCE_MATRIX_TEXTURE, self.bridge.matrix_texture());
        for slot in self.pool.slots() {
            material.set_texture_binding(&names::depth_texture(slot.index()), slot.target());
        }
        material.set_scalar(names::FOG_ENABLED, 0.0);
        self.parameters
            .set_scalar(names::MAX_SOURCE_COUNT, self.pool.capacity() as f32);
    }
}

/// Fog-of-war vision aggregation pipeline
pub struct VisionFog {
    config: VisionFogConfig,
    authority: OwnerAuthority,
    state: FogState,
    render: Option<RenderQueue>,
    spatial_query: Option<Arc<dyn SpatialQuery>>,
    parameters: Option<Arc<dyn ParameterStore>>,
    material: Option<Arc<dyn ParameterStore>>,
    pipeline: Option<Pipeline>,
}

impl VisionFog {
    pub fn builder(config: VisionFogConfig) -> VisionFogBuilder {
        VisionFogBuilder {
            config,
            authority: OwnerAuthority::Local,
            render: None,
            spatial_query: None,
            parameters: None,
            material: None,
        }
    }

    pub fn state(&self) -> FogState {
        self.state
    }

    pub fn authority(&self) -> OwnerAuthority {
        self.authority
    }

    pub fn config(&self) -> &VisionFogConfig {
        &self.config
    }

    pub fn source_pool(&self) -> Option<&SourcePool> {
        self.pipeline.as_ref().map(|p| &p.pool)
    }

    pub fn bridge(&self) -> Option<&StreamingBridge> {
        self.pipeline.as_ref().map(|p| &p.bridge)
    }

    pub fn staging_stats(&self) -> Option<StagingStats> {
        self.pipeline.as_ref().map(|p| p.packer.staging_stats())
    }

    /// Validate configuration and collaborators, then request every slot
    /// target, capture and data texture.
    ///
    /// A remote owner ends up `Disabled` without error. Any other failure
    /// disables the pipeline and is returned.
    pub fn initialize(&mut self) -> FogResult<()> {
        self.expect_state("initialize", &[FogState::Uninitialized])?;

        if let Err(err) = self.config.validate() {
            log::error!("Vision fog disabled: {err}");
            self.disable();
            return Err(err);
        }

        let (render, query, parameters, material) = match self.dependencies() {
            Ok(deps) => deps,
            Err(err) => {
                log::error!("Vision fog disabled: {err}");
                self.disable();
                return Err(err);
            }
        };

        if self.authority == OwnerAuthority::Remote {
            log::info!("Owner is not locally controlled, vision fog disabled");
            self.disable();
            return Ok(());
        }

        match Pipeline::build(&self.config, render, query, parameters) {
            Ok(pipeline) => {
                pipeline.bind(material.as_ref());
                log::info!(
                    "Vision fog configured: {} slots, distance {}, angle {}",
                    self.config.max_team_size,
                    self.config.vision_distance,
                    self.config.vision_angle_degrees
                );
                self.pipeline = Some(pipeline);
                self.state = FogState::Configured;
                Ok(())
            }
            Err(err) => {
                log::error!("Vision fog disabled: {err}");
                self.disable();
                Err(err)
            }
        }
    }

    /// Assign the local observer to slot 0 and teammates to the following
    /// slots, replacing any previous registration.
    ///
    /// Teammates beyond capacity are dropped with a warning; the returned
    /// [`Registration`] reports how many.
    pub fn register_sources(
        &mut self,
        local: ObserverHandle,
        teammates: &[ObserverHandle],
    ) -> FogResult<Registration> {
        self.expect_state("register_sources", &[FogState::Configured, FogState::Active])?;
        let pipeline = self.pipeline.as_mut().ok_or(FogError::InvalidState {
            operation: "register_sources",
            state: self.state.name(),
        })?;

        let observers: Vec<ObserverHandle> = std::iter::once(local)
            .chain(teammates.iter().cloned())
            .collect();
        let registration = pipeline.pool.register_sources(&observers);

        if registration.registered == 0 {
            self.state = FogState::Configured;
        } else if self.state != FogState::Active {
            if let Some(material) = &self.material {
                material.set_scalar(names::FOG_ENABLED, 1.0);
            }
            log::info!("Vision fog active with {} sources", registration.registered);
            self.state = FogState::Active;
        }
        Ok(registration)
    }

    /// Pack, stream and publish one tick
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != FogState::Active {
            return TickOutcome::Suppressed(self.state);
        }

        match self.resource_status() {
            ResourceStatus::Ready => {}
            ResourceStatus::Pending => return TickOutcome::AwaitingResources,
            ResourceStatus::Failed => return TickOutcome::Suppressed(self.state),
        }

        let frame = match self.pack_frame() {
            Ok(frame) => frame,
            Err(_) => return TickOutcome::Suppressed(self.state),
        };
        let active_count = frame.active_count();
        let captured = frame.captured_count();
        let skipped = frame.skipped_count();

        let uploads_queued = self
            .submit(frame)
            .map(|report| report.all_queued())
            .unwrap_or(false);
        if let Err(err) = self.publish(active_count) {
            log::debug!("Vision parameters not published: {err}");
        }

        TickOutcome::Submitted {
            active_count,
            captured,
            skipped,
            uploads_queued,
        }
    }

    /// Snapshot every registered observer into a fresh [`PackedFrame`].
    ///
    /// Fails with [`FogError::ResourceUnavailable`] while the render thread
    /// is still creating slot targets or data textures.
    pub fn pack_frame(&mut self) -> FogResult<PackedFrame> {
        self.expect_state("pack_frame", &[FogState::Active])?;
        match self.resource_status() {
            ResourceStatus::Ready => {}
            ResourceStatus::Pending => {
                return Err(FogError::ResourceUnavailable(
                    "vision render resources are still being created".into(),
                ))
            }
            ResourceStatus::Failed => {
                return Err(FogError::ResourceUnavailable(
                    "vision render resources could not be created".into(),
                ))
            }
        }
        let pipeline = self.pipeline.as_mut().ok_or(FogError::InvalidState {
            operation: "pack_frame",
            state: self.state.name(),
        })?;
        Ok(pipeline.packer.pack_frame(&mut pipeline.pool))
    }

    /// Hand both buffers of `frame` to the render thread. On error the frame
    /// is dropped, which releases its buffers.
    pub fn submit(&self, frame: PackedFrame) -> FogResult<SubmitReport> {
        let pipeline = self.active_pipeline("submit")?;
        Ok(pipeline.bridge.submit(frame))
    }

    /// Publish the per-tick shader parameters for `active_count` sources
    pub fn publish(&self, active_count: usize) -> FogResult<VisionParameters> {
        let pipeline = self.active_pipeline("publish")?;
        let params = VisionParameters::new(
            active_count,
            self.config.cone_half_angle_degrees(),
            self.config.vision_distance,
            self.config.proximity_radius,
            self.config.proximity_max_height,
        );
        params.publish(pipeline.parameters.as_ref());
        Ok(params)
    }

    /// Readiness of slot targets, captures and data textures, latched once
    /// everything is ready. A failure disables the pipeline.
    fn resource_status(&mut self) -> ResourceStatus {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return ResourceStatus::Failed;
        };
        if pipeline.resources_ready {
            return ResourceStatus::Ready;
        }

        let status = match (pipeline.pool.resource_status(), pipeline.bridge.resource_status()) {
            (ResourceStatus::Failed, _) | (_, ResourceStatus::Failed) => ResourceStatus::Failed,
            (ResourceStatus::Pending, _) | (_, ResourceStatus::Pending) => ResourceStatus::Pending,
            (ResourceStatus::Ready, ResourceStatus::Ready) => ResourceStatus::Ready,
        };
        match status {
            ResourceStatus::Ready => pipeline.resources_ready = true,
            ResourceStatus::Pending => {}
            ResourceStatus::Failed => {
                log::error!("Vision render resources could not be created, vision fog disabled");
                self.disable();
            }
        }
        status
    }

    fn active_pipeline(&self, operation: &'static str) -> FogResult<&Pipeline> {
        self.expect_state(operation, &[FogState::Active])?;
        self.pipeline.as_ref().ok_or(FogError::InvalidState {
            operation,
            state: self.state.name(),
        })
    }

    /// Clear every registration, release render resources and switch the
    /// post-process off
    pub fn shutdown(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.parameters.set_scalar(names::ACTIVE_SOURCE_COUNT, 0.0);
            pipeline.pool.destroy();
            pipeline.bridge.destroy();
        }
        self.disable();
        log::info!("Vision fog shut down");
    }

    fn disable(&mut self) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.pool.deregister_all();
        }
        if let Some(material) = &self.material {
            material.set_scalar(names::FOG_ENABLED, 0.0);
        }
        self.state = FogState::Disabled;
    }

    #[allow(clippy::type_complexity)]
    fn dependencies(
        &self,
    ) -> FogResult<(
        RenderQueue,
        Arc<dyn SpatialQuery>,
        Arc<dyn ParameterStore>,
        Arc<dyn ParameterStore>,
    )> {
        let render = self
            .render
            .clone()
            .ok_or(FogError::MissingDependency("render queue"))?;
        let query = self
            .spatial_query
            .clone()
            .ok_or(FogError::MissingDependency("spatial query"))?;
        let parameters = self
            .parameters
            .clone()
            .ok_or(FogError::MissingDependency("parameter store"))?;
        let material = self
            .material
            .clone()
            .ok_or(FogError::MissingDependency("fog material"))?;
        Ok((render, query, parameters, material))
    }

    fn expect_state(&self, operation: &'static str, allowed: &[FogState]) -> FogResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(FogError::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, RenderThread};
    use crate::scene::{GroundPlane, ObserverPose};
    use crate::vision::InMemoryParameterStore;
    use glam::Vec3;

    struct Harness {
        thread: RenderThread,
        parameters: Arc<InMemoryParameterStore>,
        material: Arc<InMemoryParameterStore>,
    }

    fn harness() -> Harness {
        Harness {
            thread: RenderThread::spawn(HeadlessBackend::new()).unwrap(),
            parameters: InMemoryParameterStore::new(),
            material: InMemoryParameterStore::new(),
        }
    }

    fn config() -> VisionFogConfig {
        VisionFogConfig {
            max_team_size: 4,
            render_target_resolution: (16, 16),
            ..Default::default()
        }
    }

    fn fog(h: &Harness, authority: OwnerAuthority) -> VisionFog {
        VisionFog::builder(config())
            .render_queue(h.thread.queue())
            .spatial_query(Arc::new(GroundPlane::new(0.0)))
            .parameter_store(h.parameters.clone())
            .fog_material(h.material.clone())
            .authority(authority)
            .build()
    }

    fn local() -> ObserverHandle {
        Arc::new(ObserverPose::new(Vec3::new(0.0, 0.0, 100.0), Vec3::X))
    }

    #[test]
    fn test_lifecycle() {
        let h = harness();
        let mut fog = fog(&h, OwnerAuthority::Local);
        assert_eq!(fog.state(), FogState::Uninitialized);
        assert_eq!(fog.tick(), TickOutcome::Suppressed(FogState::Uninitialized));

        fog.initialize().unwrap();
        assert_eq!(fog.state(), FogState::Configured);
        assert_eq!(h.material.scalar(names::FOG_ENABLED), Some(0.0));
        assert_eq!(h.parameters.scalar(names::MAX_SOURCE_COUNT), Some(4.0));
        assert_eq!(fog.tick(), TickOutcome::Suppressed(FogState::Configured));

        fog.register_sources(local(), &[]).unwrap();
        assert_eq!(fog.state(), FogState::Active);
        assert_eq!(h.material.scalar(names::FOG_ENABLED), Some(1.0));

        h.thread.queue().flush().unwrap();
        assert_eq!(
            fog.tick(),
            TickOutcome::Submitted {
                active_count: 1,
                captured: 1,
                skipped: 0,
                uploads_queued: true,
            }
        );
        assert_eq!(h.parameters.scalar(names::ACTIVE_SOURCE_COUNT), Some(1.0));

        fog.shutdown();
        assert_eq!(fog.state(), FogState::Disabled);
        assert_eq!(h.material.scalar(names::FOG_ENABLED), Some(0.0));
        assert_eq!(fog.tick(), TickOutcome::Suppressed(FogState::Disabled));
    }

    #[test]
    fn test_manual_tick_steps() {
        let h = harness();
        let mut fog = fog(&h, OwnerAuthority::Local);
        fog.initialize().unwrap();
        assert!(matches!(
            fog.pack_frame(),
            Err(FogError::InvalidState { operation: "pack_frame", .. })
        ));

        fog.register_sources(local(), &[local()]).unwrap();
        h.thread.queue().flush().unwrap();

        let frame = fog.pack_frame().unwrap();
        let active_count = frame.active_count();
        assert_eq!(active_count, 2);
        assert!(fog.submit(frame).unwrap().all_queued());
        let params = fog.publish(active_count).unwrap();
        assert_eq!(params.active_count, 2);
        assert_eq!(h.parameters.scalar(names::ACTIVE_SOURCE_COUNT), Some(2.0));

        h.thread.queue().flush().unwrap();
        assert_eq!(fog.staging_stats().unwrap().in_flight(), 0);
    }

    #[test]
    fn test_material_bindings() {
        let h = harness();
        let mut fog = fog(&h, OwnerAuthority::Local);
        fog.initialize().unwrap();

        let bridge = fog.bridge().unwrap();
        assert_eq!(h.material.texture(names::SOURCE_DATA_TEXTURE), Some(bridge.source_texture()));
        assert_eq!(h.material.texture(names::SOURCE_MATRIX_TEXTURE), Some(bridge.matrix_texture()));
        for slot in fog.source_pool().unwrap().slots() {
            assert_eq!(h.material.texture(&names::depth_texture(slot.index())), Some(slot.target()));
        }
    }

    #[test]
    fn test_missing_dependency_disables() {
        let h = harness();
        let mut fog = VisionFog::builder(config())
            .render_queue(h.thread.queue())
            .spatial_query(Arc::new(GroundPlane::new(0.0)))
            .fog_material(h.material.clone())
            .build();

        assert_eq!(fog.initialize(), Err(FogError::MissingDependency("parameter store")));
        assert_eq!(fog.state(), FogState::Disabled);
        assert_eq!(h.material.scalar(names::FOG_ENABLED), Some(0.0));
        assert!(matches!(
            fog.register_sources(local(), &[]),
            Err(FogError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_remote_owner_never_configures() {
        let h = harness();
        let mut fog = fog(&h, OwnerAuthority::Remote);
        fog.initialize().unwrap();
        assert_eq!(fog.state(), FogState::Disabled);
        assert!(fog.source_pool().is_none());
        assert_eq!(h.material.scalar(names::FOG_ENABLED), Some(0.0));
        assert_eq!(fog.tick(), TickOutcome::Suppressed(FogState::Disabled));
    }

    #[test]
    fn test_initialize_twice_is_rejected() {
        let h = harness();
        let mut fog = fog(&h, OwnerAuthority::Local);
        fog.initialize().unwrap();
        assert_eq!(
            fog.initialize(),
            Err(FogError::InvalidState {
                operation: "initialize",
                state: "Configured",
            })
        );
    }

    #[test]
    fn test_invalid_config_disables() {
        let h = harness();
        let mut fog = VisionFog::builder(VisionFogConfig {
            max_team_size: 0,
            ..Default::default()
        })
        .render_queue(h.thread.queue())
        .build();
        assert!(matches!(fog.initialize(), Err(FogError::InvalidConfig(_))));
        assert_eq!(fog.state(), FogState::Disabled);
    }
}
