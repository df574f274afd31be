//! End-to-end ticks through the headless render thread

use glam::{Vec3, Vec4};
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::{Condvar, Mutex};
use rstest::rstest;
use std::sync::{Arc, Once};
use std::thread::ThreadId;
use vision_fog::backend::{
    BackendError, BackendResult, CaptureHandle, CaptureSettings, CaptureView, HeadlessBackend,
    HeadlessInspector, RenderBackend, RenderTargetDescriptor, RenderThread, TextureFormat, TextureHandle, TextureRegion,
};
use vision_fog::scene::{ObserverHandle, ProjectionBuilder};
use vision_fog::vision::names;
use vision_fog::{
    CollisionChannel, FogError, FogState, GroundPlane, InMemoryParameterStore, ObserverCell,
    ObserverPose, OwnerAuthority, SpatialQuery, TickOutcome, VisionFog, VisionFogConfig,
    VisionSourceRecord,
};

// Log capture shared by every test in this binary; entries are keyed by thread.
static RECORDS: Mutex<Vec<(ThreadId, Level, String)>> = parking_lot::const_mutex(Vec::new());
static LOGGER_INIT: Once = Once::new();
static LOGGER: CapturingLogger = CapturingLogger;

struct CapturingLogger;

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS.lock().push((
            std::thread::current().id(),
            record.level(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {}
}

fn init_logger() {
    LOGGER_INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

fn logged_on_this_thread(at: Level) -> Vec<String> {
    let current = std::thread::current().id();
    RECORDS
        .lock()
        .iter()
        .filter(|(thread, level, _)| *thread == current && *level == at)
        .map(|(_, _, message)| message.clone())
        .collect()
}

struct Miss;

impl SpatialQuery for Miss {
    fn raycast(&self, _origin: Vec3, _end: Vec3, _channel: CollisionChannel) -> Option<Vec3> {
        None
    }
}

struct World {
    thread: RenderThread,
    inspector: HeadlessInspector,
    parameters: Arc<InMemoryParameterStore>,
    material: Arc<InMemoryParameterStore>,
}

impl World {
    fn new() -> Self {
        init_logger();
        let backend = HeadlessBackend::new();
        let inspector = backend.inspector();
        Self {
            thread: RenderThread::spawn(backend).unwrap(),
            inspector,
            parameters: InMemoryParameterStore::new(),
            material: InMemoryParameterStore::new(),
        }
    }

    fn fog(&self, config: VisionFogConfig, query: Arc<dyn SpatialQuery>) -> VisionFog {
        let mut fog = VisionFog::builder(config)
            .render_queue(self.thread.queue())
            .spatial_query(query)
            .parameter_store(self.parameters.clone())
            .fog_material(self.material.clone())
            .build();
        fog.initialize().unwrap();
        self.thread.queue().flush().unwrap();
        fog
    }

    fn flush(&self) {
        self.thread.queue().flush().unwrap();
    }

    fn source_texels(&self, fog: &VisionFog) -> Vec<[f32; 4]> {
        let texture = fog.bridge().unwrap().source_texture();
        self.inspector.texture_texels(texture).unwrap()
    }

    fn matrix_texels(&self, fog: &VisionFog) -> Vec<[f32; 4]> {
        let texture = fog.bridge().unwrap().matrix_texture();
        self.inspector.texture_texels(texture).unwrap()
    }
}

fn observer_at(x: f32, y: f32) -> ObserverHandle {
    Arc::new(ObserverPose::new(Vec3::new(x, y, 100.0), Vec3::X))
}

#[test]
fn test_single_observer_facing_x() {
    let world = World::new();
    let mut fog = world.fog(VisionFogConfig::default(), Arc::new(GroundPlane::new(0.0)));
    fog.register_sources(observer_at(0.0, 0.0), &[]).unwrap();

    let outcome = fog.tick();
    assert_eq!(
        outcome,
        TickOutcome::Submitted {
            active_count: 1,
            captured: 1,
            skipped: 0,
            uploads_queued: true,
        }
    );
    world.flush();

    let source = world.source_texels(&fog);
    assert_eq!(source.len(), 16);
    assert_eq!(source[0], [0.0, 0.0, 100.0, 0.0]);
    assert_eq!(source[1], [1.0, 0.0, 0.0, 0.0]);
    assert!(source[2..].iter().all(|texel| *texel == [0.0; 4]));

    assert_eq!(world.parameters.scalar(names::ACTIVE_SOURCE_COUNT), Some(1.0));
    let cosine = world.parameters.scalar(names::VISION_CONE_COSINE).unwrap();
    assert!((cosine - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    assert_eq!(world.parameters.scalar(names::VISION_DISTANCE), Some(2000.0));
    assert_eq!(
        world.parameters.vector(names::VISION_PARAMS),
        Some(Vec4::new(cosine, 2000.0, 100.0, 200.0))
    );
}

#[test]
fn test_ground_miss_falls_back_below_eye() {
    let world = World::new();
    let mut fog = world.fog(VisionFogConfig::default(), Arc::new(Miss));
    fog.register_sources(observer_at(25.0, -40.0), &[]).unwrap();
    fog.tick();
    world.flush();

    let source = world.source_texels(&fog);
    let record = VisionSourceRecord::from_texels(&[source[0], source[1]]);
    assert_eq!(record.ground_position, Vec3::new(25.0, -40.0, 12.0));
}

#[test]
fn test_matrix_texture_matches_projection() {
    let world = World::new();
    let config = VisionFogConfig::default();
    let projection = ProjectionBuilder::new(
        config.vision_angle_degrees,
        config.aspect_ratio(),
        config.near_plane,
        config.vision_distance,
    );
    let mut fog = world.fog(config, Arc::new(GroundPlane::new(0.0)));
    fog.register_sources(observer_at(0.0, 0.0), &[observer_at(300.0, 0.0)]).unwrap();
    fog.tick();
    world.flush();

    let matrices = world.matrix_texels(&fog);
    for (slot, x) in [(0, 0.0), (1, 300.0)] {
        let expected = ProjectionBuilder::rows(&projection.build(Vec3::new(x, 0.0, 100.0), Vec3::X));
        for (row, expected_row) in expected.iter().enumerate() {
            assert_eq!(matrices[slot * 4 + row], expected_row.to_array());
        }
    }

    // A point straight ahead lands in front of the camera, inside the depth range.
    let m = projection.build(Vec3::new(0.0, 0.0, 100.0), Vec3::X);
    let clip = m * Vec4::new(500.0, 0.0, 100.0, 1.0);
    assert!(clip.w > 0.0);
    let depth = clip.z / clip.w;
    assert!((0.0..=1.0).contains(&depth));
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(8)]
fn test_active_count_and_zero_tail(#[case] sources: usize) {
    let world = World::new();
    let mut fog = world.fog(VisionFogConfig::default(), Arc::new(GroundPlane::new(0.0)));
    let teammates: Vec<_> = (1..sources).map(|i| observer_at(i as f32 * 10.0, 0.0)).collect();
    fog.register_sources(observer_at(0.0, 0.0), &teammates).unwrap();

    match fog.tick() {
        TickOutcome::Submitted { active_count, .. } => assert_eq!(active_count, sources),
        other => panic!("unexpected outcome {other:?}"),
    }
    world.flush();

    let source = world.source_texels(&fog);
    let matrices = world.matrix_texels(&fog);
    assert!(source[2 * sources..].iter().all(|texel| *texel == [0.0; 4]));
    assert!(matrices[4 * sources..].iter().all(|texel| *texel == [0.0; 4]));
    for slot in 0..sources {
        assert_eq!(source[2 * slot][0], slot as f32 * 10.0);
    }
    assert_eq!(
        world.parameters.scalar(names::ACTIVE_SOURCE_COUNT),
        Some(sources as f32)
    );
}

#[test]
fn test_overflow_warns_once_and_keeps_local_first() {
    let world = World::new();
    let mut fog = world.fog(VisionFogConfig::default(), Arc::new(GroundPlane::new(0.0)));
    let local = observer_at(-1.0, -1.0);
    let teammates: Vec<_> = (1..10).map(|i| observer_at(i as f32, 0.0)).collect();

    let before = logged_on_this_thread(Level::Warn).len();
    let registration = fog.register_sources(local.clone(), &teammates).unwrap();
    let warnings = logged_on_this_thread(Level::Warn);

    assert_eq!(warnings.len() - before, 1);
    assert_eq!(registration.registered, 8);
    assert_eq!(registration.dropped, 2);
    assert_eq!(
        registration.overflow(),
        Some(FogError::CapacityExceeded {
            requested: 10,
            capacity: 8,
        })
    );

    let pool = fog.source_pool().unwrap();
    assert!(Arc::ptr_eq(pool.slot(0).unwrap().observer().unwrap(), &local));
    assert_eq!(pool.occupied_count(), 8);

    match fog.tick() {
        TickOutcome::Submitted { active_count, .. } => assert_eq!(active_count, 8),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_staging_buffers_released_exactly_once() {
    let world = World::new();
    let mut fog = world.fog(VisionFogConfig::default(), Arc::new(GroundPlane::new(0.0)));
    fog.register_sources(observer_at(0.0, 0.0), &[observer_at(5.0, 5.0)]).unwrap();

    for _ in 0..5 {
        fog.tick();
    }
    world.flush();

    let stats = fog.staging_stats().unwrap();
    assert_eq!(stats.acquired, 10);
    assert_eq!(stats.released, 10);
    assert_eq!(stats.in_flight(), 0);
}

#[test]
fn test_moving_observer_updates_capture() {
    let world = World::new();
    let mut fog = world.fog(VisionFogConfig::default(), Arc::new(GroundPlane::new(0.0)));
    let cell = ObserverCell::new("runner", ObserverPose::new(Vec3::new(0.0, 0.0, 100.0), Vec3::X));
    fog.register_sources(cell.clone(), &[]).unwrap();

    fog.tick();
    cell.set_pose(ObserverPose::new(Vec3::new(0.0, 80.0, 120.0), Vec3::Y));
    fog.tick();
    world.flush();

    let capture = fog.source_pool().unwrap().slot(0).unwrap().capture();
    assert_eq!(world.inspector.captures_of(capture), 2);
    assert_eq!(
        world.inspector.last_view(capture),
        Some(CaptureView {
            eye_position: Vec3::new(0.0, 80.0, 120.0),
            forward: Vec3::Y,
        })
    );
    assert_eq!(world.source_texels(&fog)[0], [0.0, 80.0, 120.0, 0.0]);

    cell.invalidate();
    match fog.tick() {
        TickOutcome::Submitted { active_count, skipped, .. } => {
            assert_eq!(active_count, 1);
            assert_eq!(skipped, 1);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    world.flush();
    assert_eq!(world.source_texels(&fog)[0], [0.0; 4]);
}

#[test]
fn test_skipped_slot_recovers_next_tick() {
    let world = World::new();
    let mut fog = world.fog(VisionFogConfig::default(), Arc::new(GroundPlane::new(0.0)));
    let scout = ObserverCell::new("scout", ObserverPose::new(Vec3::new(40.0, 0.0, 100.0), Vec3::X));
    fog.register_sources(observer_at(0.0, 0.0), &[scout.clone() as ObserverHandle])
        .unwrap();

    scout.invalidate();
    match fog.tick() {
        TickOutcome::Submitted {
            active_count,
            captured,
            skipped,
            ..
        } => assert_eq!((active_count, captured, skipped), (2, 1, 1)),
        other => panic!("unexpected outcome {other:?}"),
    }
    world.flush();
    let source = world.source_texels(&fog);
    assert_eq!(source[0], [0.0, 0.0, 100.0, 0.0]);
    assert_eq!(&source[2..4], &[[0.0; 4]; 2]);
    assert!(world.matrix_texels(&fog)[4..8].iter().all(|texel| *texel == [0.0; 4]));

    scout.set_pose(ObserverPose::new(Vec3::new(40.0, 30.0, 110.0), Vec3::Y));
    match fog.tick() {
        TickOutcome::Submitted { captured, skipped, .. } => assert_eq!((captured, skipped), (2, 0)),
        other => panic!("unexpected outcome {other:?}"),
    }
    world.flush();
    let source = world.source_texels(&fog);
    assert_eq!(source[2], [40.0, 30.0, 110.0, 0.0]);
    assert_eq!(source[3], [0.0, 1.0, 0.0, 0.0]);
    assert!(world.matrix_texels(&fog)[4..8].iter().any(|texel| *texel != [0.0; 4]));
}

#[test]
fn test_shutdown_releases_render_resources() {
    let world = World::new();
    let mut fog = world.fog(VisionFogConfig::default(), Arc::new(GroundPlane::new(0.0)));
    fog.register_sources(observer_at(0.0, 0.0), &[]).unwrap();
    fog.tick();
    world.flush();

    let pool = fog.source_pool().unwrap();
    let capture = pool.slot(0).unwrap().capture();
    let target = pool.slot(0).unwrap().target();
    assert_eq!(world.inspector.capture_resource_count(), 8);
    assert_eq!(world.inspector.texture_count(), 10);

    fog.shutdown();
    world.flush();

    let queue = world.thread.queue();
    assert_eq!(queue.capture_status(capture), None);
    assert_eq!(queue.texture_status(target), None);
    assert_eq!(world.inspector.capture_resource_count(), 0);
    assert_eq!(world.inspector.texture_count(), 0);
    assert_eq!(world.parameters.scalar(names::ACTIVE_SOURCE_COUNT), Some(0.0));
}

#[test]
fn test_remote_owner_is_disabled() {
    let world = World::new();
    let mut fog = VisionFog::builder(VisionFogConfig::default())
        .render_queue(world.thread.queue())
        .spatial_query(Arc::new(GroundPlane::new(0.0)))
        .parameter_store(world.parameters.clone())
        .fog_material(world.material.clone())
        .authority(OwnerAuthority::Remote)
        .build();
    fog.initialize().unwrap();
    world.flush();

    assert_eq!(fog.state(), FogState::Disabled);
    assert_eq!(world.material.scalar(names::FOG_ENABLED), Some(0.0));
    assert_eq!(world.inspector.texture_count(), 0);
    assert_eq!(fog.tick(), TickOutcome::Suppressed(FogState::Disabled));
}

#[test]
fn test_missing_spatial_query_is_disabled() {
    let world = World::new();
    let mut fog = VisionFog::builder(VisionFogConfig::default())
        .render_queue(world.thread.queue())
        .parameter_store(world.parameters.clone())
        .fog_material(world.material.clone())
        .build();

    assert_eq!(fog.initialize(), Err(FogError::MissingDependency("spatial query")));
    assert_eq!(fog.state(), FogState::Disabled);
    assert_eq!(fog.tick(), TickOutcome::Suppressed(FogState::Disabled));
}

/// Headless backend whose allocations block until the gate opens
struct GatedBackend {
    inner: HeadlessBackend,
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl RenderBackend for GatedBackend {
    fn name(&self) -> &'static str {
        "Gated"
    }

    fn allocate_render_target(&mut self, handle: TextureHandle, desc: &RenderTargetDescriptor) -> BackendResult<()> {
        let (open, condvar) = &*self.gate;
        let mut open = open.lock();
        while !*open {
            condvar.wait(&mut open);
        }
        drop(open);
        self.inner.allocate_render_target(handle, desc)
    }

    fn create_capture(
        &mut self,
        handle: CaptureHandle,
        target: TextureHandle,
        settings: &CaptureSettings,
    ) -> BackendResult<()> {
        self.inner.create_capture(handle, target, settings)
    }

    fn capture_scene(&mut self, capture: CaptureHandle, view: &CaptureView) -> BackendResult<()> {
        self.inner.capture_scene(capture, view)
    }

    fn upload_texture_region(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
        bytes: &[u8],
    ) -> BackendResult<()> {
        self.inner.upload_texture_region(texture, region, bytes)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.inner.destroy_texture(texture)
    }

    fn destroy_capture(&mut self, capture: CaptureHandle) {
        self.inner.destroy_capture(capture)
    }
}

#[test]
fn test_ticks_wait_for_data_textures() {
    init_logger();
    let gate = Arc::new((Mutex::new(false), Condvar::new()));
    let thread = RenderThread::spawn(GatedBackend {
        inner: HeadlessBackend::new(),
        gate: gate.clone(),
    })
    .unwrap();
    let parameters = InMemoryParameterStore::new();
    let mut fog = VisionFog::builder(VisionFogConfig {
        max_team_size: 2,
        render_target_resolution: (16, 16),
        ..Default::default()
    })
    .render_queue(thread.queue())
    .spatial_query(Arc::new(GroundPlane::new(0.0)))
    .parameter_store(parameters.clone())
    .fog_material(InMemoryParameterStore::new())
    .build();
    fog.initialize().unwrap();
    fog.register_sources(observer_at(0.0, 0.0), &[]).unwrap();

    assert_eq!(fog.tick(), TickOutcome::AwaitingResources);
    assert_eq!(fog.tick(), TickOutcome::AwaitingResources);
    assert!(matches!(fog.pack_frame(), Err(FogError::ResourceUnavailable(_))));
    assert_eq!(fog.state(), FogState::Active);
    assert_eq!(parameters.scalar(names::ACTIVE_SOURCE_COUNT), None);
    assert_eq!(fog.staging_stats().unwrap().acquired, 0);

    {
        let (open, condvar) = &*gate;
        *open.lock() = true;
        condvar.notify_all();
    }
    thread.queue().flush().unwrap();

    assert!(matches!(fog.tick(), TickOutcome::Submitted { active_count: 1, .. }));
    thread.queue().flush().unwrap();
    assert_eq!(fog.staging_stats().unwrap().in_flight(), 0);
}

/// Headless backend that cannot create the data textures
struct NoDataTextures(HeadlessBackend);

impl RenderBackend for NoDataTextures {
    fn name(&self) -> &'static str {
        "NoDataTextures"
    }

    fn allocate_render_target(&mut self, handle: TextureHandle, desc: &RenderTargetDescriptor) -> BackendResult<()> {
        if let Some(label) = desc.label.as_deref().filter(|label| label.starts_with("Source")) {
            return Err(BackendError::TextureCreationFailed(label.to_owned()));
        }
        self.0.allocate_render_target(handle, desc)
    }

    fn create_capture(
        &mut self,
        handle: CaptureHandle,
        target: TextureHandle,
        settings: &CaptureSettings,
    ) -> BackendResult<()> {
        self.0.create_capture(handle, target, settings)
    }

    fn capture_scene(&mut self, capture: CaptureHandle, view: &CaptureView) -> BackendResult<()> {
        self.0.capture_scene(capture, view)
    }

    fn upload_texture_region(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
        bytes: &[u8],
    ) -> BackendResult<()> {
        self.0.upload_texture_region(texture, region, bytes)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.0.destroy_texture(texture)
    }

    fn destroy_capture(&mut self, capture: CaptureHandle) {
        self.0.destroy_capture(capture)
    }
}

#[test]
fn test_failed_data_texture_disables() {
    init_logger();
    let thread = RenderThread::spawn(NoDataTextures(HeadlessBackend::new())).unwrap();
    let material = InMemoryParameterStore::new();
    let mut fog = VisionFog::builder(VisionFogConfig::default())
        .render_queue(thread.queue())
        .spatial_query(Arc::new(GroundPlane::new(0.0)))
        .parameter_store(InMemoryParameterStore::new())
        .fog_material(material.clone())
        .build();
    fog.initialize().unwrap();
    fog.register_sources(observer_at(0.0, 0.0), &[]).unwrap();
    thread.queue().flush().unwrap();

    assert_eq!(fog.tick(), TickOutcome::Suppressed(FogState::Disabled));
    assert_eq!(fog.state(), FogState::Disabled);
    assert_eq!(material.scalar(names::FOG_ENABLED), Some(0.0));
}

/// Headless backend without depth target support
struct NoDepthTargets(HeadlessBackend);

impl RenderBackend for NoDepthTargets {
    fn name(&self) -> &'static str {
        "NoDepthTargets"
    }

    fn allocate_render_target(&mut self, handle: TextureHandle, desc: &RenderTargetDescriptor) -> BackendResult<()> {
        if desc.format == TextureFormat::Depth32Float {
            return Err(BackendError::TextureCreationFailed(format!("{:?}", desc.label)));
        }
        self.0.allocate_render_target(handle, desc)
    }

    fn create_capture(
        &mut self,
        handle: CaptureHandle,
        target: TextureHandle,
        settings: &CaptureSettings,
    ) -> BackendResult<()> {
        self.0.create_capture(handle, target, settings)
    }

    fn capture_scene(&mut self, capture: CaptureHandle, view: &CaptureView) -> BackendResult<()> {
        self.0.capture_scene(capture, view)
    }

    fn upload_texture_region(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
        bytes: &[u8],
    ) -> BackendResult<()> {
        self.0.upload_texture_region(texture, region, bytes)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.0.destroy_texture(texture)
    }

    fn destroy_capture(&mut self, capture: CaptureHandle) {
        self.0.destroy_capture(capture)
    }
}

#[test]
fn test_missing_capture_targets_disable() {
    init_logger();
    let thread = RenderThread::spawn(NoDepthTargets(HeadlessBackend::new())).unwrap();
    let material = InMemoryParameterStore::new();
    let mut fog = VisionFog::builder(VisionFogConfig::default())
        .render_queue(thread.queue())
        .spatial_query(Arc::new(GroundPlane::new(0.0)))
        .parameter_store(InMemoryParameterStore::new())
        .fog_material(material.clone())
        .build();
    fog.initialize().unwrap();
    fog.register_sources(observer_at(0.0, 0.0), &[]).unwrap();
    thread.queue().flush().unwrap();
    assert_eq!(material.scalar(names::FOG_ENABLED), Some(1.0));

    let errors_before = logged_on_this_thread(Level::Error).len();
    for _ in 0..3 {
        assert_eq!(fog.tick(), TickOutcome::Suppressed(FogState::Disabled));
    }

    assert_eq!(fog.state(), FogState::Disabled);
    assert_eq!(material.scalar(names::FOG_ENABLED), Some(0.0));
    assert_eq!(logged_on_this_thread(Level::Error).len() - errors_before, 1);
    assert_eq!(fog.staging_stats().unwrap().acquired, 0);
}
