//! # Headless Demo
//!
//! Runs the vision fog pipeline for a handful of ticks with a squad of
//! observers circling a flat arena, then prints what reached the data
//! textures.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example headless_demo -- --teammates 5 --ticks 30
//! cargo run --example headless_demo -- --backend wgpu
//! ```

use clap::Parser;
use glam::Vec3;
use std::error::Error;
use std::f32::consts::TAU;
use std::sync::Arc;
use vision_fog::backend::HeadlessBackend;
use vision_fog::scene::ObserverHandle;
use vision_fog::vision::names;
use vision_fog::{
    GroundPlane, InMemoryParameterStore, ObserverCell, ObserverPose, RenderThread, TickOutcome, VisionFog,
    VisionFogConfig,
};

/// Render backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliBackend {
    /// CPU-side backend, no GPU required
    #[default]
    Headless,
    /// wgpu device without a surface
    Wgpu,
}

#[derive(Debug, Parser)]
#[command(about = "Drive the vision fog pipeline without a window")]
struct Args {
    #[arg(long, value_enum, default_value_t = CliBackend::Headless)]
    backend: CliBackend,
    /// Teammates registered next to the local observer
    #[arg(long, default_value_t = 3)]
    teammates: usize,
    #[arg(long, default_value_t = 10)]
    ticks: u32,
    #[arg(long, default_value_t = 8)]
    max_team_size: usize,
    #[arg(long, default_value_t = 2000.0)]
    vision_distance: f32,
    #[arg(long, default_value_t = 90.0)]
    vision_angle: f32,
}

fn spawn_render_thread(backend: CliBackend) -> Result<RenderThread, Box<dyn Error>> {
    match backend {
        CliBackend::Headless => Ok(RenderThread::spawn(HeadlessBackend::new())?),
        #[cfg(feature = "wgpu-backend")]
        CliBackend::Wgpu => Ok(RenderThread::spawn(vision_fog::WgpuBackend::new_headless()?)?),
        #[cfg(not(feature = "wgpu-backend"))]
        CliBackend::Wgpu => Err("built without the wgpu-backend feature".into()),
    }
}

/// Pose on a circle of `radius` around the origin, facing along the tangent
fn orbit(angle: f32, radius: f32, height: f32) -> ObserverPose {
    let eye = Vec3::new(angle.cos() * radius, angle.sin() * radius, height);
    let forward = Vec3::new(-angle.sin(), angle.cos(), 0.0);
    ObserverPose::new(eye, forward)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let render = spawn_render_thread(args.backend)?;
    log::info!("Using {} backend", render.backend_name());

    let parameters = InMemoryParameterStore::new();
    let material = InMemoryParameterStore::new();
    let config = VisionFogConfig {
        max_team_size: args.max_team_size,
        vision_distance: args.vision_distance,
        vision_angle_degrees: args.vision_angle,
        ..Default::default()
    };
    let mut fog = VisionFog::builder(config)
        .render_queue(render.queue())
        .spatial_query(Arc::new(GroundPlane::new(0.0)))
        .parameter_store(parameters.clone())
        .fog_material(material.clone())
        .build();
    fog.initialize()?;

    let squad: Vec<Arc<ObserverCell>> = (0..=args.teammates)
        .map(|i| ObserverCell::new(format!("observer{i}"), orbit(0.0, 200.0 + 50.0 * i as f32, 100.0)))
        .collect();
    let local: ObserverHandle = squad[0].clone();
    let teammates: Vec<ObserverHandle> = squad[1..].iter().map(|cell| cell.clone() as ObserverHandle).collect();
    let registration = fog.register_sources(local, &teammates)?;
    if let Some(overflow) = registration.overflow() {
        log::warn!("{overflow}");
    }

    for tick in 0..args.ticks {
        let angle = tick as f32 / args.ticks.max(1) as f32 * TAU;
        for (i, cell) in squad.iter().enumerate() {
            cell.set_pose(orbit(angle, 200.0 + 50.0 * i as f32, 100.0));
        }

        match fog.tick() {
            TickOutcome::Submitted {
                active_count,
                captured,
                skipped,
                uploads_queued,
            } => log::info!(
                "tick {tick}: {active_count} active, {captured} captured, {skipped} skipped, uploads queued: {uploads_queued}"
            ),
            other => log::info!("tick {tick}: {other:?}"),
        }
        std::thread::sleep(std::time::Duration::from_millis(16));
    }

    render.queue().flush()?;
    if let Some(stats) = fog.staging_stats() {
        log::info!(
            "Staging buffers: {} acquired, {} released",
            stats.acquired,
            stats.released
        );
    }
    log::info!(
        "ActiveSourceCount = {:?}, VisionConeCosine = {:?}, FogEnabled = {:?}",
        parameters.scalar(names::ACTIVE_SOURCE_COUNT),
        parameters.scalar(names::VISION_CONE_COSINE),
        material.scalar(names::FOG_ENABLED)
    );

    fog.shutdown();
    render.shutdown();
    Ok(())
}
