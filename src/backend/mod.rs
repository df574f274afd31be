//! Backend abstraction layer
//!
//! Provides the render backend trait, the render thread that drives it, and
//! the staging buffers used to stream data across the thread boundary.

pub mod headless;
pub mod render_thread;
pub mod staging;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use headless::{HeadlessBackend, HeadlessInspector};
pub use render_thread::{RenderQueue, RenderThread, ResourceStatus};
pub use staging::{StagingBuffer, StagingPool, StagingStats, Texel};
pub use traits::*;
pub use types::*;

#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuBackend;
