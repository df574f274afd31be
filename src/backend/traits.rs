//! Core backend abstraction traits
//!
//! These traits define the interface every render backend implements. Backends
//! are only ever driven from the render thread; the simulation side talks to
//! them through [`RenderQueue`](crate::backend::RenderQueue).

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Invalid texture: {0:?}")]
    InvalidTexture(TextureHandle),
    #[error("Invalid capture: {0:?}")]
    InvalidCapture(CaptureHandle),
    #[error("Upload of {len} bytes at offset {offset} exceeds texture size {capacity}")]
    UploadOutOfBounds { offset: u64, len: u64, capacity: u64 },
    #[error("Render thread disconnected")]
    Disconnected,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU texture or render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a scene capture bound to a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle(pub(crate) u64);

impl TextureHandle {
    /// Raw identifier, shared with the resource registry
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl CaptureHandle {
    /// Raw identifier, shared with the resource registry
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Main render backend trait
///
/// Handles are minted by the caller before the command reaches the backend, so
/// allocation calls receive the handle to register rather than returning one.
pub trait RenderBackend: Send + 'static {
    /// Human readable backend name
    fn name(&self) -> &'static str;

    /// Allocate a render target or data texture
    fn allocate_render_target(
        &mut self,
        handle: TextureHandle,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<()>;

    /// Create a scene capture writing into `target`
    fn create_capture(
        &mut self,
        handle: CaptureHandle,
        target: TextureHandle,
        settings: &CaptureSettings,
    ) -> BackendResult<()>;

    /// Execute one scene capture from the given viewpoint
    fn capture_scene(&mut self, capture: CaptureHandle, view: &CaptureView) -> BackendResult<()>;

    /// Copy `bytes` into `texture` using the row layout of `region`
    fn upload_texture_region(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
        bytes: &[u8],
    ) -> BackendResult<()>;

    /// Release a texture. Unknown handles are ignored.
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Release a scene capture. Unknown handles are ignored.
    fn destroy_capture(&mut self, capture: CaptureHandle);
}
