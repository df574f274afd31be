//! Render thread and command queue
//!
//! The backend lives on its own thread. The simulation side never touches it
//! directly: it pushes [`RenderCommand`]s through a [`RenderQueue`] and moves
//! on. Commands targeting the same resource are executed in submission order;
//! the sender gets no completion signal apart from the resource status
//! registry and the explicit [`RenderQueue::flush`] barrier.

use crate::backend::staging::StagingBuffer;
use crate::backend::traits::*;
use crate::backend::types::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Lifecycle of an asynchronously created resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    /// Requested, not yet processed by the render thread
    Pending,
    /// Created and usable
    Ready,
    /// Creation failed or the backend invalidated it
    Failed,
}

/// Work item executed on the render thread
enum RenderCommand {
    AllocateRenderTarget {
        handle: TextureHandle,
        desc: RenderTargetDescriptor,
    },
    CreateCapture {
        handle: CaptureHandle,
        target: TextureHandle,
        settings: CaptureSettings,
    },
    CaptureScene {
        capture: CaptureHandle,
        view: CaptureView,
    },
    UploadTextureRegion {
        texture: TextureHandle,
        region: TextureRegion,
        data: StagingBuffer,
    },
    DestroyTexture(TextureHandle),
    DestroyCapture(CaptureHandle),
    Flush(mpsc::SyncSender<()>),
    Shutdown,
}

#[derive(Clone, Default)]
struct ResourceRegistry {
    statuses: Arc<RwLock<HashMap<u64, ResourceStatus>>>,
}

impl ResourceRegistry {
    fn set(&self, id: u64, status: ResourceStatus) {
        self.statuses.write().insert(id, status);
    }

    fn get(&self, id: u64) -> Option<ResourceStatus> {
        self.statuses.read().get(&id).copied()
    }

    fn remove(&self, id: u64) {
        self.statuses.write().remove(&id);
    }
}

/// Cloneable sender side of the render thread
#[derive(Clone)]
pub struct RenderQueue {
    sender: mpsc::Sender<RenderCommand>,
    registry: ResourceRegistry,
    next_id: Arc<AtomicU64>,
}

impl RenderQueue {
    fn mint_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, command: RenderCommand) -> BackendResult<()> {
        // On failure the command (and any buffer it owns) is dropped right here.
        self.sender
            .send(command)
            .map_err(|_| BackendError::Disconnected)
    }

    /// Request a render target. The handle is valid immediately; the resource
    /// stays [`ResourceStatus::Pending`] until the render thread creates it.
    pub fn allocate_render_target(
        &self,
        desc: RenderTargetDescriptor,
    ) -> BackendResult<TextureHandle> {
        let handle = TextureHandle(self.mint_id());
        self.registry.set(handle.0, ResourceStatus::Pending);
        if let Err(err) = self.send(RenderCommand::AllocateRenderTarget { handle, desc }) {
            self.registry.remove(handle.0);
            return Err(err);
        }
        Ok(handle)
    }

    /// Request a scene capture bound to `target`
    pub fn create_capture(
        &self,
        target: TextureHandle,
        settings: CaptureSettings,
    ) -> BackendResult<CaptureHandle> {
        let handle = CaptureHandle(self.mint_id());
        self.registry.set(handle.0, ResourceStatus::Pending);
        if let Err(err) = self.send(RenderCommand::CreateCapture {
            handle,
            target,
            settings,
        }) {
            self.registry.remove(handle.0);
            return Err(err);
        }
        Ok(handle)
    }

    pub fn texture_status(&self, texture: TextureHandle) -> Option<ResourceStatus> {
        self.registry.get(texture.0)
    }

    pub fn capture_status(&self, capture: CaptureHandle) -> Option<ResourceStatus> {
        self.registry.get(capture.0)
    }

    pub fn is_texture_ready(&self, texture: TextureHandle) -> bool {
        self.texture_status(texture) == Some(ResourceStatus::Ready)
    }

    pub fn is_capture_ready(&self, capture: CaptureHandle) -> bool {
        self.capture_status(capture) == Some(ResourceStatus::Ready)
    }

    /// Queue one scene capture (fire-and-forget)
    pub fn capture_scene(&self, capture: CaptureHandle, view: CaptureView) -> BackendResult<()> {
        self.send(RenderCommand::CaptureScene { capture, view })
    }

    /// Queue an upload of `data` into `texture` (fire-and-forget).
    ///
    /// Ownership of `data` moves into the command. It is released on the
    /// render thread after the backend consumed it, or before this call
    /// returns if the command could not be issued.
    pub fn upload_texture_region(
        &self,
        texture: TextureHandle,
        region: TextureRegion,
        data: StagingBuffer,
    ) -> BackendResult<()> {
        self.send(RenderCommand::UploadTextureRegion {
            texture,
            region,
            data,
        })
    }

    pub fn destroy_texture(&self, texture: TextureHandle) -> BackendResult<()> {
        self.send(RenderCommand::DestroyTexture(texture))
    }

    pub fn destroy_capture(&self, capture: CaptureHandle) -> BackendResult<()> {
        self.send(RenderCommand::DestroyCapture(capture))
    }

    /// Block until every command queued before this call has been executed
    pub fn flush(&self) -> BackendResult<()> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.send(RenderCommand::Flush(ack_tx))?;
        ack_rx.recv().map_err(|_| BackendError::Disconnected)
    }
}

/// Owns the render thread and its backend
pub struct RenderThread {
    queue: RenderQueue,
    handle: Option<JoinHandle<()>>,
    backend_name: &'static str,
}

impl RenderThread {
    /// Move `backend` onto a new render thread
    pub fn spawn<B: RenderBackend>(backend: B) -> BackendResult<Self> {
        let (sender, receiver) = mpsc::channel();
        let registry = ResourceRegistry::default();
        let worker_registry = registry.clone();
        let backend_name = backend.name();

        let handle = std::thread::Builder::new()
            .name("vision-fog-render".into())
            .spawn(move || run_commands(backend, receiver, worker_registry))
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        log::info!("Render thread started ({backend_name})");

        Ok(Self {
            queue: RenderQueue {
                sender,
                registry,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            handle: Some(handle),
            backend_name,
        })
    }

    pub fn queue(&self) -> RenderQueue {
        self.queue.clone()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Stop the thread after it drained every command queued so far
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.queue.sender.send(RenderCommand::Shutdown);
        if handle.join().is_err() {
            log::error!("Render thread panicked");
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_commands<B: RenderBackend>(
    mut backend: B,
    receiver: mpsc::Receiver<RenderCommand>,
    registry: ResourceRegistry,
) {
    while let Ok(command) = receiver.recv() {
        match command {
            RenderCommand::AllocateRenderTarget { handle, desc } => {
                log::trace!("Allocating render target {:?}", desc.label);
                let status = match backend.allocate_render_target(handle, &desc) {
                    Ok(()) => ResourceStatus::Ready,
                    Err(err) => {
                        log::warn!("Render target {:?} allocation failed: {err}", desc.label);
                        ResourceStatus::Failed
                    }
                };
                registry.set(handle.0, status);
            }
            RenderCommand::CreateCapture {
                handle,
                target,
                settings,
            } => {
                let status = match backend.create_capture(handle, target, &settings) {
                    Ok(()) => ResourceStatus::Ready,
                    Err(err) => {
                        log::warn!("Capture {handle:?} creation failed: {err}");
                        ResourceStatus::Failed
                    }
                };
                registry.set(handle.0, status);
            }
            RenderCommand::CaptureScene { capture, view } => {
                if let Err(err) = backend.capture_scene(capture, &view) {
                    log::warn!("Capture {capture:?} failed: {err}");
                    if let BackendError::InvalidCapture(invalid) = err {
                        registry.set(invalid.0, ResourceStatus::Failed);
                    }
                }
            }
            RenderCommand::UploadTextureRegion {
                texture,
                region,
                data,
            } => {
                log::trace!("Uploading {} bytes to {texture:?}", data.byte_len());
                if let Err(err) = backend.upload_texture_region(texture, &region, data.as_bytes()) {
                    log::warn!("Upload to {texture:?} rejected: {err}");
                    if let BackendError::InvalidTexture(invalid) = err {
                        registry.set(invalid.0, ResourceStatus::Failed);
                    }
                }
                drop(data);
            }
            RenderCommand::DestroyTexture(texture) => {
                backend.destroy_texture(texture);
                registry.remove(texture.0);
            }
            RenderCommand::DestroyCapture(capture) => {
                backend.destroy_capture(capture);
                registry.remove(capture.0);
            }
            RenderCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            RenderCommand::Shutdown => break,
        }
    }
    log::debug!("Render thread exiting ({})", backend.name());
}
