//! Headless backend keeping all resources in CPU memory.
//!
//! Used by tests and the headless demo. Texture contents can be read back at
//! any time through a [`HeadlessInspector`], which stays valid after the
//! backend itself moved onto the render thread.

use crate::backend::staging::Texel;
use crate::backend::traits::*;
use crate::backend::types::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct HeadlessTexture {
    desc: RenderTargetDescriptor,
    data: Vec<u8>,
}

struct HeadlessCapture {
    target: TextureHandle,
    settings: CaptureSettings,
    last_view: Option<CaptureView>,
    count: u64,
}

#[derive(Default)]
struct HeadlessState {
    textures: HashMap<u64, HeadlessTexture>,
    captures: HashMap<u64, HeadlessCapture>,
    capture_count: u64,
    upload_count: u64,
}

/// CPU-memory render backend
#[derive(Default)]
pub struct HeadlessBackend {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the backend state, usable from any thread
    pub fn inspector(&self) -> HeadlessInspector {
        HeadlessInspector {
            state: Arc::clone(&self.state),
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless"
    }

    fn allocate_render_target(
        &mut self,
        handle: TextureHandle,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<()> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        let data = vec![0u8; desc.byte_size() as usize];
        self.state.lock().textures.insert(
            handle.0,
            HeadlessTexture {
                desc: desc.clone(),
                data,
            },
        );
        Ok(())
    }

    fn create_capture(
        &mut self,
        handle: CaptureHandle,
        target: TextureHandle,
        settings: &CaptureSettings,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        if !state.textures.contains_key(&target.0) {
            return Err(BackendError::InvalidTexture(target));
        }
        state.captures.insert(
            handle.0,
            HeadlessCapture {
                target,
                settings: settings.clone(),
                last_view: None,
                count: 0,
            },
        );
        Ok(())
    }

    fn capture_scene(&mut self, capture: CaptureHandle, view: &CaptureView) -> BackendResult<()> {
        let mut state = self.state.lock();
        let target = state
            .captures
            .get(&capture.0)
            .map(|c| c.target)
            .ok_or(BackendError::InvalidCapture(capture))?;
        let texture = state
            .textures
            .get_mut(&target.0)
            .ok_or(BackendError::InvalidTexture(target))?;

        // No scene geometry: the capture leaves the reversed-Z far value (0.0).
        texture.data.fill(0);

        if let Some(entry) = state.captures.get_mut(&capture.0) {
            entry.last_view = Some(*view);
            entry.count += 1;
        }
        state.capture_count += 1;
        Ok(())
    }

    fn upload_texture_region(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
        bytes: &[u8],
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .textures
            .get_mut(&texture.0)
            .ok_or(BackendError::InvalidTexture(texture))?;

        let capacity = entry.data.len() as u64;
        let len = region.byte_len();
        if len == 0 || bytes.len() as u64 != len || region.byte_offset + len > capacity {
            return Err(BackendError::UploadOutOfBounds {
                offset: region.byte_offset,
                len: bytes.len() as u64,
                capacity,
            });
        }

        let pitch = entry.desc.width as usize * entry.desc.format.bytes_per_pixel() as usize;
        let row_len = region.bytes_per_row as usize;
        for (row, src) in bytes.chunks_exact(row_len).enumerate() {
            let start = region.byte_offset as usize + row * pitch;
            let Some(dst) = entry.data.get_mut(start..start + row_len) else {
                return Err(BackendError::UploadOutOfBounds {
                    offset: start as u64,
                    len: row_len as u64,
                    capacity,
                });
            };
            dst.copy_from_slice(src);
        }
        state.upload_count += 1;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        let mut state = self.state.lock();
        state.textures.remove(&texture.0);
        state.captures.retain(|_, capture| capture.target != texture);
    }

    fn destroy_capture(&mut self, capture: CaptureHandle) {
        self.state.lock().captures.remove(&capture.0);
    }
}

/// Thread-safe read access to a [`HeadlessBackend`]
#[derive(Clone)]
pub struct HeadlessInspector {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessInspector {
    pub fn texture_bytes(&self, texture: TextureHandle) -> Option<Vec<u8>> {
        self.state
            .lock()
            .textures
            .get(&texture.0)
            .map(|t| t.data.clone())
    }

    /// Contents of an `Rgba32Float` texture
    pub fn texture_texels(&self, texture: TextureHandle) -> Option<Vec<Texel>> {
        let state = self.state.lock();
        let entry = state.textures.get(&texture.0)?;
        if entry.desc.format != TextureFormat::Rgba32Float {
            return None;
        }
        Some(bytemuck::pod_collect_to_vec(&entry.data))
    }

    pub fn texture_count(&self) -> usize {
        self.state.lock().textures.len()
    }

    /// Capture resources currently alive
    pub fn capture_resource_count(&self) -> usize {
        self.state.lock().captures.len()
    }

    pub fn capture_count(&self) -> u64 {
        self.state.lock().capture_count
    }

    pub fn upload_count(&self) -> u64 {
        self.state.lock().upload_count
    }

    /// Number of captures executed by one capture resource
    pub fn captures_of(&self, capture: CaptureHandle) -> u64 {
        self.state
            .lock()
            .captures
            .get(&capture.0)
            .map_or(0, |c| c.count)
    }

    pub fn last_view(&self, capture: CaptureHandle) -> Option<CaptureView> {
        self.state
            .lock()
            .captures
            .get(&capture.0)
            .and_then(|c| c.last_view)
    }

    pub fn capture_settings(&self, capture: CaptureHandle) -> Option<CaptureSettings> {
        self.state
            .lock()
            .captures
            .get(&capture.0)
            .map(|c| c.settings.clone())
    }
}
