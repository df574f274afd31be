//! Hand-off of packed frames to the render thread

use crate::backend::{
    RenderQueue, RenderTargetDescriptor, ResourceStatus, StagingBuffer, TextureFormat, TextureHandle,
    TextureRegion,
};
use crate::error::{FogError, FogResult};
use crate::vision::packer::PackedFrame;
use crate::vision::record::{TEXELS_PER_MATRIX, TEXELS_PER_SOURCE};

/// What happened to one staging buffer on submit
#[derive(Debug, Clone, PartialEq)]
pub enum UploadStatus {
    /// Moved into the render queue; released once the upload ran
    Queued,
    /// Not issued; the buffer was released before `submit` returned
    Released(FogError),
}

impl UploadStatus {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReport {
    pub source: UploadStatus,
    pub matrices: UploadStatus,
}

impl SubmitReport {
    pub fn all_queued(&self) -> bool {
        self.source.is_queued() && self.matrices.is_queued()
    }
}

/// Streams packed frames into the source data and matrix textures
#[derive(Clone)]
pub struct StreamingBridge {
    render: RenderQueue,
    source_texture: TextureHandle,
    matrix_texture: TextureHandle,
}

impl StreamingBridge {
    pub fn new(render: RenderQueue, source_texture: TextureHandle, matrix_texture: TextureHandle) -> Self {
        Self {
            render,
            source_texture,
            matrix_texture,
        }
    }

    /// Request both data textures sized for `capacity` slots
    pub fn allocate(render: RenderQueue, capacity: usize) -> FogResult<Self> {
        let source_texture = render.allocate_render_target(RenderTargetDescriptor::data_texture(
            "SourceDataTexture",
            (capacity * TEXELS_PER_SOURCE) as u32,
        ))?;
        let matrix_texture = render.allocate_render_target(RenderTargetDescriptor::data_texture(
            "SourceMatrixTexture",
            (capacity * TEXELS_PER_MATRIX) as u32,
        ))?;
        Ok(Self::new(render, source_texture, matrix_texture))
    }

    pub fn source_texture(&self) -> TextureHandle {
        self.source_texture
    }

    pub fn matrix_texture(&self) -> TextureHandle {
        self.matrix_texture
    }

    /// Worst status of the two data textures
    pub fn resource_status(&self) -> ResourceStatus {
        let statuses = [
            self.render.texture_status(self.source_texture),
            self.render.texture_status(self.matrix_texture),
        ];
        if statuses.iter().any(|s| matches!(s, Some(ResourceStatus::Failed) | None)) {
            ResourceStatus::Failed
        } else if statuses.iter().all(|s| *s == Some(ResourceStatus::Ready)) {
            ResourceStatus::Ready
        } else {
            ResourceStatus::Pending
        }
    }

    /// Queue one upload per buffer. Ownership of both buffers leaves the
    /// caller; each is released exactly once, now or on the render thread.
    pub fn submit(&self, frame: PackedFrame) -> SubmitReport {
        let (source, matrices) = frame.into_buffers();
        SubmitReport {
            source: self.stream(self.source_texture, source),
            matrices: self.stream(self.matrix_texture, matrices),
        }
    }

    fn stream(&self, texture: TextureHandle, data: StagingBuffer) -> UploadStatus {
        if !self.render.is_texture_ready(texture) {
            log::debug!("Texture {texture:?} not ready, dropping {} byte upload", data.byte_len());
            return UploadStatus::Released(FogError::ResourceUnavailable(format!(
                "texture {} is not ready",
                texture.id()
            )));
        }

        let region = TextureRegion::packed(data.len() as u32, 1, TextureFormat::Rgba32Float);
        match self.render.upload_texture_region(texture, region, data) {
            Ok(()) => UploadStatus::Queued,
            Err(err) => {
                log::warn!("Upload to {texture:?} not issued: {err}");
                UploadStatus::Released(err.into())
            }
        }
    }

    /// Release both data textures on the render thread
    pub fn destroy(self) {
        for texture in [self.source_texture, self.matrix_texture] {
            if let Err(err) = self.render.destroy_texture(texture) {
                log::debug!("Could not destroy data texture {texture:?}: {err}");
            }
        }
    }
}
