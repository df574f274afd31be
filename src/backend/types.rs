//! Common types shared between backends

use glam::Vec3;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba32Float,
    R32Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R32Float | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_DST: Self = Self(1 << 0);
    pub const TEXTURE_BINDING: Self = Self(1 << 1);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 2);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Render target / texture descriptor
#[derive(Debug, Clone)]
pub struct RenderTargetDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl RenderTargetDescriptor {
    /// Depth target written by a scene capture and sampled by the fog shader
    pub fn depth_target(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: Some(label.into()),
            width,
            height,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        }
    }

    /// Single-row float texture filled by CPU uploads
    pub fn data_texture(label: impl Into<String>, texels: u32) -> Self {
        Self {
            label: Some(label.into()),
            width: texels,
            height: 1,
            format: TextureFormat::Rgba32Float,
            usage: TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
        }
    }

    /// Total size of the texture in bytes
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// What a scene capture writes into its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Scene depth only
    Depth,
    /// Final scene color
    Color,
}

/// Projection used by a scene capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProjection {
    Perspective,
    Orthographic,
}

/// Static configuration of a scene capture
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub source: CaptureSource,
    pub projection: CaptureProjection,
    /// When false the capture only runs on explicit `capture_scene` calls
    pub capture_every_frame: bool,
    pub capture_on_movement: bool,
    /// Horizontal field of view in degrees
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl CaptureSettings {
    /// Explicitly driven perspective depth capture
    pub fn depth_perspective(fov_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            source: CaptureSource::Depth,
            projection: CaptureProjection::Perspective,
            capture_every_frame: false,
            capture_on_movement: false,
            fov_degrees,
            near,
            far,
        }
    }
}

/// Viewpoint for a single capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureView {
    pub eye_position: Vec3,
    pub forward: Vec3,
}

/// Destination region of a texture upload
///
/// `bytes_per_row * height` is the exact byte length of the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub byte_offset: u64,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl TextureRegion {
    /// Tightly packed region starting at the first texel
    pub fn packed(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            byte_offset: 0,
            width,
            height,
            bytes_per_row: width * format.bytes_per_pixel(),
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes_per_row as u64 * self.height as u64
    }
}
