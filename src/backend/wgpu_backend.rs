//! wgpu backend implementation
//!
//! Runs on a headless device (no surface). Depth captures clear the target to
//! the reversed-Z far value; drawing scene geometry into the target is left to
//! the host renderer sharing the device.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;

struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: RenderTargetDescriptor,
}

struct GpuCapture {
    target: TextureHandle,
    settings: CaptureSettings,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    targets: HashMap<u64, GpuTarget>,
    captures: HashMap<u64, GpuCapture>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    /// Create a backend on the default adapter without a surface (blocking)
    pub fn new_headless() -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async())
    }

    pub async fn new_headless_async() -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Vision Fog Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            targets: HashMap::new(),
            captures: HashMap::new(),
        })
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Texture view of a render target, for binding into host materials
    pub fn texture_view(&self, texture: TextureHandle) -> Option<&wgpu::TextureView> {
        self.targets.get(&texture.0).map(|t| &t.view)
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn allocate_render_target(
        &mut self,
        handle: TextureHandle,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<()> {
        let max_size = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max_size || desc.height > max_size {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: {}x{} outside device limits (max {max_size})",
                desc.label, desc.width, desc.height
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.targets.insert(
            handle.0,
            GpuTarget {
                texture,
                view,
                desc: desc.clone(),
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
        let gpu_target = self
            .targets
            .get(&target.0)
            .ok_or(BackendError::InvalidTexture(target))?;
        if !gpu_target.desc.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            return Err(BackendError::InvalidTexture(target));
        }

        self.captures.insert(
            handle.0,
            GpuCapture {
                target,
                settings: settings.clone(),
            },
        );
        Ok(())
    }

    fn capture_scene(&mut self, capture: CaptureHandle, view: &CaptureView) -> BackendResult<()> {
        let entry = self
            .captures
            .get(&capture.0)
            .ok_or(BackendError::InvalidCapture(capture))?;
        let target = self
            .targets
            .get(&entry.target.0)
            .ok_or(BackendError::InvalidTexture(entry.target))?;

        log::trace!(
            "Capturing {capture:?} from {:?} along {:?} ({:?})",
            view.eye_position,
            view.forward,
            entry.settings.source
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Vision Capture Encoder"),
            });

        {
            let (color_attachments, depth_attachment) = if target.desc.format.is_depth() {
                (
                    vec![],
                    Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &target.view,
                        depth_ops: Some(wgpu::Operations {
                            // Reversed-Z: far plane is 0.0
                            load: wgpu::LoadOp::Clear(0.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                )
            } else {
                (
                    vec![Some(wgpu::RenderPassColorAttachment {
                        view: &target.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    None,
                )
            };

            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Vision Capture"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn upload_texture_region(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
        bytes: &[u8],
    ) -> BackendResult<()> {
        let target = self
            .targets
            .get(&texture.0)
            .ok_or(BackendError::InvalidTexture(texture))?;

        let bpp = target.desc.format.bytes_per_pixel() as u64;
        let pitch = target.desc.width as u64 * bpp;
        let capacity = target.desc.byte_size();
        let len = region.byte_len();
        let x = (region.byte_offset % pitch) / bpp;
        let y = region.byte_offset / pitch;
        if len == 0
            || bytes.len() as u64 != len
            || x + region.width as u64 > target.desc.width as u64
            || y + region.height as u64 > target.desc.height as u64
        {
            return Err(BackendError::UploadOutOfBounds {
                offset: region.byte_offset,
                len: bytes.len() as u64,
                capacity,
            });
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: x as u32,
                    y: y as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(region.bytes_per_row),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(target) = self.targets.remove(&texture.0) {
            target.texture.destroy();
        }
        self.captures.retain(|_, capture| capture.target != texture);
    }

    fn destroy_capture(&mut self, capture: CaptureHandle) {
        self.captures.remove(&capture.0);
    }
}
