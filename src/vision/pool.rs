//! Fixed-capacity pool of vision source slots

use crate::backend::{
    CaptureHandle, CaptureSettings, CaptureView, RenderQueue, RenderTargetDescriptor, ResourceStatus,
    TextureHandle,
};
use crate::error::{FogError, FogResult};
use crate::scene::ObserverHandle;
use crate::MAX_SUPPORTED_TEAM_SIZE;

/// One slot: a depth target, the capture rendering into it and the
/// observer currently assigned to it
pub struct Slot {
    index: usize,
    target: TextureHandle,
    capture: CaptureHandle,
    observer: Option<ObserverHandle>,
    view: Option<CaptureView>,
}

impl Slot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn target(&self) -> TextureHandle {
        self.target
    }

    pub fn capture(&self) -> CaptureHandle {
        self.capture
    }

    pub fn is_occupied(&self) -> bool {
        self.observer.is_some()
    }

    pub fn observer(&self) -> Option<&ObserverHandle> {
        self.observer.as_ref()
    }

    /// Viewpoint the capture was last synced to
    pub fn view(&self) -> Option<CaptureView> {
        self.view
    }

    pub(crate) fn sync_view(&mut self, view: CaptureView) {
        self.view = Some(view);
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("index", &self.index)
            .field("target", &self.target)
            .field("capture", &self.capture)
            .field("observer", &self.observer.as_ref().map(|o| o.name().to_owned()))
            .field("view", &self.view)
            .finish()
    }
}

/// Outcome of [`SourcePool::register_sources`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub registered: usize,
    /// Observers past capacity that were not assigned a slot
    pub dropped: usize,
}

impl Registration {
    /// The truncation as an error value, if any observer was dropped
    pub fn overflow(&self) -> Option<FogError> {
        (self.dropped > 0).then(|| FogError::CapacityExceeded {
            requested: self.registered + self.dropped,
            capacity: self.registered,
        })
    }
}

/// Slot pool. Slot resources are allocated once and live as long as the pool.
pub struct SourcePool {
    render: RenderQueue,
    slots: Vec<Slot>,
}

impl SourcePool {
    /// Allocate `capacity` depth targets of `resolution` and one explicitly
    /// driven capture per target.
    pub fn initialize(
        render: RenderQueue,
        capacity: usize,
        resolution: (u32, u32),
        settings: CaptureSettings,
    ) -> FogResult<Self> {
        if capacity == 0 || capacity > MAX_SUPPORTED_TEAM_SIZE {
            return Err(FogError::InvalidConfig(format!(
                "slot capacity must be in 1..={MAX_SUPPORTED_TEAM_SIZE}, got {capacity}"
            )));
        }

        let (width, height) = resolution;
        let mut slots = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let target = render.allocate_render_target(RenderTargetDescriptor::depth_target(
                format!("VisionDepth{index}"),
                width,
                height,
            ))?;
            let capture = render.create_capture(target, settings.clone())?;
            slots.push(Slot {
                index,
                target,
                capture,
                observer: None,
                view: None,
            });
        }

        log::debug!("Allocated {capacity} vision slots at {width}x{height}");
        Ok(Self { render, slots })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_occupied()).count()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn render_queue(&self) -> &RenderQueue {
        &self.render
    }

    pub(crate) fn split_mut(&mut self) -> (&RenderQueue, &mut [Slot]) {
        (&self.render, &mut self.slots)
    }

    /// Assign `observers` to slots `0..n` in order, replacing any previous
    /// assignment. Observers beyond capacity are dropped with one warning.
    pub fn register_sources(&mut self, observers: &[ObserverHandle]) -> Registration {
        self.deregister_all();

        let capacity = self.capacity();
        let registered = observers.len().min(capacity);
        let dropped = observers.len() - registered;
        if dropped > 0 {
            log::warn!(
                "{} vision sources registered but only {capacity} slots available, dropping {dropped}",
                observers.len()
            );
        }

        for (slot, observer) in self.slots.iter_mut().zip(observers) {
            slot.observer = Some(observer.clone());
        }

        log::debug!("Registered {registered} vision sources");
        Registration { registered, dropped }
    }

    /// Clear every slot. Slot resources are kept.
    pub fn deregister_all(&mut self) {
        for slot in &mut self.slots {
            slot.observer = None;
            slot.view = None;
        }
    }

    /// Worst status across all slot targets and captures
    pub fn resource_status(&self) -> ResourceStatus {
        let mut status = ResourceStatus::Ready;
        for slot in &self.slots {
            for current in [
                self.render.texture_status(slot.target),
                self.render.capture_status(slot.capture),
            ] {
                match current {
                    Some(ResourceStatus::Ready) => {}
                    Some(ResourceStatus::Pending) => status = ResourceStatus::Pending,
                    Some(ResourceStatus::Failed) | None => return ResourceStatus::Failed,
                }
            }
        }
        status
    }

    /// Release every slot capture and target on the render thread
    pub fn destroy(self) {
        for slot in &self.slots {
            if let Err(err) = self.render.destroy_capture(slot.capture) {
                log::debug!("Could not destroy slot {} capture: {err}", slot.index);
            }
            if let Err(err) = self.render.destroy_texture(slot.target) {
                log::debug!("Could not destroy slot {} target: {err}", slot.index);
            }
        }
    }
}

impl std::fmt::Debug for SourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePool").field("slots", &self.slots).finish()
    }
}
