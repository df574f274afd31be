//! Per-tick frame packing
//!
//! Walks the occupied slots in order, syncs each capture to its observer,
//! kicks the depth capture and writes the observer's record and
//! view-projection into freshly acquired staging buffers. Slots that cannot
//! be packed stay zero-filled.

use crate::backend::{CaptureView, RenderQueue, StagingBuffer, StagingPool, StagingStats, Texel};
use crate::error::{FogError, FogResult};
use crate::scene::ProjectionBuilder;
use crate::vision::ground::GroundProjector;
use crate::vision::pool::{Slot, SourcePool};
use crate::vision::record::{VisionSourceRecord, TEXELS_PER_MATRIX, TEXELS_PER_SOURCE};
use crate::VisionFogConfig;
use glam::{Mat4, Vec4};

/// Both staging buffers of one tick plus what went into them
#[derive(Debug)]
pub struct PackedFrame {
    source: StagingBuffer,
    matrices: StagingBuffer,
    active_count: usize,
    captured: usize,
}

impl PackedFrame {
    /// Number of occupied slots, including those packed as empty
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Slots whose record and matrix were written this tick
    pub fn captured_count(&self) -> usize {
        self.captured
    }

    pub fn skipped_count(&self) -> usize {
        self.active_count - self.captured
    }

    /// Slot capacity the buffers were sized for
    pub fn capacity(&self) -> usize {
        self.source.len() / TEXELS_PER_SOURCE
    }

    pub fn source_texels(&self) -> &[Texel] {
        self.source.texels()
    }

    pub fn matrix_texels(&self) -> &[Texel] {
        self.matrices.texels()
    }

    pub fn source_record(&self, slot: usize) -> Option<VisionSourceRecord> {
        let base = VisionSourceRecord::source_texel_index(slot);
        let texels = self.source.texels().get(base..base + TEXELS_PER_SOURCE)?;
        Some(VisionSourceRecord::from_texels(&[texels[0], texels[1]]))
    }

    pub fn view_projection(&self, slot: usize) -> Option<Mat4> {
        let base = VisionSourceRecord::matrix_texel_index(slot);
        let rows = self.matrices.texels().get(base..base + TEXELS_PER_MATRIX)?;
        Some(Mat4::from_cols(
            Vec4::from_array(rows[0]),
            Vec4::from_array(rows[1]),
            Vec4::from_array(rows[2]),
            Vec4::from_array(rows[3]),
        ))
    }

    /// Split into (source, matrices) buffers for streaming
    pub fn into_buffers(self) -> (StagingBuffer, StagingBuffer) {
        (self.source, self.matrices)
    }
}

/// Builds a [`PackedFrame`] from a [`SourcePool`] each tick
pub struct FramePacker {
    staging: StagingPool,
    ground: GroundProjector,
    projection: ProjectionBuilder,
    probe_distance: f32,
    capacity: usize,
}

impl FramePacker {
    pub fn new(config: &VisionFogConfig, ground: GroundProjector) -> Self {
        Self {
            staging: StagingPool::new(),
            ground,
            projection: ProjectionBuilder::new(
                config.vision_angle_degrees,
                config.aspect_ratio(),
                config.near_plane,
                config.vision_distance,
            ),
            probe_distance: config.ground_probe_distance(),
            capacity: config.max_team_size,
        }
    }

    pub fn staging_stats(&self) -> StagingStats {
        self.staging.stats()
    }

    pub fn projection(&self) -> &ProjectionBuilder {
        &self.projection
    }

    pub fn pack_frame(&self, pool: &mut SourcePool) -> PackedFrame {
        let mut source = self.staging.acquire(self.capacity * TEXELS_PER_SOURCE);
        let mut matrices = self.staging.acquire(self.capacity * TEXELS_PER_MATRIX);
        let mut active_count = 0;
        let mut captured = 0;

        let (render, slots) = pool.split_mut();
        for slot in slots.iter_mut().take(self.capacity) {
            if !slot.is_occupied() {
                continue;
            }
            active_count += 1;

            match self.pack_slot(render, slot) {
                Ok((record, view_projection)) => {
                    let base = VisionSourceRecord::source_texel_index(slot.index());
                    source.texels_mut()[base..base + TEXELS_PER_SOURCE]
                        .copy_from_slice(&record.to_texels());

                    let base = VisionSourceRecord::matrix_texel_index(slot.index());
                    let rows = ProjectionBuilder::rows(&view_projection).map(|row| row.to_array());
                    matrices.texels_mut()[base..base + TEXELS_PER_MATRIX].copy_from_slice(&rows);
                    captured += 1;
                }
                Err(err) => {
                    log::debug!("Packing slot {} as empty: {err}", slot.index());
                }
            }
        }

        PackedFrame {
            source,
            matrices,
            active_count,
            captured,
        }
    }

    fn pack_slot(&self, render: &RenderQueue, slot: &mut Slot) -> FogResult<(VisionSourceRecord, Mat4)> {
        if !render.is_texture_ready(slot.target()) || !render.is_capture_ready(slot.capture()) {
            return Err(FogError::ResourceUnavailable(format!(
                "capture target of slot {} is not ready",
                slot.index()
            )));
        }

        let observer = slot
            .observer()
            .ok_or_else(|| FogError::ResourceUnavailable(format!("slot {} is empty", slot.index())))?;
        let pose = observer.pose().ok_or_else(|| {
            FogError::ResourceUnavailable(format!("observer {} is no longer valid", observer.name()))
        })?;
        let view_projection = self.projection.build_checked(pose.eye_position, pose.forward)?;
        let forward = pose.forward.normalize();

        let view = CaptureView {
            eye_position: pose.eye_position,
            forward,
        };
        slot.sync_view(view);

        let ground = self.ground.project(view.eye_position, self.probe_distance);
        render.capture_scene(slot.capture(), view)?;

        Ok((VisionSourceRecord::new(view.eye_position, forward, ground), view_projection))
    }
}
