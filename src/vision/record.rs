//! Per-observer vision snapshot and its packed texel layout
//!
//! Source data texture, per slot `i`:
//! - texel `2i`:     (eye.x, eye.y, eye.z, ground.z)
//! - texel `2i + 1`: (forward.x, forward.y, forward.z, 0)
//!
//! Matrix texture, per slot `i`: texels `4i..4i + 4` hold the rows of the
//! row-vector view-projection matrix.

use crate::backend::Texel;
use glam::Vec3;

/// Texels per slot in the source data texture
pub const TEXELS_PER_SOURCE: usize = 2;

/// Texels per slot in the matrix texture
pub const TEXELS_PER_MATRIX: usize = 4;

/// Geometric snapshot of one observer for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionSourceRecord {
    /// World-space origin of sight
    pub eye_position: Vec3,
    /// Unit facing direction
    pub forward: Vec3,
    /// Point under the observer anchoring the proximity footprint
    pub ground_position: Vec3,
}

impl VisionSourceRecord {
    pub fn new(eye_position: Vec3, forward: Vec3, ground_position: Vec3) -> Self {
        Self {
            eye_position,
            forward,
            ground_position,
        }
    }

    pub fn to_texels(&self) -> [Texel; TEXELS_PER_SOURCE] {
        let eye = self.eye_position;
        let forward = self.forward;
        [
            [eye.x, eye.y, eye.z, self.ground_position.z],
            [forward.x, forward.y, forward.z, 0.0],
        ]
    }

    /// Inverse of [`Self::to_texels`].
    ///
    /// Only the ground height is stored; the ground point is taken to lie
    /// straight below the eye, which is where the downward probe puts it.
    pub fn from_texels(texels: &[Texel; TEXELS_PER_SOURCE]) -> Self {
        let [eye, forward] = texels;
        Self {
            eye_position: Vec3::new(eye[0], eye[1], eye[2]),
            forward: Vec3::new(forward[0], forward[1], forward[2]),
            ground_position: Vec3::new(eye[0], eye[1], eye[3]),
        }
    }

    /// Index of the first source texel of `slot`
    pub fn source_texel_index(slot: usize) -> usize {
        slot * TEXELS_PER_SOURCE
    }

    /// Index of the first matrix row of `slot`
    pub fn matrix_texel_index(slot: usize) -> usize {
        slot * TEXELS_PER_MATRIX
    }
}
