//! Camera projection for vision captures
//!
//! Conventions: world up is +Z, view space is left-handed with +Z along the
//! facing direction, and depth is reversed (near plane maps to 1, far plane
//! to 0). Matrices are stored as column-vector `glam` matrices; the
//! row-vector product `View × Projection` used by the shaders is the same
//! transform as `projection * view` here, and its rows are this matrix's
//! columns.

use crate::error::{FogError, FogResult};
use glam::{Mat4, Vec3, Vec4};

/// World up axis
pub const WORLD_UP: Vec3 = Vec3::Z;

/// Lens parameters shared by every observer's projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionBuilder {
    /// Horizontal field of view in degrees
    pub horizontal_fov_degrees: f32,
    /// Width over height of the capture target
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl ProjectionBuilder {
    pub fn new(horizontal_fov_degrees: f32, aspect_ratio: f32, near: f32, far: f32) -> Self {
        Self {
            horizontal_fov_degrees,
            aspect_ratio,
            near,
            far,
        }
    }

    /// Vertical field of view (radians) that keeps the horizontal extent
    pub fn vertical_fov(horizontal_fov: f32, aspect_ratio: f32) -> f32 {
        2.0 * ((horizontal_fov * 0.5).tan() / aspect_ratio).atan()
    }

    /// Left-handed "look from" view matrix.
    ///
    /// Orients the camera along `forward` directly; `forward` is a direction,
    /// not a target point, and must be normalised by the caller.
    pub fn view_matrix(eye_position: Vec3, forward: Vec3) -> Mat4 {
        // Looking straight up or down leaves WORLD_UP parallel to the view axis
        let up = if WORLD_UP.cross(forward).length_squared() > f32::EPSILON {
            WORLD_UP
        } else {
            Vec3::X
        };
        Mat4::look_to_lh(eye_position, forward, up)
    }

    /// Reversed-Z perspective projection
    pub fn reversed_z_perspective(fov_y: f32, aspect_ratio: f32, near: f32, far: f32) -> Mat4 {
        let focal = 1.0 / (0.5 * fov_y).tan();
        let range = near / (near - far);

        Mat4::from_cols(
            Vec4::new(focal / aspect_ratio, 0.0, 0.0, 0.0),
            Vec4::new(0.0, focal, 0.0, 0.0),
            Vec4::new(0.0, 0.0, range, 1.0),
            Vec4::new(0.0, 0.0, -range * far, 0.0),
        )
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let fov_y = Self::vertical_fov(self.horizontal_fov_degrees.to_radians(), self.aspect_ratio);
        Self::reversed_z_perspective(fov_y, self.aspect_ratio, self.near, self.far)
    }

    /// View-projection for one observer.
    ///
    /// Does not validate its inputs: `forward` must be unit length and the
    /// aspect ratio positive. See [`Self::build_checked`].
    pub fn build(&self, eye_position: Vec3, forward: Vec3) -> Mat4 {
        self.projection_matrix() * Self::view_matrix(eye_position, forward)
    }

    /// [`Self::build`] after rejecting a zero-length forward vector or a
    /// non-positive aspect ratio. `forward` is normalised here.
    pub fn build_checked(&self, eye_position: Vec3, forward: Vec3) -> FogResult<Mat4> {
        if !(self.aspect_ratio > 0.0) {
            return Err(FogError::InvalidProjectionInput(format!(
                "aspect ratio {}",
                self.aspect_ratio
            )));
        }
        let forward = forward.try_normalize().ok_or_else(|| {
            FogError::InvalidProjectionInput(format!("forward vector {forward}"))
        })?;
        Ok(self.build(eye_position, forward))
    }

    /// Rows of the row-vector matrix, in upload order
    pub fn rows(view_projection: &Mat4) -> [Vec4; 4] {
        [
            view_projection.x_axis,
            view_projection.y_axis,
            view_projection.z_axis,
            view_projection.w_axis,
        ]
    }
}
