//! Shader parameter publishing

use crate::backend::TextureHandle;
use glam::Vec4;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Parameter names read by the fog shader
pub mod names {
    pub const ACTIVE_SOURCE_COUNT: &str = "ActiveSourceCount";
    pub const VISION_CONE_COSINE: &str = "VisionConeCosine";
    pub const VISION_DISTANCE: &str = "VisionDistance";
    pub const PROXIMITY_RADIUS: &str = "ProximityRadius";
    pub const PROXIMITY_MAX_HEIGHT: &str = "ProximityMaxHeight";
    /// (cone cosine, vision distance, proximity radius, proximity max height)
    pub const VISION_PARAMS: &str = "VisionParams";
    pub const MAX_SOURCE_COUNT: &str = "MaxSourceCount";
    pub const FOG_ENABLED: &str = "FogEnabled";
    pub const SOURCE_DATA_TEXTURE: &str = "SourceDataTexture";
    pub const SOURCE_MATRIX_TEXTURE: &str = "SourceMatrixTexture";

    pub fn depth_texture(slot: usize) -> String {
        format!("VisionDepthTexture{slot}")
    }
}

/// Named parameter sink, typically a global parameter collection or a material
pub trait ParameterStore: Send + Sync {
    fn set_scalar(&self, name: &str, value: f32);
    fn set_vector(&self, name: &str, value: Vec4);
    fn set_texture_binding(&self, name: &str, texture: TextureHandle);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Scalar(f32),
    Vector(Vec4),
    Texture(TextureHandle),
}

/// Thread-safe map-backed [`ParameterStore`]
#[derive(Debug, Default)]
pub struct InMemoryParameterStore {
    values: RwLock<HashMap<String, ParameterValue>>,
}

impl InMemoryParameterStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        self.values.read().get(name).copied()
    }

    pub fn scalar(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            ParameterValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn vector(&self, name: &str) -> Option<Vec4> {
        match self.get(name)? {
            ParameterValue::Vector(value) => Some(value),
            _ => None,
        }
    }

    pub fn texture(&self, name: &str) -> Option<TextureHandle> {
        match self.get(name)? {
            ParameterValue::Texture(value) => Some(value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    fn set(&self, name: &str, value: ParameterValue) {
        self.values.write().insert(name.to_owned(), value);
    }
}

impl ParameterStore for InMemoryParameterStore {
    fn set_scalar(&self, name: &str, value: f32) {
        self.set(name, ParameterValue::Scalar(value));
    }

    fn set_vector(&self, name: &str, value: Vec4) {
        self.set(name, ParameterValue::Vector(value));
    }

    fn set_texture_binding(&self, name: &str, texture: TextureHandle) {
        self.set(name, ParameterValue::Texture(texture));
    }
}

/// Values published for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionParameters {
    pub active_count: usize,
    pub cone_cosine: f32,
    pub vision_distance: f32,
    pub proximity_radius: f32,
    pub proximity_max_height: f32,
}

impl VisionParameters {
    pub fn new(
        active_count: usize,
        cone_half_angle_degrees: f32,
        vision_distance: f32,
        proximity_radius: f32,
        proximity_max_height: f32,
    ) -> Self {
        Self {
            active_count,
            cone_cosine: cone_cosine(cone_half_angle_degrees),
            vision_distance,
            proximity_radius,
            proximity_max_height,
        }
    }

    /// Packed `VisionParams` vector
    pub fn packed(&self) -> Vec4 {
        Vec4::new(
            self.cone_cosine,
            self.vision_distance,
            self.proximity_radius,
            self.proximity_max_height,
        )
    }

    /// Write every value into `store`
    pub fn publish(&self, store: &dyn ParameterStore) {
        store.set_scalar(names::ACTIVE_SOURCE_COUNT, self.active_count as f32);
        store.set_scalar(names::VISION_CONE_COSINE, self.cone_cosine);
        store.set_scalar(names::VISION_DISTANCE, self.vision_distance);
        store.set_scalar(names::PROXIMITY_RADIUS, self.proximity_radius);
        store.set_scalar(names::PROXIMITY_MAX_HEIGHT, self.proximity_max_height);
        store.set_vector(names::VISION_PARAMS, self.packed());
    }
}

/// Cosine of the cone half-angle, in degrees
pub fn cone_cosine(half_angle_degrees: f32) -> f32 {
    half_angle_degrees.to_radians().cos()
}
