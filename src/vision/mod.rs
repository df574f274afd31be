//! Vision source aggregation: slots, per-tick packing and streaming

pub mod bridge;
pub mod ground;
pub mod packer;
pub mod params;
pub mod pool;
pub mod record;

pub use bridge::{StreamingBridge, SubmitReport, UploadStatus};
pub use ground::GroundProjector;
pub use packer::{FramePacker, PackedFrame};
pub use params::{cone_cosine, names, InMemoryParameterStore, ParameterStore, ParameterValue, VisionParameters};
pub use pool::{Registration, Slot, SourcePool};
pub use record::{VisionSourceRecord, TEXELS_PER_MATRIX, TEXELS_PER_SOURCE};
