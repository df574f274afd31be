//! Staging buffers for streaming CPU data to GPU textures.
//!
//! A [`StagingBuffer`] is a uniquely owned block of `Rgba32Float` texels. It is
//! moved, never shared: the producer fills it, hands it to the render thread
//! together with an upload command, and the render thread drops it once the
//! backend has consumed the bytes. Dropping the buffer is the release. Its
//! storage goes back to the owning [`StagingPool`] for reuse, so the steady
//! state allocates nothing per frame.
//!
//! Because release is tied to `Drop`, every buffer is released exactly once on
//! every path: after a successful upload, after a rejected upload, or
//! immediately when a command could not be issued at all.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One `Rgba32Float` texel
pub type Texel = [f32; 4];

/// Upper bound on recycled storage blocks kept around
const MAX_FREE_BLOCKS: usize = 16;

/// Counters describing pool traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StagingStats {
    /// Buffers handed out since the pool was created
    pub acquired: u64,
    /// Buffers dropped (released) since the pool was created
    pub released: u64,
}

impl StagingStats {
    /// Buffers currently owned by someone
    pub fn in_flight(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

#[derive(Default)]
struct PoolShared {
    free: Mutex<Vec<Vec<Texel>>>,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl PoolShared {
    fn release(&self, mut storage: Vec<Texel>) {
        storage.clear();
        {
            let mut free = self.free.lock();
            if free.len() < MAX_FREE_BLOCKS {
                free.push(storage);
            }
        }
        self.released.fetch_add(1, Ordering::AcqRel);
    }
}

/// Recycling allocator for [`StagingBuffer`]s
///
/// Cloning the pool yields another handle to the same storage and counters.
#[derive(Clone, Default)]
pub struct StagingPool {
    shared: Arc<PoolShared>,
}

impl StagingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a zero-filled buffer of `texels` texels.
    ///
    /// Reuses released storage when available. The returned buffer never
    /// aliases storage owned by another live buffer.
    pub fn acquire(&self, texels: usize) -> StagingBuffer {
        let mut storage = self.shared.free.lock().pop().unwrap_or_default();
        storage.clear();
        storage.resize(texels, [0.0; 4]);
        self.shared.acquired.fetch_add(1, Ordering::AcqRel);

        StagingBuffer {
            texels: storage,
            pool: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> StagingStats {
        StagingStats {
            acquired: self.shared.acquired.load(Ordering::Acquire),
            released: self.shared.released.load(Ordering::Acquire),
        }
    }

    /// Number of recycled blocks waiting for reuse
    pub fn free_blocks(&self) -> usize {
        self.shared.free.lock().len()
    }
}

impl fmt::Debug for StagingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingPool")
            .field("stats", &self.stats())
            .field("free_blocks", &self.free_blocks())
            .finish()
    }
}

/// Uniquely owned texel storage destined for a texture upload
pub struct StagingBuffer {
    texels: Vec<Texel>,
    pool: Arc<PoolShared>,
}

impl StagingBuffer {
    pub fn texels(&self) -> &[Texel] {
        &self.texels
    }

    pub fn texels_mut(&mut self) -> &mut [Texel] {
        &mut self.texels
    }

    /// Byte view of the texels, in upload order
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    pub fn len(&self) -> usize {
        self.texels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texels.is_empty()
    }

    pub fn byte_len(&self) -> u64 {
        std::mem::size_of_val(self.texels.as_slice()) as u64
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.texels);
        self.pool.release(storage);
    }
}

impl fmt::Debug for StagingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingBuffer")
            .field("texels", &self.texels.len())
            .finish()
    }
}
