use std::sync::{Arc, RwLock};

use crate::{DeviceError, Result};

/// Granularity of frame buffer allocation and mapping.
pub const PAGE_SIZE: usize = 4096;

/// Unpadded byte size of one video frame: width x height x whole bytes per
/// pixel. Depth is integer-divided by 8, so sub-byte depths contribute their
/// truncated byte count.
pub fn frame_bytes(width: u32, height: u32, depth: u32) -> Result<u64> {
    let pixels = u64::from(width) * u64::from(height);
    pixels
        .checked_mul(u64::from(depth / 8))
        .ok_or(DeviceError::FrameSizeOverflow)
}

/// Rounds `bytes` up to the smallest multiple of [`PAGE_SIZE`].
pub fn page_round_up(bytes: u64) -> Result<u64> {
    let page = PAGE_SIZE as u64;
    let rem = bytes % page;
    if rem == 0 {
        return Ok(bytes);
    }
    bytes
        .checked_add(page - rem)
        .ok_or(DeviceError::FrameSizeOverflow)
}

/// One generation of a slot's backing storage.
///
/// The slot owns the current generation; mappings hold clones of the `Arc`.
/// Replacing the buffer on a geometry change bumps the generation, so a
/// mapping taken before the change stays alive but is detectable as stale via
/// [`FrameMapping::generation`].
#[derive(Debug)]
pub struct FrameBuffer {
    generation: u64,
    len: usize,
    bytes: RwLock<Box<[u8]>>,
}

impl FrameBuffer {
    /// Allocates `len` zeroed bytes, failing (rather than aborting) when the
    /// allocator cannot satisfy the request.
    pub(crate) fn allocate(generation: u64, len: usize) -> Result<Arc<Self>> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(len)
            .map_err(|_| DeviceError::AllocationFailed { bytes: len as u64 })?;
        storage.resize(len, 0);
        Ok(Arc::new(Self {
            generation,
            len,
            bytes: RwLock::new(storage.into_boxed_slice()),
        }))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Copies the first `out.len()` bytes of the frame into `out`.
    ///
    /// The caller validates `out.len() <= self.len()` under the slot lock.
    pub(crate) fn read_prefix(&self, out: &mut [u8]) {
        let bytes = self.bytes.read().unwrap();
        out.copy_from_slice(&bytes[..out.len()]);
    }

    /// Overwrites the first `data.len()` bytes of the frame.
    ///
    /// The caller validates `data.len() <= self.len()` under the slot lock.
    pub(crate) fn write_prefix(&self, data: &[u8]) {
        let mut bytes = self.bytes.write().unwrap();
        bytes[..data.len()].copy_from_slice(data);
    }
}

/// A shared mapping of a slot's frame buffer.
///
/// The mapping keeps its generation's storage alive independently of the
/// slot: after a geometry change the slot swaps in a new generation while
/// this mapping keeps addressing the old bytes. Callers that must not
/// observe stale frames compare [`FrameMapping::generation`] against the
/// slot's current buffer generation.
#[derive(Clone, Debug)]
pub struct FrameMapping {
    buffer: Arc<FrameBuffer>,
    len: usize,
}

impl FrameMapping {
    pub(crate) fn new(buffer: Arc<FrameBuffer>, len: usize) -> Self {
        Self { buffer, len }
    }

    /// Mapped length in bytes; at most the buffer length at mapping time.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Generation of the storage this mapping addresses.
    pub fn generation(&self) -> u64 {
        self.buffer.generation()
    }

    /// Reads `out.len()` bytes starting at `offset`.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let end = self.checked_span(offset, out.len())?;
        let bytes = self.buffer.bytes.read().unwrap();
        out.copy_from_slice(&bytes[offset..end]);
        Ok(())
    }

    /// Writes `data` starting at `offset`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        let end = self.checked_span(offset, data.len())?;
        let mut bytes = self.buffer.bytes.write().unwrap();
        bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn checked_span(&self, offset: usize, len: usize) -> Result<usize> {
        offset
            .checked_add(len)
            .filter(|&end| end <= self.len)
            .ok_or(DeviceError::FrameOverrun {
                requested: offset.saturating_add(len),
                capacity: self.len,
            })
    }
}
