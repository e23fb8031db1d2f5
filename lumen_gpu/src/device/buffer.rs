/// Device buffer trait and creation descriptor

use std::any::Any;
use bitflags::bitflags;
use crate::error::Result;

bitflags! {
    /// How a device buffer may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX       = 1 << 0;
        const INDEX        = 1 << 1;
        const UNIFORM      = 1 << 2;
        const STORAGE      = 1 << 3;
        const INDIRECT     = 1 << 4;
        const TRANSFER_SRC = 1 << 5;
        const TRANSFER_DST = 1 << 6;
    }
}

/// Where a device buffer lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// GPU-only memory, reached through staged copies
    DeviceLocal,
    /// Host-writable memory (staging for uploads)
    HostVisible,
    /// Host-readable memory (staging for readbacks)
    HostReadback,
}

impl MemoryLocation {
    /// Whether the host can map this memory
    pub fn is_host_accessible(&self) -> bool {
        !matches!(self, MemoryLocation::DeviceLocal)
    }
}

/// Descriptor for creating a device buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Usage flags
    pub usage: BufferUsage,
    /// Memory location
    pub location: MemoryLocation,
    /// Debug label
    pub label: String,
}

impl BufferDesc {
    /// Host-visible transfer source of `size` bytes
    pub fn staging(size: u64) -> Self {
        Self {
            size,
            usage: BufferUsage::TRANSFER_SRC,
            location: MemoryLocation::HostVisible,
            label: "staging".to_string(),
        }
    }

    /// Host-readable transfer destination of `size` bytes
    pub fn readback(size: u64) -> Self {
        Self {
            size,
            usage: BufferUsage::TRANSFER_DST,
            location: MemoryLocation::HostReadback,
            label: "readback".to_string(),
        }
    }
}

/// A physical device allocation
///
/// Host access through [`write`](DeviceBuffer::write) and
/// [`read`](DeviceBuffer::read) is only valid on host-accessible memory.
/// Device-local buffers are filled with staged copies.
pub trait DeviceBuffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Usage flags the buffer was created with
    fn usage(&self) -> BufferUsage;

    /// Memory location
    fn location(&self) -> MemoryLocation;

    /// Write bytes into host-accessible memory at `offset`
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Read bytes from host-accessible memory at `offset`
    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()>;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}
