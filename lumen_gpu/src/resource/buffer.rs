/// Resource-level GPU buffer with one or two device slots.
///
/// A Buffer owns a host mirror of its contents plus one device allocation
/// per chain slot. Host writes land in the mirror; `set_data*` pushes mirror
/// ranges to a slot through a staging buffer, `transfer` copies one slot into
/// the other on the device, and `get_data*` (modifiable buffers only) reads a
/// slot back into the mirror.
///
/// Architecture:
/// - BufferKind: Vertex, Index, Uniform, Storage or Indirect (fixes usage)
/// - BufferChain: Single (one slot) or Double (Primary + Secondary)
/// - Every slot is `align_up(element_size * element_count, alignment)` bytes
/// - All device copies are synchronous

use std::sync::Arc;
use bytemuck::Pod;
use parking_lot::Mutex;

use crate::device::{BufferDesc, BufferUsage, DeviceBuffer, DeviceLimits, GraphicsDevice, MemoryLocation};
use crate::error::Result;
use crate::{engine_bail_violation, engine_debug, engine_violation};

/// Buffer shared between pools, descriptor sets and pipelines
pub type SharedBuffer = Arc<Mutex<Buffer>>;

// ===== CHAIN / SLOT =====

/// Number of physical device copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferChain {
    Single,
    Double,
}

impl BufferChain {
    pub fn slot_count(&self) -> usize {
        match self {
            BufferChain::Single => 1,
            BufferChain::Double => 2,
        }
    }
}

/// Which physical copy an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    Primary,
    Secondary,
}

impl BufferSlot {
    fn index(&self) -> usize {
        match self {
            BufferSlot::Primary => 0,
            BufferSlot::Secondary => 1,
        }
    }
}

// ===== KIND =====

/// Role of a buffer; decides its device usage and alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
    Storage,
    Indirect,
}

impl BufferKind {
    /// Device usage flags, transfer flags included
    pub fn usage(&self) -> BufferUsage {
        let role = match self {
            BufferKind::Vertex => BufferUsage::VERTEX | BufferUsage::STORAGE,
            BufferKind::Index => BufferUsage::INDEX | BufferUsage::STORAGE,
            // Uniform and storage buffers double as per-instance vertex streams
            BufferKind::Uniform => BufferUsage::UNIFORM | BufferUsage::VERTEX,
            BufferKind::Storage => BufferUsage::STORAGE | BufferUsage::VERTEX,
            BufferKind::Indirect => BufferUsage::INDIRECT | BufferUsage::STORAGE,
        };
        role | BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST
    }

    /// Allocation size alignment for this kind on a device
    pub fn alignment(&self, limits: &DeviceLimits) -> u64 {
        let align = match self {
            BufferKind::Uniform => limits.min_uniform_offset_alignment,
            BufferKind::Storage => limits.min_storage_offset_alignment,
            _ => 4,
        };
        align.max(1)
    }
}

/// Round `value` up to a multiple of `align`
pub fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

// ===== BUFFER INFO =====

/// Shape of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub kind: BufferKind,
    pub chain: BufferChain,
    pub element_size: u64,
    pub element_count: u32,
    /// Allows reading device contents back (`get_data*`)
    pub modifiable: bool,
}

impl BufferInfo {
    pub fn new(kind: BufferKind, chain: BufferChain, element_size: u64, element_count: u32) -> Self {
        Self { kind, chain, element_size, element_count, modifiable: false }
    }

    pub fn modifiable(mut self, modifiable: bool) -> Self {
        self.modifiable = modifiable;
        self
    }

    /// Unpadded byte length of the contents
    pub fn byte_len(&self) -> u64 {
        self.element_size * self.element_count as u64
    }
}

// ===== BUFFER DATA =====

/// One physical slot: a device allocation and its rounded size
#[derive(Clone)]
pub struct BufferData {
    buffer: Arc<dyn DeviceBuffer>,
    size: u64,
    alignment: u64,
}

impl BufferData {
    pub fn device_buffer(&self) -> &Arc<dyn DeviceBuffer> {
        &self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }
}

// ===== BUFFER =====

pub struct Buffer {
    device: Arc<dyn GraphicsDevice>,
    info: BufferInfo,
    slots: Vec<BufferData>,
    host: Vec<u8>,
    host_dirty: bool,
    generation: u64,
}

impl Buffer {
    /// Create a buffer and upload `data` into every slot.
    ///
    /// `data` may be shorter than the buffer (the rest is zero) but not longer.
    pub fn new(device: Arc<dyn GraphicsDevice>, info: BufferInfo, data: &[u8]) -> Result<Self> {
        if info.element_size == 0 || info.element_count == 0 {
            engine_bail_violation!("lumen::Buffer",
                "Buffer must have a non-zero element size and count (got {} x {})",
                info.element_size, info.element_count);
        }
        let byte_len = info.byte_len();
        if data.len() as u64 > byte_len {
            engine_bail_violation!("lumen::Buffer",
                "Initial data ({} bytes) exceeds buffer size ({} bytes)", data.len(), byte_len);
        }

        let mut host = vec![0u8; byte_len as usize];
        host[..data.len()].copy_from_slice(data);

        let alignment = info.kind.alignment(&device.limits());
        let size = align_up(byte_len, alignment);

        let mut slots = Vec::with_capacity(info.chain.slot_count());
        for _ in 0..info.chain.slot_count() {
            slots.push(Self::allocate_slot(device.as_ref(), &info, size, alignment)?);
        }

        let mut buffer = Self {
            device,
            info,
            slots,
            host,
            host_dirty: false,
            generation: 0,
        };

        if !data.is_empty() {
            buffer.set_data(BufferSlot::Primary)?;
            if info.chain == BufferChain::Double {
                buffer.set_data(BufferSlot::Secondary)?;
            }
        }

        engine_debug!("lumen::Buffer", "Created {:?} buffer ({:?}, {} x {} bytes, {} bytes per slot)",
            info.kind, info.chain, info.element_count, info.element_size, size);

        Ok(buffer)
    }

    /// Wrap into a [`SharedBuffer`]
    pub fn into_shared(self) -> SharedBuffer {
        Arc::new(Mutex::new(self))
    }

    fn allocate_slot(
        device: &dyn GraphicsDevice,
        info: &BufferInfo,
        size: u64,
        alignment: u64,
    ) -> Result<BufferData> {
        let buffer = device.create_buffer(&BufferDesc {
            size,
            usage: info.kind.usage(),
            location: MemoryLocation::DeviceLocal,
            label: format!("{:?}", info.kind),
        })?;
        Ok(BufferData { buffer, size, alignment })
    }

    // ===== ACCESSORS =====

    pub fn info(&self) -> &BufferInfo {
        &self.info
    }

    pub fn kind(&self) -> BufferKind {
        self.info.kind
    }

    pub fn chain(&self) -> BufferChain {
        self.info.chain
    }

    pub fn element_size(&self) -> u64 {
        self.info.element_size
    }

    pub fn element_count(&self) -> u32 {
        self.info.element_count
    }

    pub fn is_modifiable(&self) -> bool {
        self.info.modifiable
    }

    /// Device usage flags of every slot
    pub fn usage(&self) -> BufferUsage {
        self.info.kind.usage()
    }

    /// Bytes per slot after alignment
    pub fn aligned_size(&self) -> u64 {
        self.slots.first().map(|s| s.size).unwrap_or(0)
    }

    /// Bumped each time the device allocations are replaced (resize)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the host mirror has writes not yet pushed with a full `set_data`
    pub fn is_host_dirty(&self) -> bool {
        self.host_dirty
    }

    /// Physical slot data
    pub fn slot(&self, slot: BufferSlot) -> Result<&BufferData> {
        self.slots.get(slot.index()).ok_or_else(|| {
            engine_violation!("lumen::Buffer",
                "Slot {:?} does not exist on a {:?} buffer", slot, self.info.chain)
        })
    }

    /// Device allocation of a slot
    pub fn device_buffer(&self, slot: BufferSlot) -> Result<&Arc<dyn DeviceBuffer>> {
        Ok(&self.slot(slot)?.buffer)
    }

    // ===== HOST MIRROR =====

    pub fn host_data(&self) -> &[u8] {
        &self.host
    }

    /// Mutable view of the whole mirror; marks it dirty
    pub fn host_data_mut(&mut self) -> &mut [u8] {
        self.host_dirty = true;
        &mut self.host
    }

    fn element_range(&self, index: u32) -> Result<std::ops::Range<usize>> {
        if index >= self.info.element_count {
            engine_bail_violation!("lumen::Buffer",
                "Element {} out of range (count {})", index, self.info.element_count);
        }
        let start = (index as u64 * self.info.element_size) as usize;
        Ok(start..start + self.info.element_size as usize)
    }

    /// Bytes of one element in the mirror
    pub fn element_bytes(&self, index: u32) -> Result<&[u8]> {
        let range = self.element_range(index)?;
        Ok(&self.host[range])
    }

    /// Overwrite the leading bytes of one element in the mirror
    pub fn write_element(&mut self, index: u32, bytes: &[u8]) -> Result<()> {
        let range = self.element_range(index)?;
        if bytes.len() > range.len() {
            engine_bail_violation!("lumen::Buffer",
                "Element write of {} bytes exceeds element size {}", bytes.len(), range.len());
        }
        self.host[range.start..range.start + bytes.len()].copy_from_slice(bytes);
        self.host_dirty = true;
        Ok(())
    }

    /// Write a plain value at the start of element `index`
    pub fn write_value<T: Pod>(&mut self, index: u32, value: &T) -> Result<()> {
        self.write_element(index, bytemuck::bytes_of(value))
    }

    /// Read a plain value from the start of element `index`
    pub fn read_value<T: Pod>(&self, index: u32) -> Result<T> {
        let bytes = self.element_bytes(index)?;
        let size = std::mem::size_of::<T>();
        if size > bytes.len() {
            engine_bail_violation!("lumen::Buffer",
                "Value of {} bytes does not fit element size {}", size, bytes.len());
        }
        Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
    }

    // ===== UPLOAD =====

    /// Upload the whole mirror into `slot`
    pub fn set_data(&mut self, slot: BufferSlot) -> Result<()> {
        self.set_data_range(slot, 0, self.info.element_count)
    }

    /// Upload the first `count` elements into `slot`
    pub fn set_data_count(&mut self, slot: BufferSlot, count: u32) -> Result<()> {
        self.set_data_range(slot, 0, count)
    }

    /// Upload elements `start..start + count` into the same range of `slot`
    pub fn set_data_range(&mut self, slot: BufferSlot, start: u32, count: u32) -> Result<()> {
        let (offset, size) = self.byte_range(start, count)?;
        let target = Arc::clone(self.device_buffer(slot)?);
        if size == 0 {
            return Ok(());
        }

        // Staging is released when it goes out of scope, on every path
        let staging = self.device.create_buffer(&BufferDesc::staging(size))?;
        staging.write(0, &self.host[offset as usize..(offset + size) as usize])?;
        self.device.copy_buffer(staging.as_ref(), 0, target.as_ref(), offset, size)?;

        if start == 0 && count == self.info.element_count {
            self.host_dirty = false;
        }
        Ok(())
    }

    // ===== READBACK =====

    /// Read the whole of `slot` back into the mirror
    pub fn get_data(&mut self, slot: BufferSlot) -> Result<&[u8]> {
        self.get_data_range(slot, 0, self.info.element_count)
    }

    /// Read the first `count` elements of `slot` back into the mirror
    pub fn get_data_count(&mut self, slot: BufferSlot, count: u32) -> Result<&[u8]> {
        self.get_data_range(slot, 0, count)
    }

    /// Read elements `start..start + count` of `slot` back into the mirror
    pub fn get_data_range(&mut self, slot: BufferSlot, start: u32, count: u32) -> Result<&[u8]> {
        if !self.info.modifiable {
            engine_bail_violation!("lumen::Buffer",
                "get_data on a buffer that was not created modifiable");
        }
        let (offset, size) = self.byte_range(start, count)?;
        let source = Arc::clone(self.device_buffer(slot)?);
        let range = offset as usize..(offset + size) as usize;
        if size == 0 {
            return Ok(&self.host[range]);
        }

        let readback = self.device.create_buffer(&BufferDesc::readback(size))?;
        self.device.copy_buffer(source.as_ref(), offset, readback.as_ref(), 0, size)?;
        readback.read(0, &mut self.host[range.clone()])?;
        Ok(&self.host[range])
    }

    fn byte_range(&self, start: u32, count: u32) -> Result<(u64, u64)> {
        let end = start as u64 + count as u64;
        if end > self.info.element_count as u64 {
            engine_bail_violation!("lumen::Buffer",
                "Range {}..{} exceeds element count {}", start, end, self.info.element_count);
        }
        Ok((start as u64 * self.info.element_size, count as u64 * self.info.element_size))
    }

    // ===== SLOT TRANSFER =====

    /// Copy all of `src` into `dst` on the device
    pub fn transfer(&mut self, src: BufferSlot, dst: BufferSlot) -> Result<()> {
        if self.info.chain != BufferChain::Double {
            engine_bail_violation!("lumen::Buffer", "transfer requires a Double buffer");
        }
        if src == dst {
            engine_bail_violation!("lumen::Buffer", "transfer source and destination are both {:?}", src);
        }
        let src = self.slot(src)?;
        let dst = self.slot(dst)?;
        self.device.copy_buffer(src.buffer.as_ref(), 0, dst.buffer.as_ref(), 0, src.size)
    }

    // ===== RESIZE =====

    /// Reallocate every slot for `new_count` elements, keeping leading contents.
    ///
    /// Descriptor sets bound to the old allocations must be updated again.
    pub fn resize(&mut self, new_count: u32) -> Result<()> {
        if new_count == 0 {
            engine_bail_violation!("lumen::Buffer", "Cannot resize a buffer to zero elements");
        }
        if new_count == self.info.element_count {
            return Ok(());
        }

        let mut new_info = self.info;
        new_info.element_count = new_count;
        let alignment = self.info.kind.alignment(&self.device.limits());
        let new_size = align_up(new_info.byte_len(), alignment);
        let kept = self.info.byte_len().min(new_info.byte_len());

        let mut new_slots = Vec::with_capacity(self.slots.len());
        for old in &self.slots {
            let slot = Self::allocate_slot(self.device.as_ref(), &new_info, new_size, alignment)?;
            if kept > 0 {
                self.device.copy_buffer(old.buffer.as_ref(), 0, slot.buffer.as_ref(), 0, kept)?;
            }
            new_slots.push(slot);
        }

        engine_debug!("lumen::Buffer", "Resized {:?} buffer {} -> {} elements",
            self.info.kind, self.info.element_count, new_count);

        self.slots = new_slots;
        self.host.resize(new_info.byte_len() as usize, 0);
        self.info = new_info;
        self.generation += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
