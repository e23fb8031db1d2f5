/// VulkanBuffer - Vulkan implementation of the DeviceBuffer trait

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use lumen_gpu::lumen::device::{BufferDesc, BufferUsage, DeviceBuffer, MemoryLocation};
use lumen_gpu::lumen::Result;
use lumen_gpu::{engine_bail_violation, engine_err, engine_trace};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{buffer_usage_to_vk, memory_location_to_allocator};

pub struct VulkanBuffer {
    ctx: Arc<GpuContext>,
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    usage: BufferUsage,
    location: MemoryLocation,
}

impl VulkanBuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            engine_bail_violation!("lumen::vulkan", "Buffer '{}' must not be empty", desc.label);
        }

        // Device-local buffers are only reached through copies
        let mut usage = buffer_usage_to_vk(desc.usage);
        if desc.location == MemoryLocation::DeviceLocal {
            usage |= vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
        }

        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&create_info, None).map_err(|e| {
                engine_err!("lumen::vulkan", "Failed to create buffer '{}' of {} bytes: {:?}", desc.label, desc.size, e)
            })?;

            let allocation =
                match ctx.allocate_buffer_memory(buffer, &desc.label, memory_location_to_allocator(desc.location)) {
                    Ok(allocation) => allocation,
                    Err(e) => {
                        ctx.device.destroy_buffer(buffer, None);
                        return Err(e);
                    }
                };

            engine_trace!("lumen::vulkan", "Created buffer '{}' ({} bytes, {:?})", desc.label, desc.size, desc.location);

            Ok(Self {
                ctx,
                buffer,
                allocation: Some(allocation),
                size: desc.size,
                usage: desc.usage,
                location: desc.location,
            })
        }
    }

    /// Host pointer at `offset` for `len` bytes, bounds-checked
    fn mapped(&self, offset: u64, len: usize, op: &str) -> Result<*mut u8> {
        if offset + len as u64 > self.size {
            engine_bail_violation!("lumen::vulkan",
                "Buffer {} of {} bytes at offset {} overflows a {}-byte buffer", op, len, offset, self.size);
        }
        let ptr = self
            .allocation
            .as_ref()
            .filter(|_| self.location.is_host_accessible())
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| engine_err!("lumen::vulkan", "Buffer {}: memory is not host-accessible", op))?;
        Ok(unsafe { (ptr.as_ptr() as *mut u8).add(offset as usize) })
    }
}

impl DeviceBuffer for VulkanBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn location(&self) -> MemoryLocation {
        self.location
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let dst = self.mapped(offset, data.len(), "write")?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let src = self.mapped(offset, out.len(), "read")?;
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.ctx.free(allocation);
        }
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
