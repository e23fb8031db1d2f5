/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Every Vulkan resource keeps an `Arc<GpuContext>`, so the device and
/// instance are only destroyed once the last resource is gone.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use lumen_gpu::lumen::{Error, Result};
use lumen_gpu::{engine_err, engine_error};
use parking_lot::Mutex;
use std::mem::ManuallyDrop;

pub struct GpuContext {
    /// Kept alive for the lifetime of the instance
    _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,

    /// Dropped manually, before the device is destroyed
    allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue; the lock serializes every submission
    queue: Mutex<vk::Queue>,
    pub(crate) queue_family: u32,

    /// Command pool for one-shot transfers
    /// (created with TRANSIENT + RESET_COMMAND_BUFFER flags)
    upload_pool: Mutex<vk::CommandPool>,

    /// Linear repeat sampler used for every sampled image binding
    pub(crate) default_sampler: vk::Sampler,

    #[cfg(feature = "vulkan-validation")]
    pub(crate) debug_messenger: Option<crate::debug::DebugMessenger>,
}

impl GpuContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        queue: vk::Queue,
        queue_family: u32,
        upload_pool: vk::CommandPool,
        default_sampler: vk::Sampler,
        #[cfg(feature = "vulkan-validation")] debug_messenger: Option<crate::debug::DebugMessenger>,
    ) -> Self {
        Self {
            _entry: entry,
            instance,
            physical_device,
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue: Mutex::new(queue),
            queue_family,
            upload_pool: Mutex::new(upload_pool),
            default_sampler,
            #[cfg(feature = "vulkan-validation")]
            debug_messenger,
        }
    }

    /// Allocate and bind memory for `buffer`
    pub(crate) fn allocate_buffer_memory(
        &self,
        buffer: vk::Buffer,
        name: &str,
        location: MemoryLocation,
    ) -> Result<Allocation> {
        unsafe {
            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = self.allocate(name, requirements, location, true)?;
            if let Err(e) = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                return Err(engine_err!("lumen::vulkan", "Failed to bind buffer memory: {:?}", e));
            }
            Ok(allocation)
        }
    }

    /// Allocate and bind device-local memory for `image`
    pub(crate) fn allocate_image_memory(&self, image: vk::Image, name: &str) -> Result<Allocation> {
        unsafe {
            let requirements = self.device.get_image_memory_requirements(image);
            let allocation = self.allocate(name, requirements, MemoryLocation::GpuOnly, false)?;
            if let Err(e) = self.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                return Err(engine_err!("lumen::vulkan", "Failed to bind image memory: {:?}", e));
            }
            Ok(allocation)
        }
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                engine_error!("lumen::vulkan", "Out of GPU memory for {} ({:.2} MB): {}", name, size_mb, e);
                Error::OutOfMemory
            })
    }

    pub(crate) fn free(&self, allocation: Allocation) {
        if let Err(e) = self.allocator.lock().free(allocation) {
            engine_error!("lumen::vulkan", "Failed to free GPU allocation: {}", e);
        }
    }

    /// Submit `command_buffer` and block on `fence`
    pub(crate) fn submit_and_wait(&self, command_buffer: vk::CommandBuffer, fence: vk::Fence) -> Result<()> {
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .reset_fences(&[fence])
                .map_err(|e| engine_err!("lumen::vulkan", "submit: failed to reset fence: {:?}", e))?;
            {
                let queue = self.queue.lock();
                self.device
                    .queue_submit(*queue, &[submit_info], fence)
                    .map_err(|e| engine_err!("lumen::vulkan", "submit: failed to submit queue: {:?}", e))?;
            }
            self.device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| engine_err!("lumen::vulkan", "submit: failed to wait for fence: {:?}", e))
        }
    }

    /// Record a one-shot command buffer with `record`, submit it and wait for the queue
    pub(crate) fn one_shot(&self, record: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> Result<()> {
        let pool = self.upload_pool.lock();
        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = self
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!("lumen::vulkan", "Failed to allocate upload command buffer: {:?}", e))?[0];

            let result = self.record_and_wait(command_buffer, record);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn record_and_wait(
        &self,
        command_buffer: vk::CommandBuffer,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| engine_err!("lumen::vulkan", "Failed to begin upload command buffer: {:?}", e))?;

        record(&self.device, command_buffer);

        self.device
            .end_command_buffer(command_buffer)
            .map_err(|e| engine_err!("lumen::vulkan", "Failed to end upload command buffer: {:?}", e))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let queue = self.queue.lock();
        self.device
            .queue_submit(*queue, &[submit_info], vk::Fence::null())
            .map_err(|e| engine_err!("lumen::vulkan", "Failed to submit upload commands: {:?}", e))?;
        self.device
            .queue_wait_idle(*queue)
            .map_err(|e| engine_err!("lumen::vulkan", "Failed to wait for upload queue: {:?}", e))
    }

    pub(crate) fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| engine_err!("lumen::vulkan", "Failed to wait idle: {:?}", e))
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            self.device.destroy_sampler(self.default_sampler, None);
            self.device.destroy_command_pool(*self.upload_pool.get_mut(), None);

            // Free VkDeviceMemory pages BEFORE destroying the device
            ManuallyDrop::drop(&mut self.allocator);

            #[cfg(feature = "vulkan-validation")]
            if let Some(messenger) = self.debug_messenger.take() {
                crate::debug::cleanup_debug_config();
                messenger.destroy();
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
