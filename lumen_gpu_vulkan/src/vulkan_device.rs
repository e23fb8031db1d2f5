/// VulkanDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Headless Vulkan 1.3 device: no surface, rendering goes to offscreen
/// images through dynamic rendering. Transfers and submissions block until
/// the GPU is done.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use lumen_gpu::lumen::device::{
    BufferDesc, CommandList, ComputePipelineDesc, Descriptor, DescriptorWrite, DeviceBuffer,
    DeviceDescriptorLayout, DeviceDescriptorPool, DeviceDescriptorSet, DeviceLimits, DevicePipeline,
    DeviceTexture, GraphicsDevice, GraphicsPipelineDesc, ShaderModule, ShaderModuleDesc, TextureDesc,
};
use lumen_gpu::lumen::{Config, Error, Result};
use lumen_gpu::{engine_bail_violation, engine_err, engine_error, engine_info, engine_trace, engine_warn};
use std::ffi::{CStr, CString};
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor::{VulkanDescriptorLayout, VulkanDescriptorPool, VulkanDescriptorSet};
use crate::vulkan_pipeline::VulkanPipeline;
use crate::vulkan_shader::VulkanShaderModule;
use crate::vulkan_texture::{transition, VulkanTexture};

pub struct VulkanDevice {
    ctx: Arc<GpuContext>,
    limits: DeviceLimits,
    device_name: String,
}

fn init_error(what: &str, e: impl std::fmt::Debug) -> Error {
    engine_error!("lumen::vulkan", "Failed to {}: {:?}", what, e);
    Error::InitializationFailed(format!("Failed to {}: {:?}", what, e))
}

/// Whether the device exposes Vulkan 1.3 dynamic rendering
unsafe fn supports_dynamic_rendering(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> bool {
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    {
        let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features13);
        instance.get_physical_device_features2(physical_device, &mut features2);
    }
    features13.dynamic_rendering == vk::TRUE
}

/// Graphics queue family of a usable device, if any
unsafe fn graphics_queue_family(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Option<u32> {
    let properties = instance.get_physical_device_properties(physical_device);
    let features = instance.get_physical_device_features(physical_device);
    if properties.api_version < vk::API_VERSION_1_3
        || features.draw_indirect_first_instance != vk::TRUE
        || !supports_dynamic_rendering(instance, physical_device)
    {
        return None;
    }

    instance
        .get_physical_device_queue_family_properties(physical_device)
        .iter()
        .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
}

#[cfg(feature = "vulkan-validation")]
unsafe fn validation_layer_available(entry: &ash::Entry) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .map(|layers| {
            layers.iter().any(|layer| {
                CStr::from_ptr(layer.layer_name.as_ptr()) == c"VK_LAYER_KHRONOS_validation"
            })
        })
        .unwrap_or(false)
}

impl VulkanDevice {
    /// Create a headless Vulkan device
    ///
    /// Picks the first discrete GPU (or any GPU) supporting Vulkan 1.3 with
    /// dynamic rendering. Validation layers are enabled when
    /// `config.enable_validation` is set and the crate is built with the
    /// `vulkan-validation` feature.
    pub fn new(config: &Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_error("load Vulkan library", e))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| init_error("convert application name", e))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Lumen")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            #[allow(unused_mut)]
            let mut layer_names: Vec<*const std::os::raw::c_char> = Vec::new();
            #[allow(unused_mut)]
            let mut extension_names: Vec<*const std::os::raw::c_char> = Vec::new();
            #[allow(unused_mut)]
            let mut validation = false;

            if config.enable_validation {
                #[cfg(feature = "vulkan-validation")]
                {
                    if validation_layer_available(&entry) {
                        layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
                        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                        validation = true;
                    } else {
                        engine_warn!("lumen::vulkan", "Validation requested but VK_LAYER_KHRONOS_validation is not installed");
                    }
                }
                #[cfg(not(feature = "vulkan-validation"))]
                engine_warn!("lumen::vulkan", "Validation requested but the 'vulkan-validation' feature is disabled");
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_error("create Vulkan instance", e))?;

            #[cfg(feature = "vulkan-validation")]
            let debug_messenger = if validation {
                Some(crate::debug::DebugMessenger::new(&entry, &instance)
                    .map_err(|e| init_error("create debug messenger", e))?)
            } else {
                None
            };

            // Pick Physical Device: discrete first, then anything usable
            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| init_error("enumerate physical devices", e))?;

            let mut candidates: Vec<(vk::PhysicalDevice, u32, bool)> = physical_devices
                .into_iter()
                .filter_map(|pd| {
                    let family = graphics_queue_family(&instance, pd)?;
                    let discrete = instance.get_physical_device_properties(pd).device_type
                        == vk::PhysicalDeviceType::DISCRETE_GPU;
                    Some((pd, family, discrete))
                })
                .collect();
            candidates.sort_by_key(|&(_, _, discrete)| !discrete);

            let (physical_device, queue_family, _) = candidates.first().copied().ok_or_else(|| {
                engine_error!("lumen::vulkan", "No GPU with Vulkan 1.3 dynamic rendering found");
                Error::InitializationFailed("No GPU with Vulkan 1.3 dynamic rendering found".to_string())
            })?;

            let properties = instance.get_physical_device_properties(physical_device);
            let supported = instance.get_physical_device_features(physical_device);
            let device_name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy().into_owned();
            let multi_draw_indirect = supported.multi_draw_indirect == vk::TRUE;

            // Create Logical Device
            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];

            let device_features = vk::PhysicalDeviceFeatures::default()
                .multi_draw_indirect(multi_draw_indirect)
                .draw_indirect_first_instance(true);
            let mut features13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_features(&device_features)
                .push_next(&mut features13);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_error("create logical device", e))?;
            let queue = device.get_device_queue(queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| init_error("create GPU allocator", e))?;

            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_pool = device
                .create_command_pool(&upload_pool_create_info, None)
                .map_err(|e| init_error("create upload command pool", e))?;

            let sampler_info = vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                .address_mode_u(vk::SamplerAddressMode::REPEAT)
                .address_mode_v(vk::SamplerAddressMode::REPEAT)
                .address_mode_w(vk::SamplerAddressMode::REPEAT)
                .max_lod(vk::LOD_CLAMP_NONE);
            let default_sampler = device
                .create_sampler(&sampler_info, None)
                .map_err(|e| init_error("create default sampler", e))?;

            let limits = DeviceLimits {
                min_uniform_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
                min_storage_offset_alignment: properties.limits.min_storage_buffer_offset_alignment,
                max_bound_descriptor_sets: properties.limits.max_bound_descriptor_sets,
                max_vertex_attributes: properties.limits.max_vertex_input_attributes,
                multi_draw_indirect,
                ray_tracing: false,
            };

            let ctx = Arc::new(GpuContext::new(
                entry,
                instance,
                physical_device,
                device,
                allocator,
                queue,
                queue_family,
                upload_pool,
                default_sampler,
                #[cfg(feature = "vulkan-validation")]
                debug_messenger,
            ));

            engine_info!("lumen::vulkan", "Vulkan device '{}' ready (Vulkan {}.{}, validation {})",
                device_name,
                vk::api_version_major(properties.api_version),
                vk::api_version_minor(properties.api_version),
                if validation { "on" } else { "off" });

            Ok(Self { ctx, limits, device_name })
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.ctx.physical_device
    }
}

// ===== DOWNCASTS =====

fn as_vk<'a, T: 'static>(any: &'a dyn std::any::Any, what: &str) -> Result<&'a T> {
    any.downcast_ref::<T>()
        .ok_or_else(|| engine_err!("lumen::vulkan", "Expected a Vulkan {}", what))
}

impl GraphicsDevice for VulkanDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    // ===== BUFFERS =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn DeviceBuffer>> {
        Ok(Arc::new(VulkanBuffer::new(Arc::clone(&self.ctx), desc)?))
    }

    fn copy_buffer(
        &self,
        src: &dyn DeviceBuffer,
        src_offset: u64,
        dst: &dyn DeviceBuffer,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        if src_offset + size > src.size() || dst_offset + size > dst.size() {
            engine_bail_violation!("lumen::vulkan",
                "copy_buffer: {} bytes from offset {} ({} total) to offset {} ({} total) out of range",
                size, src_offset, src.size(), dst_offset, dst.size());
        }
        if size == 0 {
            return Ok(());
        }

        let src = as_vk::<VulkanBuffer>(src.as_any(), "buffer")?;
        let dst = as_vk::<VulkanBuffer>(dst.as_any(), "buffer")?;
        let region = vk::BufferCopy { src_offset, dst_offset, size };

        self.ctx.one_shot(|device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src.buffer, dst.buffer, &[region]);
        })?;

        engine_trace!("lumen::vulkan", "Copied {} bytes between buffers", size);
        Ok(())
    }

    // ===== TEXTURES =====

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn DeviceTexture>> {
        Ok(Arc::new(VulkanTexture::new(Arc::clone(&self.ctx), desc)?))
    }

    fn copy_buffer_to_texture(&self, src: &dyn DeviceBuffer, dst: &dyn DeviceTexture) -> Result<()> {
        let needed = dst.width() as u64 * dst.height() as u64 * dst.format().bytes_per_pixel() as u64;
        if src.size() < needed {
            engine_bail_violation!("lumen::vulkan",
                "copy_buffer_to_texture: {} bytes supplied, {}x{} {:?} needs {}",
                src.size(), dst.width(), dst.height(), dst.format(), needed);
        }

        let src = as_vk::<VulkanBuffer>(src.as_any(), "buffer")?;
        let dst = as_vk::<VulkanTexture>(dst.as_any(), "texture")?;
        let extent = dst.extent();
        let range = dst.range();

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: dst.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width: extent.width, height: extent.height, depth: 1 });

        self.ctx.one_shot(|device, command_buffer| unsafe {
            transition(
                device,
                command_buffer,
                dst.image,
                range,
                (vk::ImageLayout::UNDEFINED, vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
                (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER),
            );
            device.cmd_copy_buffer_to_image(
                command_buffer,
                src.buffer,
                dst.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            transition(
                device,
                command_buffer,
                dst.image,
                range,
                (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER),
                (
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::SHADER_READ,
                    vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
                ),
            );
        })
    }

    // ===== SHADERS =====

    fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<Arc<dyn ShaderModule>> {
        Ok(Arc::new(VulkanShaderModule::new(Arc::clone(&self.ctx), desc)?))
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_layout(&self, descriptors: &[Descriptor]) -> Result<Arc<dyn DeviceDescriptorLayout>> {
        Ok(Arc::new(VulkanDescriptorLayout::new(Arc::clone(&self.ctx), descriptors)?))
    }

    fn create_descriptor_pool(
        &self,
        layout: &dyn DeviceDescriptorLayout,
        max_sets: u32,
    ) -> Result<Arc<dyn DeviceDescriptorPool>> {
        let layout = as_vk::<VulkanDescriptorLayout>(layout.as_any(), "descriptor layout")?;
        Ok(Arc::new(VulkanDescriptorPool::new(Arc::clone(&self.ctx), layout, max_sets)?))
    }

    fn allocate_descriptor_set(
        &self,
        pool: &dyn DeviceDescriptorPool,
        layout: &dyn DeviceDescriptorLayout,
    ) -> Result<Box<dyn DeviceDescriptorSet>> {
        let pool = as_vk::<VulkanDescriptorPool>(pool.as_any(), "descriptor pool")?;
        let layout = as_vk::<VulkanDescriptorLayout>(layout.as_any(), "descriptor layout")?;
        Ok(Box::new(pool.allocate(layout)?))
    }

    fn update_descriptor_set(&self, set: &dyn DeviceDescriptorSet, writes: &[DescriptorWrite]) -> Result<()> {
        as_vk::<VulkanDescriptorSet>(set.as_any(), "descriptor set")?.update(writes)
    }

    // ===== PIPELINES =====

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<dyn DevicePipeline>> {
        Ok(Arc::new(VulkanPipeline::graphics(Arc::clone(&self.ctx), desc)?))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<Arc<dyn DevicePipeline>> {
        Ok(Arc::new(VulkanPipeline::compute(Arc::clone(&self.ctx), desc)?))
    }

    // ===== COMMANDS =====

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(VulkanCommandList::new(Arc::clone(&self.ctx))?))
    }

    fn submit(&self, commands: &dyn CommandList) -> Result<()> {
        let commands = as_vk::<VulkanCommandList>(commands.as_any(), "command list")?;
        if commands.is_recording() {
            engine_bail_violation!("lumen::vulkan", "submit: command list is still recording");
        }
        self.ctx.submit_and_wait(commands.command_buffer(), commands.fence)
    }

    fn wait_idle(&self) -> Result<()> {
        self.ctx.wait_idle()
    }
}
