/// VulkanTexture - Vulkan implementation of the DeviceTexture trait

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use lumen_gpu::lumen::device::{DeviceTexture, TextureDesc, TextureFormat, TextureUsage};
use lumen_gpu::lumen::Result;
use lumen_gpu::{engine_bail_violation, engine_err, engine_trace};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{aspect_for_format, texture_format_to_vk, texture_usage_to_vk};

/// 2D image with a single mip level and its default view
pub struct VulkanTexture {
    ctx: Arc<GpuContext>,
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    allocation: Option<Allocation>,
    pub(crate) aspect: vk::ImageAspectFlags,
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TextureUsage,
}

impl VulkanTexture {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &TextureDesc) -> Result<Self> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail_violation!("lumen::vulkan",
                "Texture '{}' extent must be non-zero ({}x{})", desc.label, desc.width, desc.height);
        }

        let format = texture_format_to_vk(desc.format);
        let aspect = aspect_for_format(desc.format);

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(texture_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!("lumen::vulkan", "Failed to create image '{}': {:?}", desc.label, e))?;

            let allocation = match ctx.allocate_image_memory(image, &desc.label) {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(full_range(aspect));

            let view = match ctx.device.create_image_view(&view_create_info, None) {
                Ok(view) => view,
                Err(e) => {
                    ctx.free(allocation);
                    ctx.device.destroy_image(image, None);
                    return Err(engine_err!("lumen::vulkan", "Failed to create image view '{}': {:?}", desc.label, e));
                }
            };

            engine_trace!("lumen::vulkan", "Created image '{}' ({}x{} {:?})",
                desc.label, desc.width, desc.height, desc.format);

            Ok(Self {
                ctx,
                image,
                view,
                allocation: Some(allocation),
                aspect,
                width: desc.width,
                height: desc.height,
                format: desc.format,
                usage: desc.usage,
            })
        }
    }

    pub(crate) fn extent(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.width, height: self.height }
    }

    pub(crate) fn range(&self) -> vk::ImageSubresourceRange {
        full_range(self.aspect)
    }
}

/// The whole single-level, single-layer image
pub(crate) fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Record a layout transition covering the whole image
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn transition(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    (old_layout, src_access, src_stage): (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags),
    (new_layout, dst_access, dst_stage): (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags),
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    device.cmd_pipeline_barrier(
        command_buffer,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

impl DeviceTexture for VulkanTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn usage(&self) -> TextureUsage {
        self.usage
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_image_view(self.view, None);
            if let Some(allocation) = self.allocation.take() {
                self.ctx.free(allocation);
            }
            self.ctx.device.destroy_image(self.image, None);
        }
    }
}
