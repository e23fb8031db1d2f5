/// VulkanCommandList - Vulkan implementation of the CommandList trait
///
/// Records into one primary command buffer that can be submitted any number
/// of times after `end()`. Rendering uses dynamic rendering; the layout
/// transitions of the color and depth targets are recorded around each
/// rendering scope.

use ash::vk;
use lumen_gpu::lumen::device::{
    CommandList, DeviceBuffer, DeviceDescriptorSet, DevicePipeline, DeviceTexture, IndexType, Rect2D,
    RenderingInfo, Viewport,
};
use lumen_gpu::lumen::{Error, Result};
use lumen_gpu::{engine_bail_violation, engine_err, engine_error, engine_violation};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor::VulkanDescriptorSet;
use crate::vulkan_format::index_type_to_vk;
use crate::vulkan_pipeline::VulkanPipeline;
use crate::vulkan_texture::{transition, VulkanTexture};

pub struct VulkanCommandList {
    ctx: Arc<GpuContext>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    /// Signaled when a submission of this list completes
    pub(crate) fence: vk::Fence,
    is_recording: bool,
    /// Color image and range of the open rendering scope
    rendering_target: Option<(vk::Image, vk::ImageSubresourceRange)>,
}

fn vk_buffer(buffer: &dyn DeviceBuffer) -> Result<&VulkanBuffer> {
    buffer
        .as_any()
        .downcast_ref::<VulkanBuffer>()
        .ok_or_else(|| engine_err!("lumen::vulkan", "Command list: not a Vulkan buffer"))
}

fn vk_texture(texture: &dyn DeviceTexture) -> Result<&VulkanTexture> {
    texture
        .as_any()
        .downcast_ref::<VulkanTexture>()
        .ok_or_else(|| engine_err!("lumen::vulkan", "Command list: not a Vulkan texture"))
}

fn vk_pipeline(pipeline: &dyn DevicePipeline) -> Result<&VulkanPipeline> {
    pipeline
        .as_any()
        .downcast_ref::<VulkanPipeline>()
        .ok_or_else(|| engine_err!("lumen::vulkan", "Command list: not a Vulkan pipeline"))
}

impl VulkanCommandList {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        unsafe {
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = ctx.device.create_command_pool(&command_pool_create_info, None)
                .map_err(|e| {
                    engine_error!("lumen::vulkan", "Failed to create command pool: {:?}", e);
                    Error::BackendError(format!("Failed to create command pool: {:?}", e))
                })?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = match ctx.device.allocate_command_buffers(&allocate_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    return Err(engine_err!("lumen::vulkan", "Failed to allocate command buffer: {:?}", e));
                }
            };

            let fence = match ctx.device.create_fence(&vk::FenceCreateInfo::default(), None) {
                Ok(fence) => fence,
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    return Err(engine_err!("lumen::vulkan", "Failed to create submit fence: {:?}", e));
                }
            };

            Ok(Self {
                ctx,
                command_pool,
                command_buffer,
                fence,
                is_recording: false,
                rendering_target: None,
            })
        }
    }

    pub(crate) fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.is_recording
    }

    fn check_recording(&self) -> Result<()> {
        if !self.is_recording {
            engine_bail_violation!("lumen::vulkan", "Command list not recording");
        }
        Ok(())
    }

    fn check_rendering(&self) -> Result<()> {
        self.check_recording()?;
        if self.rendering_target.is_none() {
            engine_bail_violation!("lumen::vulkan", "Draw recorded outside a rendering scope");
        }
        Ok(())
    }
}

impl CommandList for VulkanCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            engine_bail_violation!("lumen::vulkan", "Command list already recording");
        }

        unsafe {
            self.ctx.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| engine_err!("lumen::vulkan", "Failed to reset command buffer: {:?}", e))?;

            // No ONE_TIME_SUBMIT: an unchanged recording is submitted every frame
            let begin_info = vk::CommandBufferBeginInfo::default();
            self.ctx.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| engine_err!("lumen::vulkan", "Failed to begin command buffer: {:?}", e))?;
        }

        self.is_recording = true;
        self.rendering_target = None;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.check_recording()?;
        if self.rendering_target.is_some() {
            engine_bail_violation!("lumen::vulkan", "Rendering not ended before ending command list");
        }

        unsafe {
            self.ctx.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| engine_err!("lumen::vulkan", "Failed to end command buffer: {:?}", e))?;
        }
        self.is_recording = false;
        Ok(())
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()> {
        self.check_recording()?;
        if self.rendering_target.is_some() {
            engine_bail_violation!("lumen::vulkan", "Already inside a rendering scope");
        }

        let color = vk_texture(info.color)?;
        let depth = info.depth.map(vk_texture).transpose()?;
        let target_extent = color.extent();
        if target_extent.width < info.extent.width || target_extent.height < info.extent.height {
            engine_bail_violation!("lumen::vulkan",
                "Render area {}x{} exceeds the {}x{} color target",
                info.extent.width, info.extent.height, target_extent.width, target_extent.height);
        }
        let device = &self.ctx.device;

        unsafe {
            // Compute writes recorded earlier are read by the draws below
            let memory_barrier = vk::MemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(
                    vk::AccessFlags::INDIRECT_COMMAND_READ
                        | vk::AccessFlags::VERTEX_ATTRIBUTE_READ
                        | vk::AccessFlags::SHADER_READ,
                );
            device.cmd_pipeline_barrier(
                self.command_buffer,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::DRAW_INDIRECT
                    | vk::PipelineStageFlags::VERTEX_INPUT
                    | vk::PipelineStageFlags::VERTEX_SHADER
                    | vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[memory_barrier],
                &[],
                &[],
            );

            // Previous contents are cleared, so the old layout is discarded
            transition(
                device,
                self.command_buffer,
                color.image,
                color.range(),
                (vk::ImageLayout::UNDEFINED, vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
                (
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                ),
            );
            if let Some(depth) = depth {
                transition(
                    device,
                    self.command_buffer,
                    depth.image,
                    depth.range(),
                    (vk::ImageLayout::UNDEFINED, vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
                    (
                        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                        vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                    ),
                );
            }

            let color_attachments = [vk::RenderingAttachmentInfo::default()
                .image_view(color.view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue { color: vk::ClearColorValue { float32: info.clear_color } })];

            let depth_attachment = depth.map(|depth| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(depth.view)
                    .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .clear_value(vk::ClearValue {
                        depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                    })
            });

            let mut rendering_info = vk::RenderingInfo::default()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: vk::Extent2D { width: info.extent.width, height: info.extent.height },
                })
                .layer_count(1)
                .color_attachments(&color_attachments);
            if let Some(depth_attachment) = depth_attachment.as_ref() {
                rendering_info = rendering_info.depth_attachment(depth_attachment);
            }

            device.cmd_begin_rendering(self.command_buffer, &rendering_info);
        }

        self.rendering_target = Some((color.image, color.range()));
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        self.check_recording()?;
        let (image, range) = self
            .rendering_target
            .take()
            .ok_or_else(|| engine_violation!("lumen::vulkan", "Not inside a rendering scope"))?;

        unsafe {
            self.ctx.device.cmd_end_rendering(self.command_buffer);

            // Leave the color target readable by shaders
            transition(
                &self.ctx.device,
                self.command_buffer,
                image,
                range,
                (
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                ),
                (
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::SHADER_READ,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                ),
            );
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.check_recording()?;
        unsafe {
            let vk_viewport = vk::Viewport::default()
                .x(viewport.x)
                .y(viewport.y)
                .width(viewport.width)
                .height(viewport.height)
                .min_depth(viewport.min_depth)
                .max_depth(viewport.max_depth);
            self.ctx.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.check_recording()?;
        unsafe {
            let vk_scissor = vk::Rect2D::default()
                .offset(vk::Offset2D { x: scissor.x, y: scissor.y })
                .extent(vk::Extent2D { width: scissor.width, height: scissor.height });
            self.ctx.device.cmd_set_scissor(self.command_buffer, 0, &[vk_scissor]);
        }
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &dyn DevicePipeline) -> Result<()> {
        self.check_recording()?;
        let pipeline = vk_pipeline(pipeline)?;
        unsafe {
            self.ctx.device.cmd_bind_pipeline(self.command_buffer, pipeline.vk_bind_point(), pipeline.pipeline);
        }
        Ok(())
    }

    fn bind_descriptor_sets(
        &mut self,
        pipeline: &dyn DevicePipeline,
        first_set: u32,
        sets: &[&dyn DeviceDescriptorSet],
    ) -> Result<()> {
        self.check_recording()?;
        let pipeline = vk_pipeline(pipeline)?;

        let mut vk_sets = Vec::with_capacity(sets.len());
        for set in sets {
            let set = set
                .as_any()
                .downcast_ref::<VulkanDescriptorSet>()
                .ok_or_else(|| engine_err!("lumen::vulkan", "Command list: not a Vulkan descriptor set"))?;
            vk_sets.push(set.set);
        }

        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                pipeline.vk_bind_point(),
                pipeline.layout,
                first_set,
                &vk_sets,
                &[], // dynamic_offsets
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &dyn DeviceBuffer, offset: u64) -> Result<()> {
        self.check_recording()?;
        let buffer = vk_buffer(buffer)?;
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(self.command_buffer, binding, &[buffer.buffer], &[offset]);
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &dyn DeviceBuffer, offset: u64, index_type: IndexType) -> Result<()> {
        self.check_recording()?;
        let buffer = vk_buffer(buffer)?;
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(
                self.command_buffer,
                buffer.buffer,
                offset,
                index_type_to_vk(index_type),
            );
        }
        Ok(())
    }

    fn draw_indirect(&mut self, buffer: &dyn DeviceBuffer, offset: u64, draw_count: u32, stride: u32) -> Result<()> {
        self.check_rendering()?;
        let buffer = vk_buffer(buffer)?;
        unsafe {
            self.ctx.device.cmd_draw_indirect(self.command_buffer, buffer.buffer, offset, draw_count, stride);
        }
        Ok(())
    }

    fn draw_indexed_indirect(
        &mut self,
        buffer: &dyn DeviceBuffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) -> Result<()> {
        self.check_rendering()?;
        let buffer = vk_buffer(buffer)?;
        unsafe {
            self.ctx.device.cmd_draw_indexed_indirect(self.command_buffer, buffer.buffer, offset, draw_count, stride);
        }
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.check_recording()?;
        if self.rendering_target.is_some() {
            engine_bail_violation!("lumen::vulkan", "Dispatch recorded inside a rendering scope");
        }
        unsafe {
            self.ctx.device.cmd_dispatch(self.command_buffer, x, y, z);
        }
        Ok(())
    }

    fn trace_rays(&mut self, _width: u32, _height: u32, _depth: u32) -> Result<()> {
        engine_error!("lumen::vulkan", "trace_rays: ray tracing is not supported by the Vulkan backend");
        Err(Error::Unsupported("ray tracing is not supported by the Vulkan backend".to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        unsafe {
            // Submissions are waited on, so nothing references the buffer here
            self.ctx.device.destroy_fence(self.fence, None);
            // Command buffer is freed with its pool
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
