/// VulkanPipeline - graphics and compute pipelines with their layouts

use ash::vk;
use lumen_gpu::lumen::device::{
    ComputePipelineDesc, DeviceDescriptorLayout, DevicePipeline, GraphicsPipelineDesc, PipelineBindPoint,
    ShaderModule,
};
use lumen_gpu::lumen::Result;
use lumen_gpu::{engine_debug, engine_err};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor::VulkanDescriptorLayout;
use crate::vulkan_format::{
    compare_op_to_vk, cull_mode_to_vk, front_face_to_vk, input_rate_to_vk, polygon_mode_to_vk,
    texture_format_to_vk, topology_to_vk, vertex_format_to_vk,
};
use crate::vulkan_shader::VulkanShaderModule;

pub struct VulkanPipeline {
    ctx: Arc<GpuContext>,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    bind_point: PipelineBindPoint,
}

fn vk_shader(module: &Arc<dyn ShaderModule>) -> Result<&VulkanShaderModule> {
    module
        .as_any()
        .downcast_ref::<VulkanShaderModule>()
        .ok_or_else(|| engine_err!("lumen::vulkan", "Pipeline creation: not a Vulkan shader module"))
}

/// Pipeline layout over `set_layouts`, indexed by set number
fn create_pipeline_layout(
    ctx: &GpuContext,
    set_layouts: &[Arc<dyn DeviceDescriptorLayout>],
) -> Result<vk::PipelineLayout> {
    let mut vk_layouts = Vec::with_capacity(set_layouts.len());
    for layout in set_layouts {
        let layout = layout
            .as_any()
            .downcast_ref::<VulkanDescriptorLayout>()
            .ok_or_else(|| engine_err!("lumen::vulkan", "Pipeline creation: not a Vulkan descriptor layout"))?;
        vk_layouts.push(layout.layout);
    }

    let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&vk_layouts);
    unsafe {
        ctx.device
            .create_pipeline_layout(&create_info, None)
            .map_err(|e| engine_err!("lumen::vulkan", "Failed to create pipeline layout: {:?}", e))
    }
}

impl VulkanPipeline {
    pub(crate) fn graphics(ctx: Arc<GpuContext>, desc: &GraphicsPipelineDesc) -> Result<Self> {
        let vertex = vk_shader(&desc.vertex_shader)?;
        let fragment = vk_shader(&desc.fragment_shader)?;
        let layout = create_pipeline_layout(&ctx, &desc.set_layouts)?;
        let config = &desc.config;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vertex.vk_stage())
                .module(vertex.module)
                .name(vertex.entry_point_cstr()),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(fragment.vk_stage())
                .module(fragment.module)
                .name(fragment.entry_point_cstr()),
        ];

        let bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: input_rate_to_vk(b.input_rate),
            })
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: vertex_format_to_vk(a.format),
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(config.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic, set by each pipeline at record time
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(polygon_mode_to_vk(config.polygon_mode))
            .cull_mode(cull_mode_to_vk(config.cull_mode))
            .front_face(front_face_to_vk(config.front_face))
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(compare_op_to_vk(config.depth_compare));

        let blend_attachment = if config.blend_enable {
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
        } else {
            vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA)
        };
        let blend_attachments = [blend_attachment];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let color_formats = [texture_format_to_vk(config.color_format)];
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(config.depth_format.map_or(vk::Format::UNDEFINED, texture_format_to_vk));

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering);

        let pipeline = unsafe {
            match ctx.device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None) {
                Ok(pipelines) => pipelines[0],
                Err((_, e)) => {
                    ctx.device.destroy_pipeline_layout(layout, None);
                    return Err(engine_err!("lumen::vulkan", "Failed to create graphics pipeline: {:?}", e));
                }
            }
        };

        engine_debug!("lumen::vulkan", "Created graphics pipeline ({} bindings, {} attributes, {} sets)",
            bindings.len(), attributes.len(), desc.set_layouts.len());

        Ok(Self { ctx, pipeline, layout, bind_point: PipelineBindPoint::Graphics })
    }

    pub(crate) fn compute(ctx: Arc<GpuContext>, desc: &ComputePipelineDesc) -> Result<Self> {
        let shader = vk_shader(&desc.shader)?;
        let layout = create_pipeline_layout(&ctx, &desc.set_layouts)?;

        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(shader.vk_stage())
            .module(shader.module)
            .name(shader.entry_point_cstr());
        let create_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout);

        let pipeline = unsafe {
            match ctx.device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None) {
                Ok(pipelines) => pipelines[0],
                Err((_, e)) => {
                    ctx.device.destroy_pipeline_layout(layout, None);
                    return Err(engine_err!("lumen::vulkan", "Failed to create compute pipeline: {:?}", e));
                }
            }
        };

        engine_debug!("lumen::vulkan", "Created compute pipeline ({} sets)", desc.set_layouts.len());

        Ok(Self { ctx, pipeline, layout, bind_point: PipelineBindPoint::Compute })
    }

    pub(crate) fn vk_bind_point(&self) -> vk::PipelineBindPoint {
        match self.bind_point {
            PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
            PipelineBindPoint::RayTracing => vk::PipelineBindPoint::RAY_TRACING_KHR,
        }
    }
}

impl DevicePipeline for VulkanPipeline {
    fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
            self.ctx.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
