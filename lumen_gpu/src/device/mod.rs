//! Device layer: the boundary between Lumen and a native GPU API
//!
//! Backends implement [`GraphicsDevice`] and the resource traits below.
//! Every copy and submission issued through this trait is synchronous:
//! the call returns once the device has finished the work.

use std::sync::Arc;
use crate::error::{Error, Result};

mod buffer;
mod command_list;
mod descriptor;
mod pipeline;
mod shader;
mod texture;

#[cfg(test)]
pub(crate) mod mock_device;

pub use buffer::{BufferDesc, BufferUsage, DeviceBuffer, MemoryLocation};
pub use command_list::{CommandList, Extent2D, IndexElement, IndexType, Rect2D, RenderingInfo, Viewport};
pub use descriptor::{
    AccelerationStructure, Descriptor, DescriptorKind, DescriptorResource, DescriptorWrite,
    DeviceDescriptorLayout, DeviceDescriptorPool, DeviceDescriptorSet,
};
pub use pipeline::{
    CompareOp, ComputePipelineDesc, CullMode, DevicePipeline, FrontFace, GraphicsPipelineConfig,
    GraphicsPipelineDesc, HitGroupDesc, PipelineBindPoint, PolygonMode, PrimitiveTopology,
    RaytracePipelineDesc, VertexAttributeDesc, VertexBindingDesc, VertexFormat, VertexInputRate,
    MATRIX_ROW_STRIDE,
};
pub use shader::{ShaderModule, ShaderModuleDesc, ShaderStage, ShaderStageFlags};
pub use texture::{DeviceTexture, TextureDesc, TextureFormat, TextureUsage};

/// Device properties the resource layer depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub min_uniform_offset_alignment: u64,
    pub min_storage_offset_alignment: u64,
    /// Descriptor sets one pipeline layout may bind at once
    pub max_bound_descriptor_sets: u32,
    pub max_vertex_attributes: u32,
    pub multi_draw_indirect: bool,
    pub ray_tracing: bool,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_offset_alignment: 256,
            min_storage_offset_alignment: 64,
            max_bound_descriptor_sets: 8,
            max_vertex_attributes: 16,
            multi_draw_indirect: true,
            ray_tracing: false,
        }
    }
}

/// Native GPU device
pub trait GraphicsDevice: Send + Sync {
    /// Device limits and optional features
    fn limits(&self) -> DeviceLimits;

    // ===== BUFFERS =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn DeviceBuffer>>;

    /// Copy `size` bytes between two buffers and wait for completion
    fn copy_buffer(
        &self,
        src: &dyn DeviceBuffer,
        src_offset: u64,
        dst: &dyn DeviceBuffer,
        dst_offset: u64,
        size: u64,
    ) -> Result<()>;

    // ===== TEXTURES =====

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn DeviceTexture>>;

    /// Copy tightly packed texels into the whole texture and wait for completion
    fn copy_buffer_to_texture(&self, src: &dyn DeviceBuffer, dst: &dyn DeviceTexture) -> Result<()>;

    // ===== SHADERS =====

    fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<Arc<dyn ShaderModule>>;

    // ===== DESCRIPTORS =====

    fn create_descriptor_layout(&self, descriptors: &[Descriptor]) -> Result<Arc<dyn DeviceDescriptorLayout>>;

    fn create_descriptor_pool(
        &self,
        layout: &dyn DeviceDescriptorLayout,
        max_sets: u32,
    ) -> Result<Arc<dyn DeviceDescriptorPool>>;

    fn allocate_descriptor_set(
        &self,
        pool: &dyn DeviceDescriptorPool,
        layout: &dyn DeviceDescriptorLayout,
    ) -> Result<Box<dyn DeviceDescriptorSet>>;

    fn update_descriptor_set(&self, set: &dyn DeviceDescriptorSet, writes: &[DescriptorWrite]) -> Result<()>;

    // ===== PIPELINES =====

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<dyn DevicePipeline>>;

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<Arc<dyn DevicePipeline>>;

    /// Ray tracing pipelines are optional
    fn create_raytrace_pipeline(&self, _desc: &RaytracePipelineDesc) -> Result<Arc<dyn DevicePipeline>> {
        Err(Error::Unsupported("ray tracing pipelines are not supported by this device".to_string()))
    }

    // ===== COMMANDS =====

    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    /// Submit a recorded command list and wait for completion
    fn submit(&self, commands: &dyn CommandList) -> Result<()>;

    fn wait_idle(&self) -> Result<()>;
}
