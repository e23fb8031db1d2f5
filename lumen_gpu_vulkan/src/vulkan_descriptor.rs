/// Vulkan descriptor set layouts, pools and sets

use ash::vk;
use lumen_gpu::lumen::device::{
    Descriptor, DescriptorKind, DescriptorResource, DescriptorWrite, DeviceDescriptorLayout,
    DeviceDescriptorPool, DeviceDescriptorSet,
};
use lumen_gpu::lumen::{Error, Result};
use lumen_gpu::{engine_bail_violation, engine_err, engine_error, engine_trace};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{descriptor_kind_to_vk, stage_flags_to_vk};
use crate::vulkan_texture::VulkanTexture;

// ===== LAYOUT =====

pub struct VulkanDescriptorLayout {
    ctx: Arc<GpuContext>,
    pub(crate) layout: vk::DescriptorSetLayout,
    descriptors: Vec<Descriptor>,
}

impl VulkanDescriptorLayout {
    pub(crate) fn new(ctx: Arc<GpuContext>, descriptors: &[Descriptor]) -> Result<Self> {
        let mut descriptors = descriptors.to_vec();
        descriptors.sort_by_key(|d| d.binding);

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = descriptors
            .iter()
            .map(|d| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(d.binding)
                    .descriptor_type(descriptor_kind_to_vk(d.kind))
                    .descriptor_count(1)
                    .stage_flags(stage_flags_to_vk(d.stages))
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            ctx.device.create_descriptor_set_layout(&create_info, None)
                .map_err(|e| engine_err!("lumen::vulkan", "Failed to create descriptor set layout: {:?}", e))?
        };

        Ok(Self { ctx, layout, descriptors })
    }
}

impl DeviceDescriptorLayout for VulkanDescriptorLayout {
    fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanDescriptorLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

// ===== POOL =====

/// Pool handle shared with the sets allocated from it
pub(crate) struct PoolHandle {
    ctx: Arc<GpuContext>,
    pool: vk::DescriptorPool,
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

pub struct VulkanDescriptorPool {
    handle: Arc<PoolHandle>,
    max_sets: u32,
}

impl VulkanDescriptorPool {
    /// Pool sized for `max_sets` sets of `layout`
    pub(crate) fn new(ctx: Arc<GpuContext>, layout: &VulkanDescriptorLayout, max_sets: u32) -> Result<Self> {
        if max_sets == 0 {
            engine_bail_violation!("lumen::vulkan", "Descriptor pool must hold at least one set");
        }

        let mut pool_sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for descriptor in &layout.descriptors {
            let ty = descriptor_kind_to_vk(descriptor.kind);
            match pool_sizes.iter_mut().find(|size| size.ty == ty) {
                Some(size) => size.descriptor_count += max_sets,
                None => pool_sizes.push(vk::DescriptorPoolSize { ty, descriptor_count: max_sets }),
            }
        }

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe {
            ctx.device.create_descriptor_pool(&create_info, None).map_err(|e| {
                engine_error!("lumen::vulkan", "Failed to create descriptor pool: {:?}", e);
                Error::BackendError(format!("Failed to create descriptor pool: {:?}", e))
            })?
        };

        engine_trace!("lumen::vulkan", "Created descriptor pool ({} sets, {} bindings per set)",
            max_sets, layout.descriptors.len());

        Ok(Self { handle: Arc::new(PoolHandle { ctx, pool }), max_sets })
    }

    pub(crate) fn allocate(&self, layout: &VulkanDescriptorLayout) -> Result<VulkanDescriptorSet> {
        let layouts = [layout.layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.handle.pool)
            .set_layouts(&layouts);

        let sets = unsafe {
            self.handle.ctx.device.allocate_descriptor_sets(&allocate_info)
                .map_err(|e| engine_err!("lumen::vulkan", "Failed to allocate descriptor set: {:?}", e))?
        };

        Ok(VulkanDescriptorSet { pool: Arc::clone(&self.handle), set: sets[0] })
    }
}

impl DeviceDescriptorPool for VulkanDescriptorPool {
    fn max_sets(&self) -> u32 {
        self.max_sets
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ===== SET =====

/// Descriptor set returned to its pool on drop
pub struct VulkanDescriptorSet {
    pool: Arc<PoolHandle>,
    pub(crate) set: vk::DescriptorSet,
}

enum WriteInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

impl VulkanDescriptorSet {
    pub(crate) fn update(&self, writes: &[DescriptorWrite]) -> Result<()> {
        let ctx = &self.pool.ctx;

        // Infos first, so the write structs can borrow them
        let mut infos = Vec::with_capacity(writes.len());
        for write in writes {
            let info = match &write.resource {
                DescriptorResource::Buffer { buffer, offset, range } => {
                    let buffer = buffer
                        .as_any()
                        .downcast_ref::<VulkanBuffer>()
                        .ok_or_else(|| engine_err!("lumen::vulkan", "Descriptor write: not a Vulkan buffer"))?;
                    WriteInfo::Buffer(
                        vk::DescriptorBufferInfo::default().buffer(buffer.buffer).offset(*offset).range(*range),
                    )
                }
                DescriptorResource::Texture(texture) => {
                    let texture = texture
                        .as_any()
                        .downcast_ref::<VulkanTexture>()
                        .ok_or_else(|| engine_err!("lumen::vulkan", "Descriptor write: not a Vulkan texture"))?;
                    let (layout, sampler) = match write.kind {
                        DescriptorKind::StorageImage => (vk::ImageLayout::GENERAL, vk::Sampler::null()),
                        _ => (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, ctx.default_sampler),
                    };
                    WriteInfo::Image(
                        vk::DescriptorImageInfo::default().image_view(texture.view).image_layout(layout).sampler(sampler),
                    )
                }
                DescriptorResource::AccelerationStructure(_) => {
                    engine_error!("lumen::vulkan", "Acceleration structure bindings are not supported");
                    return Err(Error::Unsupported("acceleration structure descriptors".to_string()));
                }
            };
            infos.push(info);
        }

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .zip(&infos)
            .map(|(write, info)| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(write.binding)
                    .descriptor_type(descriptor_kind_to_vk(write.kind));
                match info {
                    WriteInfo::Buffer(info) => vk_write.buffer_info(std::slice::from_ref(info)),
                    WriteInfo::Image(info) => vk_write.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        unsafe {
            ctx.device.update_descriptor_sets(&vk_writes, &[]);
        }
        Ok(())
    }
}

impl DeviceDescriptorSet for VulkanDescriptorSet {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanDescriptorSet {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.pool.ctx.device.free_descriptor_sets(self.pool.pool, &[self.set]) {
                engine_error!("lumen::vulkan", "Failed to free descriptor set: {:?}", e);
            }
        }
    }
}
