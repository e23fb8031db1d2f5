/// Descriptor declarations, layouts, pools and sets at the device level

use std::any::Any;
use crate::device::{DeviceBuffer, DeviceTexture, ShaderStageFlags};

/// Kind of resource a descriptor binding refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    /// Sampled image (combined with the backend's default sampler)
    SampledImage,
    StorageImage,
    AccelerationStructure,
}

impl DescriptorKind {
    /// Whether this kind binds a buffer
    pub fn is_buffer(&self) -> bool {
        matches!(self, DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer)
    }

    /// Whether this kind binds an image
    pub fn is_image(&self) -> bool {
        matches!(self, DescriptorKind::SampledImage | DescriptorKind::StorageImage)
    }
}

/// One binding declaration inside a descriptor layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub kind: DescriptorKind,
    pub stages: ShaderStageFlags,
    pub binding: u32,
}

impl Descriptor {
    pub fn new(kind: DescriptorKind, stages: ShaderStageFlags, binding: u32) -> Self {
        Self { kind, stages, binding }
    }
}

/// Opaque acceleration structure produced outside this layer
pub trait AccelerationStructure: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Resource written into one binding
pub enum DescriptorResource<'a> {
    Buffer {
        buffer: &'a dyn DeviceBuffer,
        offset: u64,
        range: u64,
    },
    Texture(&'a dyn DeviceTexture),
    AccelerationStructure(&'a dyn AccelerationStructure),
}

/// One binding update
pub struct DescriptorWrite<'a> {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub resource: DescriptorResource<'a>,
}

/// Compiled descriptor set layout
pub trait DeviceDescriptorLayout: Send + Sync {
    /// Declarations this layout was created from, in binding order
    fn descriptors(&self) -> &[Descriptor];
    fn as_any(&self) -> &dyn Any;
}

/// Device descriptor pool sized for a fixed number of sets of one layout
pub trait DeviceDescriptorPool: Send + Sync {
    fn max_sets(&self) -> u32;
    fn as_any(&self) -> &dyn Any;
}

/// Device descriptor set; dropping it returns it to its pool
pub trait DeviceDescriptorSet: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}
