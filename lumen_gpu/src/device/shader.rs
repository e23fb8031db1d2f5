/// Shader stages and shader modules

use std::any::Any;
use bitflags::bitflags;

/// A single programmable stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    RayGeneration,
    Miss,
    ClosestHit,
    AnyHit,
    Intersection,
}

impl ShaderStage {
    /// The matching single-bit stage flag
    pub fn flags(&self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
            ShaderStage::RayGeneration => ShaderStageFlags::RAYGEN,
            ShaderStage::Miss => ShaderStageFlags::MISS,
            ShaderStage::ClosestHit => ShaderStageFlags::CLOSEST_HIT,
            ShaderStage::AnyHit => ShaderStageFlags::ANY_HIT,
            ShaderStage::Intersection => ShaderStageFlags::INTERSECTION,
        }
    }
}

bitflags! {
    /// Set of shader stages a descriptor is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX       = 1 << 0;
        const FRAGMENT     = 1 << 1;
        const COMPUTE      = 1 << 2;
        const RAYGEN       = 1 << 3;
        const MISS         = 1 << 4;
        const CLOSEST_HIT  = 1 << 5;
        const ANY_HIT      = 1 << 6;
        const INTERSECTION = 1 << 7;
        const GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

/// Descriptor for creating a shader module from SPIR-V bytecode
#[derive(Debug, Clone)]
pub struct ShaderModuleDesc<'a> {
    /// SPIR-V bytecode (length must be a multiple of 4)
    pub code: &'a [u8],
    pub stage: ShaderStage,
    pub entry_point: &'a str,
}

/// A compiled shader module
pub trait ShaderModule: Send + Sync {
    fn stage(&self) -> ShaderStage;
    fn entry_point(&self) -> &str;
    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}
