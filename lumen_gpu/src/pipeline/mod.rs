/// Pipeline layer: graphics, compute and ray tracing pipelines
///
/// Every variant shares the same life cycle:
///
/// ```text
/// Unbuilt --build()--> Built --attach / reconfigure--> Dirty --rebuild()--> Built
///    ^                                                                |
///    +---------------------- failed build or rebuild -----------------+
/// ```
///
/// A failed build also raises the sticky `has_error()` flag, cleared by the
/// next successful build.

mod base;
mod compute;
mod graphics;
mod raytrace;
mod shader_source;
mod vertex_layout;

#[cfg(test)]
pub(crate) mod test_shaders;

pub(crate) use base::PipelineCore;
pub use compute::ComputePipeline;
pub use graphics::GraphicsPipeline;
pub use raytrace::{HitGroup, RaytracePipeline};
pub use shader_source::{load_shader_bytes, SHADER_ENTRY_POINT};
pub use vertex_layout::{VertexAttribute, VertexBinding};

use crate::device::CommandList;
use crate::error::Result;
use crate::resource::{DescriptorPool, SharedDescriptorSet};

/// Pipeline variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
    Raytrace,
}

/// Build state of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// No device pipeline (never built, or the last build failed)
    Unbuilt,
    /// Device pipeline matches the attached configuration
    Built,
    /// Device pipeline exists but the configuration changed since
    Dirty,
}

/// Common interface of the three pipeline variants
pub trait Pipeline {
    fn kind(&self) -> PipelineKind;

    fn state(&self) -> PipelineState;

    /// Sticky failure flag of the last build or rebuild
    fn has_error(&self) -> bool;

    /// Recording order among graphics pipelines (lower first)
    fn priority(&self) -> i32;

    /// Declare `pool`'s layout for the next set index; returns that index
    fn attach_descriptor_pool(&mut self, pool: &DescriptorPool) -> Result<u32>;

    /// Bind `set` at `set_index`, declaring its pool's layout when none is
    fn attach_descriptor_set(&mut self, set_index: u32, set: SharedDescriptorSet) -> Result<()>;

    /// Create the device pipeline (Unbuilt only)
    fn build(&mut self) -> Result<()>;

    /// Recreate the device pipeline in place (Built or Dirty only)
    fn rebuild(&mut self) -> Result<()>;

    /// Whether the recorded commands of this pipeline are out of date
    fn has_changed(&mut self) -> bool;

    /// Push pending host data of attached resources to the device
    fn flush(&mut self) -> Result<()>;

    /// Update descriptor sets whose attachments changed since the last update
    fn refresh_descriptor_sets(&mut self) -> Result<()>;

    /// Record this pipeline's commands; returns the number of draw or
    /// dispatch commands emitted
    fn attach_to_command_buffer(&self, cmd: &mut dyn CommandList) -> Result<u32>;

    /// Output size changed
    fn set_extent(&mut self, width: u32, height: u32);
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
