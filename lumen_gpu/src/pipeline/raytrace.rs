/// Ray tracing pipeline: ray generation, miss programs and hit groups

use std::path::PathBuf;
use std::sync::Arc;

use crate::device::{
    CommandList, DevicePipeline, Extent2D, GraphicsDevice, HitGroupDesc, RaytracePipelineDesc, ShaderStage,
};
use crate::error::Result;
use crate::pipeline::shader_source::create_module;
use crate::pipeline::{Pipeline, PipelineCore, PipelineKind, PipelineState};
use crate::resource::{DescriptorPool, SharedDescriptorSet};
use crate::{engine_bail_violation, engine_trace};

const SOURCE: &str = "lumen::RaytracePipeline";

/// Shader files of one hit group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitGroup {
    pub closest_hit: PathBuf,
    pub any_hit: Option<PathBuf>,
    pub intersection: Option<PathBuf>,
}

impl HitGroup {
    pub fn new(closest_hit: impl Into<PathBuf>) -> Self {
        Self { closest_hit: closest_hit.into(), any_hit: None, intersection: None }
    }

    pub fn with_any_hit(mut self, any_hit: impl Into<PathBuf>) -> Self {
        self.any_hit = Some(any_hit.into());
        self
    }

    pub fn with_intersection(mut self, intersection: impl Into<PathBuf>) -> Self {
        self.intersection = Some(intersection.into());
        self
    }
}

pub struct RaytracePipeline {
    core: PipelineCore,
    ray_generation: PathBuf,
    miss: Vec<PathBuf>,
    hit_groups: Vec<HitGroup>,
    max_recursion_depth: u32,
    extent: Extent2D,
}

impl RaytracePipeline {
    pub fn new(device: Arc<dyn GraphicsDevice>, ray_generation: impl Into<PathBuf>, extent: Extent2D) -> Self {
        Self {
            core: PipelineCore::new(device, SOURCE),
            ray_generation: ray_generation.into(),
            miss: Vec::new(),
            hit_groups: Vec::new(),
            max_recursion_depth: 1,
            extent,
        }
    }

    pub fn add_miss_program(&mut self, path: impl Into<PathBuf>) {
        self.miss.push(path.into());
        self.core.mark_dirty();
    }

    pub fn add_hit_group(&mut self, group: HitGroup) {
        self.hit_groups.push(group);
        self.core.mark_dirty();
    }

    pub fn set_max_recursion_depth(&mut self, depth: u32) -> Result<()> {
        if depth == 0 {
            engine_bail_violation!(SOURCE, "Max recursion depth must be at least 1");
        }
        self.max_recursion_depth = depth;
        self.core.mark_dirty();
        Ok(())
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.core.set_priority(priority);
    }

    pub fn max_recursion_depth(&self) -> u32 {
        self.max_recursion_depth
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    fn try_build(&self) -> Result<Arc<dyn DevicePipeline>> {
        let set_layouts = self.core.prepare(&[])?;
        let device = Arc::clone(self.core.device());
        let module = |path: &PathBuf, stage| create_module(device.as_ref(), path, stage);

        let ray_generation = module(&self.ray_generation, ShaderStage::RayGeneration)?;
        let miss = self
            .miss
            .iter()
            .map(|path| module(path, ShaderStage::Miss))
            .collect::<Result<Vec<_>>>()?;

        let mut hit_groups = Vec::with_capacity(self.hit_groups.len());
        for group in &self.hit_groups {
            hit_groups.push(HitGroupDesc {
                closest_hit: module(&group.closest_hit, ShaderStage::ClosestHit)?,
                any_hit: group.any_hit.as_ref().map(|p| module(p, ShaderStage::AnyHit)).transpose()?,
                intersection: group
                    .intersection
                    .as_ref()
                    .map(|p| module(p, ShaderStage::Intersection))
                    .transpose()?,
            });
        }

        device.create_raytrace_pipeline(&RaytracePipelineDesc {
            ray_generation,
            miss,
            hit_groups,
            max_recursion_depth: self.max_recursion_depth,
            set_layouts,
        })
    }
}

impl Pipeline for RaytracePipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Raytrace
    }

    fn state(&self) -> PipelineState {
        self.core.state()
    }

    fn has_error(&self) -> bool {
        self.core.has_error()
    }

    fn priority(&self) -> i32 {
        self.core.priority()
    }

    fn attach_descriptor_pool(&mut self, pool: &DescriptorPool) -> Result<u32> {
        self.core.attach_descriptor_pool(pool)
    }

    fn attach_descriptor_set(&mut self, set_index: u32, set: SharedDescriptorSet) -> Result<()> {
        self.core.attach_descriptor_set(set_index, set)
    }

    fn build(&mut self) -> Result<()> {
        self.core.begin_build()?;
        let result = self.try_build();
        self.core.finish_build(result)
    }

    fn rebuild(&mut self) -> Result<()> {
        self.core.begin_rebuild()?;
        let result = self.try_build();
        self.core.finish_build(result)
    }

    fn has_changed(&mut self) -> bool {
        self.core.take_changed()
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn refresh_descriptor_sets(&mut self) -> Result<()> {
        self.core.refresh_sets().map(|_| ())
    }

    fn attach_to_command_buffer(&self, cmd: &mut dyn CommandList) -> Result<u32> {
        self.core.bind(cmd)?;
        cmd.trace_rays(self.extent.width, self.extent.height, 1)?;
        engine_trace!(SOURCE, "Recorded trace {}x{}", self.extent.width, self.extent.height);
        Ok(1)
    }

    fn set_extent(&mut self, width: u32, height: u32) {
        self.extent = Extent2D::new(width, height);
        self.core.mark_dirty();
    }
}
