/// Graphics pipeline: vertex + fragment stages drawing attached model pools

use std::path::PathBuf;
use std::sync::Arc;

use crate::device::{
    CommandList, DevicePipeline, Extent2D, GraphicsDevice, GraphicsPipelineConfig, GraphicsPipelineDesc,
    Rect2D, ShaderStage, Viewport,
};
use crate::error::Result;
use crate::pipeline::shader_source::create_module;
use crate::pipeline::vertex_layout::VertexLayout;
use crate::pipeline::{Pipeline, PipelineCore, PipelineKind, PipelineState, VertexBinding};
use crate::resource::{DescriptorPool, SharedDescriptorSet, SharedModelPool};
use crate::utils::ChangeCursor;
use crate::{engine_bail_violation, engine_trace};

const SOURCE: &str = "lumen::GraphicsPipeline";

pub struct GraphicsPipeline {
    core: PipelineCore,
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
    layout: VertexLayout,
    config: GraphicsPipelineConfig,
    extent: Extent2D,
    model_pools: Vec<(SharedModelPool, ChangeCursor)>,
}

impl GraphicsPipeline {
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        vertex_shader: impl Into<PathBuf>,
        fragment_shader: impl Into<PathBuf>,
        extent: Extent2D,
    ) -> Self {
        Self {
            core: PipelineCore::new(device, SOURCE),
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
            layout: VertexLayout::default(),
            config: GraphicsPipelineConfig::default(),
            extent,
            model_pools: Vec::new(),
        }
    }

    // ===== CONFIGURATION =====

    /// Add a vertex buffer binding; matrix attributes are expanded by row
    pub fn attach_vertex_binding(&mut self, binding: VertexBinding) -> Result<()> {
        let max_attributes = self.core.device().limits().max_vertex_attributes;
        self.layout.attach(binding, max_attributes)?;
        self.core.mark_dirty();
        Ok(())
    }

    /// Draw `pool` every frame this pipeline is recorded
    pub fn attach_model_pool(&mut self, pool: SharedModelPool) {
        self.model_pools.push((pool, ChangeCursor::new()));
        self.core.mark_dirty();
    }

    pub fn set_config(&mut self, config: GraphicsPipelineConfig) {
        self.config = config;
        self.core.mark_dirty();
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.core.set_priority(priority);
    }

    pub fn config(&self) -> &GraphicsPipelineConfig {
        &self.config
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn vertex_bindings(&self) -> &[VertexBinding] {
        self.layout.bindings()
    }

    pub fn model_pools(&self) -> impl Iterator<Item = &SharedModelPool> {
        self.model_pools.iter().map(|(pool, _)| pool)
    }

    // ===== BUILD =====

    /// Every declared binding must have a stream in each attached model pool
    fn validate_pool_streams(&self) -> Result<()> {
        if self.model_pools.is_empty() {
            return Ok(());
        }
        if !self.layout.bindings().iter().any(|b| b.binding == 0) {
            engine_bail_violation!(SOURCE, "Model pools need vertex binding 0 for their mesh");
        }
        for (pool, _) in &self.model_pools {
            let pool = pool.lock();
            for binding in self.layout.bindings().iter().filter(|b| b.binding != 0) {
                if pool.instance_buffer(binding.binding).is_none() {
                    engine_bail_violation!(SOURCE,
                        "Vertex binding {} has no per-instance buffer in an attached model pool",
                        binding.binding);
                }
            }
        }
        Ok(())
    }

    /// Descriptor sets bound by the attached model pools
    fn pool_sets(&self) -> Vec<(u32, SharedDescriptorSet)> {
        let mut sets = Vec::new();
        for (pool, _) in &self.model_pools {
            let pool = pool.lock();
            sets.extend(pool.descriptor_sets().iter().map(|(&index, set)| (index, Arc::clone(set))));
        }
        sets
    }

    fn try_build(&self) -> Result<Arc<dyn DevicePipeline>> {
        let set_layouts = self.core.prepare(&self.pool_sets())?;
        self.validate_pool_streams()?;

        let device = Arc::clone(self.core.device());
        let vertex_shader = create_module(device.as_ref(), &self.vertex_shader, ShaderStage::Vertex)?;
        let fragment_shader = create_module(device.as_ref(), &self.fragment_shader, ShaderStage::Fragment)?;

        device.create_graphics_pipeline(&GraphicsPipelineDesc {
            vertex_shader,
            fragment_shader,
            vertex_bindings: self.layout.binding_descs(),
            vertex_attributes: self.layout.attribute_descs(),
            set_layouts,
            config: self.config,
        })
    }
}

impl Pipeline for GraphicsPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Graphics
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
        // Every cursor advances, even when the own flag already answers
        let mut changed = self.core.take_changed();
        for (pool, cursor) in &mut self.model_pools {
            changed |= pool.lock().has_changed(cursor);
        }
        changed
    }

    fn flush(&mut self) -> Result<()> {
        for (pool, _) in &self.model_pools {
            pool.lock().flush()?;
        }
        Ok(())
    }

    fn refresh_descriptor_sets(&mut self) -> Result<()> {
        self.core.refresh_sets()?;
        let mut updated = false;
        for (pool, _) in &self.model_pools {
            let pool = pool.lock();
            for set in pool.descriptor_sets().values() {
                let mut set = set.lock();
                if set.needs_update() {
                    set.update_set()?;
                    updated = true;
                }
            }
        }
        if updated {
            // Re-record so the draws see the new set contents
            self.core.mark_changed();
        }
        Ok(())
    }

    fn attach_to_command_buffer(&self, cmd: &mut dyn CommandList) -> Result<u32> {
        let pipeline = self.core.bind(cmd)?;
        cmd.set_viewport(Viewport::from_extent(self.extent))?;
        cmd.set_scissor(Rect2D::from_extent(self.extent))?;

        let mut draws = 0;
        for (pool, _) in &self.model_pools {
            draws += pool.lock().record(cmd, pipeline.as_ref())?;
        }
        engine_trace!(SOURCE, "Recorded {} draw commands from {} model pools", draws, self.model_pools.len());
        Ok(draws)
    }

    fn set_extent(&mut self, width: u32, height: u32) {
        self.extent = Extent2D::new(width, height);
        self.core.mark_dirty();
    }
}
