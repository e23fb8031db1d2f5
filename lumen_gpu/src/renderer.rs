/// Lumen renderer: resource factory and frame driver
///
/// The renderer owns the device handle and the offscreen targets. It creates
/// every resource type and records one command list per frame from the
/// pipelines it is given, reusing the previous recording when nothing changed.

use std::path::PathBuf;
use std::sync::Arc;

use bytemuck::Pod;

use crate::config::Config;
use crate::device::{
    Descriptor, Extent2D, GraphicsDevice, GraphicsPipelineConfig, IndexElement, RenderingInfo, TextureFormat,
};
use crate::device::CommandList;
use crate::error::Result;
use crate::pipeline::{ComputePipeline, GraphicsPipeline, Pipeline, PipelineKind, PipelineState, RaytracePipeline};
use crate::resource::{
    Buffer, BufferChain, BufferInfo, BufferKind, DescriptorPool, ModelPool, SharedBuffer, SharedModelPool, Texture,
};
use crate::{engine_debug, engine_info, engine_trace, engine_violation};

const SOURCE: &str = "lumen::Renderer";

/// Frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// Frames submitted
    pub frames: u64,
    /// Times the command list was recorded
    pub recordings: u64,
    /// Draw and dispatch commands in the current recording
    pub draws_last_recording: u32,
}

pub struct Renderer {
    device: Arc<dyn GraphicsDevice>,
    config: Config,
    color_target: Texture,
    depth_target: Option<Texture>,
    /// Last recorded command list, resubmitted while nothing changes
    commands: Option<Box<dyn CommandList>>,
    /// Pipeline count of the cached recording
    recorded_pipelines: usize,
    stats: RendererStats,
}

impl Renderer {
    /// Create a renderer drawing into offscreen targets of `config.extent`
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is zero or the device cannot create
    /// the color or depth target.
    pub fn new(device: Arc<dyn GraphicsDevice>, config: Config) -> Result<Self> {
        let (color_target, depth_target) = Self::create_targets(device.as_ref(), &config, config.extent)?;

        engine_info!(SOURCE, "Renderer created ({}x{}, {:?}{})",
            config.extent.width, config.extent.height, config.color_format,
            if depth_target.is_some() { ", depth" } else { "" });

        Ok(Self {
            device,
            config,
            color_target,
            depth_target,
            commands: None,
            recorded_pipelines: 0,
            stats: RendererStats::default(),
        })
    }

    fn create_targets(
        device: &dyn GraphicsDevice,
        config: &Config,
        extent: Extent2D,
    ) -> Result<(Texture, Option<Texture>)> {
        let color = Texture::attachment(device, config.color_format, extent)?;
        let depth = match config.depth_format {
            Some(format) => Some(Texture::attachment(device, format, extent)?),
            None => None,
        };
        Ok((color, depth))
    }

    // ===== ACCESSORS =====

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn extent(&self) -> Extent2D {
        self.config.extent
    }

    pub fn color_target(&self) -> &Texture {
        &self.color_target
    }

    pub fn depth_target(&self) -> Option<&Texture> {
        self.depth_target.as_ref()
    }

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    // ===== BUFFER FACTORY =====

    /// Create a buffer of any kind
    ///
    /// `data` fills the leading bytes of every slot; the rest is zero.
    pub fn create_buffer(
        &self,
        kind: BufferKind,
        chain: BufferChain,
        data: &[u8],
        element_size: u64,
        element_count: u32,
        modifiable: bool,
    ) -> Result<SharedBuffer> {
        let info = BufferInfo::new(kind, chain, element_size, element_count).modifiable(modifiable);
        Ok(Buffer::new(Arc::clone(&self.device), info, data)?.into_shared())
    }

    /// Single-chain vertex buffer, one element per vertex
    pub fn create_vertex_buffer<T: Pod>(&self, vertices: &[T]) -> Result<SharedBuffer> {
        self.create_buffer(
            BufferKind::Vertex,
            BufferChain::Single,
            bytemuck::cast_slice(vertices),
            std::mem::size_of::<T>() as u64,
            vertices.len() as u32,
            false,
        )
    }

    /// Single-chain index buffer of `u16` or `u32` elements
    pub fn create_index_buffer<T: IndexElement>(&self, indices: &[T]) -> Result<SharedBuffer> {
        self.create_buffer(
            BufferKind::Index,
            BufferChain::Single,
            bytemuck::cast_slice(indices),
            std::mem::size_of::<T>() as u64,
            indices.len() as u32,
            false,
        )
    }

    pub fn create_uniform_buffer(
        &self,
        data: &[u8],
        chain: BufferChain,
        element_size: u64,
        element_count: u32,
        modifiable: bool,
    ) -> Result<SharedBuffer> {
        self.create_buffer(BufferKind::Uniform, chain, data, element_size, element_count, modifiable)
    }

    pub fn create_storage_buffer(
        &self,
        data: &[u8],
        chain: BufferChain,
        element_size: u64,
        element_count: u32,
        modifiable: bool,
    ) -> Result<SharedBuffer> {
        self.create_buffer(BufferKind::Storage, chain, data, element_size, element_count, modifiable)
    }

    /// Sampled texture filled from tightly packed `pixels`
    pub fn create_texture_buffer(
        &self,
        pixels: &[u8],
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Arc<Texture>> {
        Ok(Arc::new(Texture::from_pixels(self.device.as_ref(), pixels, format, width, height)?))
    }

    // ===== DESCRIPTOR FACTORY =====

    pub fn create_descriptor_pool(&self, descriptors: Vec<Descriptor>, max_sets: u32) -> Result<DescriptorPool> {
        DescriptorPool::new(Arc::clone(&self.device), descriptors, max_sets)
    }

    // ===== MODEL POOL FACTORY =====

    /// Indexed model pool drawing `index` over `vertex` once per model
    pub fn create_model_pool(&self, vertex: SharedBuffer, index: SharedBuffer, capacity: u32) -> Result<SharedModelPool> {
        Ok(ModelPool::new(Arc::clone(&self.device), vertex, Some(index), capacity)?.into_shared())
    }

    /// Non-indexed model pool drawing every vertex once per model
    pub fn create_vertex_model_pool(&self, vertex: SharedBuffer, capacity: u32) -> Result<SharedModelPool> {
        Ok(ModelPool::new(Arc::clone(&self.device), vertex, None, capacity)?.into_shared())
    }

    // ===== PIPELINE FACTORY =====

    /// Graphics pipeline targeting this renderer's color and depth formats
    pub fn create_graphics_pipeline(
        &self,
        vertex_shader: impl Into<PathBuf>,
        fragment_shader: impl Into<PathBuf>,
    ) -> GraphicsPipeline {
        let mut pipeline =
            GraphicsPipeline::new(Arc::clone(&self.device), vertex_shader, fragment_shader, self.config.extent);
        let depth = self.config.depth_format.is_some();
        pipeline.set_config(GraphicsPipelineConfig {
            color_format: self.config.color_format,
            depth_format: self.config.depth_format,
            depth_test: depth,
            depth_write: depth,
            ..GraphicsPipelineConfig::default()
        });
        pipeline
    }

    pub fn create_compute_pipeline(&self, shader: impl Into<PathBuf>, x: u32, y: u32, z: u32) -> Result<ComputePipeline> {
        ComputePipeline::new(Arc::clone(&self.device), shader, x, y, z)
    }

    /// Ray tracing pipeline tracing one ray per target pixel
    pub fn create_raytrace_pipeline(&self, ray_generation: impl Into<PathBuf>) -> RaytracePipeline {
        RaytracePipeline::new(Arc::clone(&self.device), ray_generation, self.config.extent)
    }

    // ===== FRAME =====

    /// Bring `pipelines` up to date and record the frame if needed
    ///
    /// Unbuilt pipelines are built and dirty ones rebuilt. A pipeline whose
    /// last build failed is skipped until the caller builds it again.
    /// Returns whether the command list was recorded this call.
    pub fn prepare_frame(&mut self, pipelines: &mut [&mut dyn Pipeline]) -> Result<bool> {
        for pipeline in pipelines.iter_mut() {
            match pipeline.state() {
                PipelineState::Unbuilt if !pipeline.has_error() => pipeline.build()?,
                PipelineState::Dirty => pipeline.rebuild()?,
                _ => {}
            }
            if pipeline.state() == PipelineState::Built {
                pipeline.flush()?;
                pipeline.refresh_descriptor_sets()?;
            }
        }

        // Every pipeline is polled so each one consumes its own change flags
        let mut changed = false;
        for pipeline in pipelines.iter_mut() {
            changed |= pipeline.has_changed();
        }

        let record = changed
            || self.commands.is_none()
            || self.config.rebuild_commands_every_frame
            || self.recorded_pipelines != pipelines.len();
        if record {
            self.record(pipelines)?;
        } else {
            engine_trace!(SOURCE, "Reusing recorded command list");
        }
        Ok(record)
    }

    fn record(&mut self, pipelines: &[&mut dyn Pipeline]) -> Result<()> {
        // A failed recording leaves the list mid-recording; it is dropped
        let mut cmd = match self.commands.take() {
            Some(cmd) => cmd,
            None => self.device.create_command_list()?,
        };
        let (mut graphics, others): (Vec<&&mut dyn Pipeline>, Vec<&&mut dyn Pipeline>) = pipelines
            .iter()
            .filter(|p| p.state() == PipelineState::Built)
            .partition(|p| p.kind() == PipelineKind::Graphics);
        graphics.sort_by_key(|p| p.priority());

        cmd.begin()?;
        let mut draws = 0;
        for pipeline in others {
            draws += pipeline.attach_to_command_buffer(cmd.as_mut())?;
        }

        cmd.begin_rendering(&RenderingInfo {
            color: self.color_target.device_texture().as_ref(),
            depth: self.depth_target.as_ref().map(|d| d.device_texture().as_ref()),
            clear_color: self.config.clear_color,
            extent: self.config.extent,
        })?;
        for pipeline in graphics {
            draws += pipeline.attach_to_command_buffer(cmd.as_mut())?;
        }
        cmd.end_rendering()?;
        cmd.end()?;

        self.commands = Some(cmd);
        self.recorded_pipelines = pipelines.len();
        self.stats.recordings += 1;
        self.stats.draws_last_recording = draws;
        engine_debug!(SOURCE, "Recorded command list ({} pipelines, {} commands)", pipelines.len(), draws);
        Ok(())
    }

    /// Submit the recorded command list and wait for the device
    pub fn submit_frame(&mut self) -> Result<()> {
        let cmd = self
            .commands
            .as_ref()
            .ok_or_else(|| engine_violation!(SOURCE, "submit_frame() before any frame was prepared"))?;
        self.device.submit(cmd.as_ref())?;
        self.stats.frames += 1;
        Ok(())
    }

    /// `prepare_frame` followed by `submit_frame`
    pub fn render_frame(&mut self, pipelines: &mut [&mut dyn Pipeline]) -> Result<()> {
        self.prepare_frame(pipelines)?;
        self.submit_frame()
    }

    /// Recreate the offscreen targets at a new size
    ///
    /// The cached recording is dropped. Pipelines are told the new extent
    /// by the caller through [`Pipeline::set_extent`].
    pub fn rebuild(&mut self, width: u32, height: u32) -> Result<()> {
        let extent = Extent2D::new(width, height);
        self.device.wait_idle()?;
        let (color, depth) = Self::create_targets(self.device.as_ref(), &self.config, extent)?;
        self.color_target = color;
        self.depth_target = depth;
        self.config.extent = extent;
        self.commands = None;
        engine_info!(SOURCE, "Offscreen targets resized to {}x{}", width, height);
        Ok(())
    }
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
