/// Mock GraphicsDevice for unit tests
///
/// Buffers and textures keep their bytes in host memory so tests can check
/// staged uploads byte for byte. Command lists record [`MockCommand`]s and
/// every submission is kept for inspection.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

use crate::device::*;
use crate::error::{Error, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Recorded commands
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    Begin,
    End,
    BeginRendering { color: u64, depth: Option<u64>, extent: Extent2D },
    EndRendering,
    SetViewport(Viewport),
    SetScissor(Rect2D),
    BindPipeline { pipeline: u64, bind_point: PipelineBindPoint },
    BindDescriptorSets { first_set: u32, sets: Vec<u64> },
    BindVertexBuffer { binding: u32, buffer: u64 },
    BindIndexBuffer { buffer: u64 },
    DrawIndirect { buffer: u64, draw_count: u32, stride: u32 },
    DrawIndexedIndirect { buffer: u64, draw_count: u32, stride: u32 },
    Dispatch(u32, u32, u32),
    TraceRays(u32, u32, u32),
}

impl MockCommand {
    pub fn is_draw(&self) -> bool {
        matches!(self, MockCommand::DrawIndirect { .. } | MockCommand::DrawIndexedIndirect { .. })
    }
}

// ============================================================================
// Resources
// ============================================================================

pub struct MockBuffer {
    pub id: u64,
    desc: BufferDesc,
    data: Mutex<Vec<u8>>,
    live: Arc<AtomicUsize>,
}

impl MockBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl DeviceBuffer for MockBuffer {
    fn size(&self) -> u64 {
        self.desc.size
    }

    fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    fn location(&self) -> MemoryLocation {
        self.desc.location
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.desc.location.is_host_accessible() {
            return Err(Error::InvalidResource("mock buffer is not host accessible".to_string()));
        }
        let mut bytes = self.data.lock();
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(Error::InvalidResource("mock write out of bounds".to_string()));
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        if !self.desc.location.is_host_accessible() {
            return Err(Error::InvalidResource("mock buffer is not host accessible".to_string()));
        }
        let bytes = self.data.lock();
        let start = offset as usize;
        let end = start + out.len();
        if end > bytes.len() {
            return Err(Error::InvalidResource("mock read out of bounds".to_string()));
        }
        out.copy_from_slice(&bytes[start..end]);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct MockTexture {
    pub id: u64,
    desc: TextureDesc,
    data: Mutex<Vec<u8>>,
}

impl MockTexture {
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl DeviceTexture for MockTexture {
    fn width(&self) -> u32 {
        self.desc.width
    }
    fn height(&self) -> u32 {
        self.desc.height
    }
    fn format(&self) -> TextureFormat {
        self.desc.format
    }
    fn usage(&self) -> TextureUsage {
        self.desc.usage
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockShaderModule {
    pub id: u64,
    stage: ShaderStage,
    entry_point: String,
}

impl ShaderModule for MockShaderModule {
    fn stage(&self) -> ShaderStage {
        self.stage
    }
    fn entry_point(&self) -> &str {
        &self.entry_point
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockDescriptorLayout {
    pub id: u64,
    descriptors: Vec<Descriptor>,
}

impl DeviceDescriptorLayout for MockDescriptorLayout {
    fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockDescriptorPool {
    pub id: u64,
    max_sets: u32,
    allocated: Arc<AtomicUsize>,
}

impl MockDescriptorPool {
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl DeviceDescriptorPool for MockDescriptorPool {
    fn max_sets(&self) -> u32 {
        self.max_sets
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// What one binding of a mock set currently points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockWrite {
    Buffer { buffer: u64, offset: u64, range: u64 },
    Texture(u64),
    AccelerationStructure,
}

pub struct MockDescriptorSet {
    pub id: u64,
    writes: Mutex<BTreeMap<u32, MockWrite>>,
    updates: AtomicUsize,
    pool_allocated: Arc<AtomicUsize>,
}

impl MockDescriptorSet {
    pub fn writes(&self) -> BTreeMap<u32, MockWrite> {
        self.writes.lock().clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }
}

impl DeviceDescriptorSet for MockDescriptorSet {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for MockDescriptorSet {
    fn drop(&mut self) {
        self.pool_allocated.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct MockAccelerationStructure;

impl AccelerationStructure for MockAccelerationStructure {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Summary of what a pipeline was created from
#[derive(Debug, Clone)]
pub struct MockPipelineInfo {
    pub bind_point: PipelineBindPoint,
    pub vertex_bindings: Vec<VertexBindingDesc>,
    pub vertex_attributes: Vec<VertexAttributeDesc>,
    pub set_layouts: Vec<u64>,
    pub shader_count: usize,
    pub max_recursion_depth: u32,
}

pub struct MockPipeline {
    pub id: u64,
    pub info: MockPipelineInfo,
}

impl DevicePipeline for MockPipeline {
    fn bind_point(&self) -> PipelineBindPoint {
        self.info.bind_point
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockCommandList {
    pub commands: Vec<MockCommand>,
    recording: bool,
    in_rendering: bool,
}

fn require_recording(recording: bool) -> Result<()> {
    if recording {
        Ok(())
    } else {
        Err(Error::BackendError("Command list not recording".to_string()))
    }
}

impl CommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.recording {
            return Err(Error::BackendError("Command list already recording".to_string()));
        }
        self.commands.clear();
        self.recording = true;
        self.commands.push(MockCommand::Begin);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        require_recording(self.recording)?;
        if self.in_rendering {
            return Err(Error::BackendError("Rendering not ended".to_string()));
        }
        self.recording = false;
        self.commands.push(MockCommand::End);
        Ok(())
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()> {
        require_recording(self.recording)?;
        let color = texture_id(info.color)?;
        let depth = match info.depth {
            Some(d) => Some(texture_id(d)?),
            None => None,
        };
        self.in_rendering = true;
        self.commands.push(MockCommand::BeginRendering { color, depth, extent: info.extent });
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        require_recording(self.recording)?;
        self.in_rendering = false;
        self.commands.push(MockCommand::EndRendering);
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        require_recording(self.recording)?;
        self.commands.push(MockCommand::SetViewport(viewport));
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        require_recording(self.recording)?;
        self.commands.push(MockCommand::SetScissor(scissor));
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &dyn DevicePipeline) -> Result<()> {
        require_recording(self.recording)?;
        let id = pipeline_id(pipeline)?;
        self.commands.push(MockCommand::BindPipeline { pipeline: id, bind_point: pipeline.bind_point() });
        Ok(())
    }

    fn bind_descriptor_sets(
        &mut self,
        _pipeline: &dyn DevicePipeline,
        first_set: u32,
        sets: &[&dyn DeviceDescriptorSet],
    ) -> Result<()> {
        require_recording(self.recording)?;
        let ids = sets.iter().map(|s| set_id(*s)).collect::<Result<Vec<_>>>()?;
        self.commands.push(MockCommand::BindDescriptorSets { first_set, sets: ids });
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &dyn DeviceBuffer, _offset: u64) -> Result<()> {
        require_recording(self.recording)?;
        self.commands.push(MockCommand::BindVertexBuffer { binding, buffer: buffer_id(buffer)? });
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &dyn DeviceBuffer, _offset: u64, _index_type: IndexType) -> Result<()> {
        require_recording(self.recording)?;
        self.commands.push(MockCommand::BindIndexBuffer { buffer: buffer_id(buffer)? });
        Ok(())
    }

    fn draw_indirect(&mut self, buffer: &dyn DeviceBuffer, _offset: u64, draw_count: u32, stride: u32) -> Result<()> {
        require_recording(self.recording)?;
        self.commands.push(MockCommand::DrawIndirect { buffer: buffer_id(buffer)?, draw_count, stride });
        Ok(())
    }

    fn draw_indexed_indirect(&mut self, buffer: &dyn DeviceBuffer, _offset: u64, draw_count: u32, stride: u32) -> Result<()> {
        require_recording(self.recording)?;
        self.commands.push(MockCommand::DrawIndexedIndirect { buffer: buffer_id(buffer)?, draw_count, stride });
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        require_recording(self.recording)?;
        self.commands.push(MockCommand::Dispatch(x, y, z));
        Ok(())
    }

    fn trace_rays(&mut self, width: u32, height: u32, depth: u32) -> Result<()> {
        require_recording(self.recording)?;
        self.commands.push(MockCommand::TraceRays(width, height, depth));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Downcast helpers
// ============================================================================

pub fn mock_buffer(buffer: &dyn DeviceBuffer) -> Result<&MockBuffer> {
    buffer
        .as_any()
        .downcast_ref::<MockBuffer>()
        .ok_or_else(|| Error::InvalidResource("not a mock buffer".to_string()))
}

pub fn buffer_id(buffer: &dyn DeviceBuffer) -> Result<u64> {
    Ok(mock_buffer(buffer)?.id)
}

fn texture_id(texture: &dyn DeviceTexture) -> Result<u64> {
    texture
        .as_any()
        .downcast_ref::<MockTexture>()
        .map(|t| t.id)
        .ok_or_else(|| Error::InvalidResource("not a mock texture".to_string()))
}

fn pipeline_id(pipeline: &dyn DevicePipeline) -> Result<u64> {
    pipeline
        .as_any()
        .downcast_ref::<MockPipeline>()
        .map(|p| p.id)
        .ok_or_else(|| Error::InvalidResource("not a mock pipeline".to_string()))
}

pub fn mock_set(set: &dyn DeviceDescriptorSet) -> Result<&MockDescriptorSet> {
    set.as_any()
        .downcast_ref::<MockDescriptorSet>()
        .ok_or_else(|| Error::InvalidResource("not a mock descriptor set".to_string()))
}

fn set_id(set: &dyn DeviceDescriptorSet) -> Result<u64> {
    Ok(mock_set(set)?.id)
}

fn layout_id(layout: &dyn DeviceDescriptorLayout) -> Result<u64> {
    layout
        .as_any()
        .downcast_ref::<MockDescriptorLayout>()
        .map(|l| l.id)
        .ok_or_else(|| Error::InvalidResource("not a mock descriptor layout".to_string()))
}

// ============================================================================
// Device
// ============================================================================

pub struct MockDevice {
    limits: DeviceLimits,
    live_buffers: Arc<AtomicUsize>,
    buffers_created: AtomicUsize,
    copies: AtomicUsize,
    pipelines_created: AtomicUsize,
    fail_pipelines: AtomicBool,
    fail_shaders: AtomicBool,
    last_pipeline: Mutex<Option<MockPipelineInfo>>,
    submissions: Mutex<Vec<Vec<MockCommand>>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits {
            min_uniform_offset_alignment: 256,
            min_storage_offset_alignment: 64,
            max_bound_descriptor_sets: 4,
            max_vertex_attributes: 16,
            multi_draw_indirect: true,
            ray_tracing: true,
        })
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            live_buffers: Arc::new(AtomicUsize::new(0)),
            buffers_created: AtomicUsize::new(0),
            copies: AtomicUsize::new(0),
            pipelines_created: AtomicUsize::new(0),
            fail_pipelines: AtomicBool::new(false),
            fail_shaders: AtomicBool::new(false),
            last_pipeline: Mutex::new(None),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Device buffers currently alive (staging included)
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::Relaxed)
    }

    pub fn buffers_created(&self) -> usize {
        self.buffers_created.load(Ordering::Relaxed)
    }

    pub fn copy_count(&self) -> usize {
        self.copies.load(Ordering::Relaxed)
    }

    pub fn pipelines_created(&self) -> usize {
        self.pipelines_created.load(Ordering::Relaxed)
    }

    /// What the most recent successful pipeline creation received
    pub fn last_pipeline_info(&self) -> Option<MockPipelineInfo> {
        self.last_pipeline.lock().clone()
    }

    pub fn set_fail_pipelines(&self, fail: bool) {
        self.fail_pipelines.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_shaders(&self, fail: bool) {
        self.fail_shaders.store(fail, Ordering::Relaxed);
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn last_submission(&self) -> Vec<MockCommand> {
        self.submissions.lock().last().cloned().unwrap_or_default()
    }

    fn pipeline_result(&self, info: MockPipelineInfo) -> Result<Arc<dyn DevicePipeline>> {
        if self.fail_pipelines.load(Ordering::Relaxed) {
            return Err(Error::BackendError("mock pipeline creation failed".to_string()));
        }
        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
        *self.last_pipeline.lock() = Some(info.clone());
        Ok(Arc::new(MockPipeline { id: next_id(), info }))
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn DeviceBuffer>> {
        if desc.size == 0 {
            return Err(Error::InvalidResource("zero-sized buffer".to_string()));
        }
        self.buffers_created.fetch_add(1, Ordering::Relaxed);
        self.live_buffers.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockBuffer {
            id: next_id(),
            desc: desc.clone(),
            data: Mutex::new(vec![0u8; desc.size as usize]),
            live: Arc::clone(&self.live_buffers),
        }))
    }

    fn copy_buffer(
        &self,
        src: &dyn DeviceBuffer,
        src_offset: u64,
        dst: &dyn DeviceBuffer,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        let src = mock_buffer(src)?;
        let dst = mock_buffer(dst)?;
        if src_offset + size > src.desc.size || dst_offset + size > dst.desc.size {
            return Err(Error::BackendError("mock copy out of bounds".to_string()));
        }
        let (s, d, n) = (src_offset as usize, dst_offset as usize, size as usize);
        if src.id == dst.id {
            src.data.lock().copy_within(s..s + n, d);
        } else {
            let bytes = src.data.lock()[s..s + n].to_vec();
            dst.data.lock()[d..d + n].copy_from_slice(&bytes);
        }
        self.copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn DeviceTexture>> {
        Ok(Arc::new(MockTexture {
            id: next_id(),
            desc: desc.clone(),
            data: Mutex::new(vec![0u8; desc.byte_size() as usize]),
        }))
    }

    fn copy_buffer_to_texture(&self, src: &dyn DeviceBuffer, dst: &dyn DeviceTexture) -> Result<()> {
        let src = mock_buffer(src)?;
        let dst = dst
            .as_any()
            .downcast_ref::<MockTexture>()
            .ok_or_else(|| Error::InvalidResource("not a mock texture".to_string()))?;
        let mut texels = dst.data.lock();
        let n = texels.len();
        texels.copy_from_slice(&src.data.lock()[..n]);
        self.copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<Arc<dyn ShaderModule>> {
        if self.fail_shaders.load(Ordering::Relaxed) {
            return Err(Error::BackendError("mock shader module creation failed".to_string()));
        }
        Ok(Arc::new(MockShaderModule {
            id: next_id(),
            stage: desc.stage,
            entry_point: desc.entry_point.to_string(),
        }))
    }

    fn create_descriptor_layout(&self, descriptors: &[Descriptor]) -> Result<Arc<dyn DeviceDescriptorLayout>> {
        Ok(Arc::new(MockDescriptorLayout { id: next_id(), descriptors: descriptors.to_vec() }))
    }

    fn create_descriptor_pool(
        &self,
        _layout: &dyn DeviceDescriptorLayout,
        max_sets: u32,
    ) -> Result<Arc<dyn DeviceDescriptorPool>> {
        Ok(Arc::new(MockDescriptorPool {
            id: next_id(),
            max_sets,
            allocated: Arc::new(AtomicUsize::new(0)),
        }))
    }

    fn allocate_descriptor_set(
        &self,
        pool: &dyn DeviceDescriptorPool,
        _layout: &dyn DeviceDescriptorLayout,
    ) -> Result<Box<dyn DeviceDescriptorSet>> {
        let pool = pool
            .as_any()
            .downcast_ref::<MockDescriptorPool>()
            .ok_or_else(|| Error::InvalidResource("not a mock descriptor pool".to_string()))?;
        if pool.allocated() >= pool.max_sets as usize {
            return Err(Error::OutOfMemory);
        }
        pool.allocated.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockDescriptorSet {
            id: next_id(),
            writes: Mutex::new(BTreeMap::new()),
            updates: AtomicUsize::new(0),
            pool_allocated: Arc::clone(&pool.allocated),
        }))
    }

    fn update_descriptor_set(&self, set: &dyn DeviceDescriptorSet, writes: &[DescriptorWrite]) -> Result<()> {
        let set = mock_set(set)?;
        let mut bound = set.writes.lock();
        for write in writes {
            let value = match &write.resource {
                DescriptorResource::Buffer { buffer, offset, range } => MockWrite::Buffer {
                    buffer: buffer_id(*buffer)?,
                    offset: *offset,
                    range: *range,
                },
                DescriptorResource::Texture(texture) => MockWrite::Texture(texture_id(*texture)?),
                DescriptorResource::AccelerationStructure(_) => MockWrite::AccelerationStructure,
            };
            bound.insert(write.binding, value);
        }
        set.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<dyn DevicePipeline>> {
        let set_layouts = desc.set_layouts.iter().map(|l| layout_id(l.as_ref())).collect::<Result<Vec<_>>>()?;
        self.pipeline_result(MockPipelineInfo {
            bind_point: PipelineBindPoint::Graphics,
            vertex_bindings: desc.vertex_bindings.clone(),
            vertex_attributes: desc.vertex_attributes.clone(),
            set_layouts,
            shader_count: 2,
            max_recursion_depth: 0,
        })
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<Arc<dyn DevicePipeline>> {
        let set_layouts = desc.set_layouts.iter().map(|l| layout_id(l.as_ref())).collect::<Result<Vec<_>>>()?;
        self.pipeline_result(MockPipelineInfo {
            bind_point: PipelineBindPoint::Compute,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            set_layouts,
            shader_count: 1,
            max_recursion_depth: 0,
        })
    }

    fn create_raytrace_pipeline(&self, desc: &RaytracePipelineDesc) -> Result<Arc<dyn DevicePipeline>> {
        if !self.limits.ray_tracing {
            return Err(Error::Unsupported("mock device without ray tracing".to_string()));
        }
        let set_layouts = desc.set_layouts.iter().map(|l| layout_id(l.as_ref())).collect::<Result<Vec<_>>>()?;
        let hit_shaders: usize = desc
            .hit_groups
            .iter()
            .map(|g| 1 + g.any_hit.is_some() as usize + g.intersection.is_some() as usize)
            .sum();
        self.pipeline_result(MockPipelineInfo {
            bind_point: PipelineBindPoint::RayTracing,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            set_layouts,
            shader_count: 1 + desc.miss.len() + hit_shaders,
            max_recursion_depth: desc.max_recursion_depth,
        })
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(MockCommandList { commands: Vec::new(), recording: false, in_rendering: false }))
    }

    fn submit(&self, commands: &dyn CommandList) -> Result<()> {
        let list = commands
            .as_any()
            .downcast_ref::<MockCommandList>()
            .ok_or_else(|| Error::InvalidResource("not a mock command list".to_string()))?;
        if list.recording {
            return Err(Error::BackendError("submitting a command list that is still recording".to_string()));
        }
        self.submissions.lock().push(list.commands.clone());
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        Ok(())
    }
}
