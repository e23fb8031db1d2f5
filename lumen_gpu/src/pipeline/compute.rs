/// Compute pipeline: one compute stage and a dispatch shape

use std::path::PathBuf;
use std::sync::Arc;

use crate::device::{CommandList, ComputePipelineDesc, DevicePipeline, GraphicsDevice, ShaderStage};
use crate::error::Result;
use crate::pipeline::shader_source::create_module;
use crate::pipeline::{Pipeline, PipelineCore, PipelineKind, PipelineState};
use crate::resource::{DescriptorPool, SharedBuffer, SharedDescriptorSet};
use crate::{engine_bail_violation, engine_trace};

const SOURCE: &str = "lumen::ComputePipeline";

pub struct ComputePipeline {
    core: PipelineCore,
    shader: PathBuf,
    local_size: (u32, u32, u32),
    dispatch_buffer: Option<SharedBuffer>,
    groups: (u32, u32, u32),
    /// Dispatch size seen by the last `has_changed` poll
    polled_groups: Option<(u32, u32, u32)>,
}

impl ComputePipeline {
    pub fn new(device: Arc<dyn GraphicsDevice>, shader: impl Into<PathBuf>, x: u32, y: u32, z: u32) -> Result<Self> {
        if x == 0 || y == 0 || z == 0 {
            engine_bail_violation!(SOURCE, "Local workgroup size must be non-zero ({}, {}, {})", x, y, z);
        }
        Ok(Self {
            core: PipelineCore::new(device, SOURCE),
            shader: shader.into(),
            local_size: (x, y, z),
            dispatch_buffer: None,
            groups: (1, 1, 1),
            polled_groups: None,
        })
    }

    /// Size the dispatch from `buffer`: one invocation per element along x
    pub fn attach_dispatch_buffer(&mut self, buffer: SharedBuffer) {
        self.dispatch_buffer = Some(buffer);
        self.core.mark_dirty();
    }

    /// Fixed group count, used when no dispatch buffer is attached
    pub fn set_dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.groups = (x, y, z);
        self.core.mark_dirty();
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.core.set_priority(priority);
    }

    pub fn local_size(&self) -> (u32, u32, u32) {
        self.local_size
    }

    /// Workgroups dispatched per recording
    pub fn dispatch_size(&self) -> (u32, u32, u32) {
        match &self.dispatch_buffer {
            Some(buffer) => {
                let count = buffer.lock().element_count();
                (count.div_ceil(self.local_size.0), 1, 1)
            }
            None => self.groups,
        }
    }

    fn try_build(&self) -> Result<Arc<dyn DevicePipeline>> {
        let set_layouts = self.core.prepare(&[])?;
        let device = Arc::clone(self.core.device());
        let shader = create_module(device.as_ref(), &self.shader, ShaderStage::Compute)?;
        device.create_compute_pipeline(&ComputePipelineDesc { shader, set_layouts })
    }
}

impl Pipeline for ComputePipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Compute
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
        // A resized dispatch buffer changes the recorded group count
        let groups = self.dispatch_size();
        let resized = self.polled_groups.replace(groups) != Some(groups);
        self.core.take_changed() || resized
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn refresh_descriptor_sets(&mut self) -> Result<()> {
        self.core.refresh_sets().map(|_| ())
    }

    fn attach_to_command_buffer(&self, cmd: &mut dyn CommandList) -> Result<u32> {
        self.core.bind(cmd)?;
        let (x, y, z) = self.dispatch_size();
        cmd.dispatch(x, y, z)?;
        engine_trace!(SOURCE, "Recorded dispatch ({}, {}, {})", x, y, z);
        Ok(1)
    }

    /// Compute output does not depend on the render extent
    fn set_extent(&mut self, _width: u32, _height: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock_device::{MockCommand, MockCommandList, MockDevice};
    use crate::pipeline::test_shaders::shader_file;
    use crate::resource::{Buffer, BufferChain, BufferInfo, BufferKind};

    fn storage(device: &Arc<dyn GraphicsDevice>, count: u32) -> SharedBuffer {
        Buffer::new(Arc::clone(device), BufferInfo::new(BufferKind::Storage, BufferChain::Single, 16, count), &[])
            .unwrap()
            .into_shared()
    }

    fn recorded(device: &Arc<dyn GraphicsDevice>, pipeline: &ComputePipeline) -> Vec<MockCommand> {
        let mut cmd = device.create_command_list().unwrap();
        cmd.begin().unwrap();
        pipeline.attach_to_command_buffer(cmd.as_mut()).unwrap();
        cmd.end().unwrap();
        cmd.as_any().downcast_ref::<MockCommandList>().unwrap().commands.clone()
    }

    #[test]
    fn test_dispatch_sized_from_buffer() {
        let device: Arc<dyn GraphicsDevice> = Arc::new(MockDevice::new());
        let mut pipeline = ComputePipeline::new(Arc::clone(&device), shader_file("compute_size"), 64, 1, 1).unwrap();
        pipeline.attach_dispatch_buffer(storage(&device, 1000));
        assert_eq!(pipeline.dispatch_size(), (16, 1, 1));

        pipeline.build().unwrap();
        let commands = recorded(&device, &pipeline);
        assert!(matches!(commands[1], MockCommand::BindPipeline { .. }));
        assert_eq!(commands[2], MockCommand::Dispatch(16, 1, 1));
    }

    #[test]
    fn test_fixed_dispatch_without_buffer() {
        let device: Arc<dyn GraphicsDevice> = Arc::new(MockDevice::new());
        let mut pipeline = ComputePipeline::new(Arc::clone(&device), shader_file("compute_fixed"), 8, 8, 1).unwrap();
        pipeline.set_dispatch(4, 3, 1);
        pipeline.build().unwrap();
        assert_eq!(recorded(&device, &pipeline)[2], MockCommand::Dispatch(4, 3, 1));
    }

    #[test]
    fn test_buffer_resize_is_a_change() {
        let device: Arc<dyn GraphicsDevice> = Arc::new(MockDevice::new());
        let buffer = storage(&device, 64);
        let mut pipeline = ComputePipeline::new(Arc::clone(&device), shader_file("compute_resize"), 64, 1, 1).unwrap();
        pipeline.attach_dispatch_buffer(Arc::clone(&buffer));
        pipeline.build().unwrap();

        assert!(pipeline.has_changed());
        assert!(!pipeline.has_changed());

        buffer.lock().resize(129).unwrap();
        assert!(pipeline.has_changed());
        assert_eq!(pipeline.dispatch_size(), (3, 1, 1));
    }

    #[test]
    fn test_zero_local_size_is_rejected() {
        let device: Arc<dyn GraphicsDevice> = Arc::new(MockDevice::new());
        assert!(ComputePipeline::new(device, shader_file("compute_zero"), 0, 1, 1).is_err());
    }
}
