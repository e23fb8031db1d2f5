/// Command recording trait

use std::any::Any;
use crate::error::Result;
use crate::device::{DeviceBuffer, DeviceDescriptorSet, DevicePipeline, DeviceTexture};

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Viewport transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with a [0, 1] depth range
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self { x: 0, y: 0, width: extent.width, height: extent.height }
    }
}

/// Index element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

/// Integer types an index buffer can hold
pub trait IndexElement: bytemuck::Pod {}

impl IndexElement for u16 {}
impl IndexElement for u32 {}

/// Targets of a dynamic rendering scope
pub struct RenderingInfo<'a> {
    pub color: &'a dyn DeviceTexture,
    pub depth: Option<&'a dyn DeviceTexture>,
    pub clear_color: [f32; 4],
    pub extent: Extent2D,
}

/// Records GPU commands for later submission
pub trait CommandList: Send {
    fn begin(&mut self) -> Result<()>;
    fn end(&mut self) -> Result<()>;

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()>;
    fn end_rendering(&mut self) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;
    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;

    fn bind_pipeline(&mut self, pipeline: &dyn DevicePipeline) -> Result<()>;

    /// Bind `sets` starting at set index `first_set` using `pipeline`'s layout
    fn bind_descriptor_sets(
        &mut self,
        pipeline: &dyn DevicePipeline,
        first_set: u32,
        sets: &[&dyn DeviceDescriptorSet],
    ) -> Result<()>;

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &dyn DeviceBuffer, offset: u64) -> Result<()>;
    fn bind_index_buffer(&mut self, buffer: &dyn DeviceBuffer, offset: u64, index_type: IndexType) -> Result<()>;

    fn draw_indirect(&mut self, buffer: &dyn DeviceBuffer, offset: u64, draw_count: u32, stride: u32) -> Result<()>;
    fn draw_indexed_indirect(&mut self, buffer: &dyn DeviceBuffer, offset: u64, draw_count: u32, stride: u32) -> Result<()>;

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()>;
    fn trace_rays(&mut self, width: u32, height: u32, depth: u32) -> Result<()>;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}
