/// Device pipeline descriptors and fixed-function state

use std::any::Any;
use std::sync::Arc;
use crate::device::{DeviceDescriptorLayout, ShaderModule, TextureFormat};

/// Vertex attribute formats
///
/// `Mat3` and `Mat4` occupy one location per row; the pipeline layer
/// expands them before they reach a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float,
    Vec2,
    Vec3,
    Vec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Mat3,
    Mat4,
}

/// Byte distance between two consecutive rows of a matrix attribute
pub const MATRIX_ROW_STRIDE: u32 = 16;

impl VertexFormat {
    /// Number of consecutive locations this format consumes
    pub fn location_count(&self) -> u32 {
        match self {
            VertexFormat::Mat3 => 3,
            VertexFormat::Mat4 => 4,
            _ => 1,
        }
    }

    /// Format of a single location (the row format for matrices)
    pub fn row_format(&self) -> VertexFormat {
        match self {
            VertexFormat::Mat3 => VertexFormat::Vec3,
            VertexFormat::Mat4 => VertexFormat::Vec4,
            other => *other,
        }
    }

    /// Size in bytes as laid out in a vertex stream
    pub fn size(&self) -> u32 {
        match self {
            VertexFormat::Float | VertexFormat::UInt | VertexFormat::Int => 4,
            VertexFormat::Vec2 | VertexFormat::UVec2 | VertexFormat::IVec2 => 8,
            VertexFormat::Vec3 | VertexFormat::UVec3 | VertexFormat::IVec3 => 12,
            VertexFormat::Vec4 | VertexFormat::UVec4 | VertexFormat::IVec4 => 16,
            VertexFormat::Mat3 => 3 * MATRIX_ROW_STRIDE,
            VertexFormat::Mat4 => 4 * MATRIX_ROW_STRIDE,
        }
    }

    pub fn is_matrix(&self) -> bool {
        self.location_count() > 1
    }
}

/// Whether a binding advances per vertex or per instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

/// One vertex buffer binding as seen by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBindingDesc {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// One single-location attribute as seen by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDesc {
    pub location: u32,
    pub binding: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    Always,
}

/// Fixed-function state of a graphics pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphicsPipelineConfig {
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    /// Standard alpha blending on the color attachment
    pub blend_enable: bool,
    pub color_format: TextureFormat,
    pub depth_format: Option<TextureFormat>,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            polygon_mode: PolygonMode::Fill,
            depth_test: false,
            depth_write: false,
            depth_compare: CompareOp::Less,
            blend_enable: false,
            color_format: TextureFormat::R8G8B8A8_UNORM,
            depth_format: None,
        }
    }
}

/// Everything a backend needs to create a graphics pipeline
#[derive(Clone)]
pub struct GraphicsPipelineDesc {
    pub vertex_shader: Arc<dyn ShaderModule>,
    pub fragment_shader: Arc<dyn ShaderModule>,
    pub vertex_bindings: Vec<VertexBindingDesc>,
    pub vertex_attributes: Vec<VertexAttributeDesc>,
    /// Set layouts indexed by set number
    pub set_layouts: Vec<Arc<dyn DeviceDescriptorLayout>>,
    pub config: GraphicsPipelineConfig,
}

#[derive(Clone)]
pub struct ComputePipelineDesc {
    pub shader: Arc<dyn ShaderModule>,
    pub set_layouts: Vec<Arc<dyn DeviceDescriptorLayout>>,
}

/// A hit group: closest-hit plus optional any-hit and intersection
#[derive(Clone)]
pub struct HitGroupDesc {
    pub closest_hit: Arc<dyn ShaderModule>,
    pub any_hit: Option<Arc<dyn ShaderModule>>,
    pub intersection: Option<Arc<dyn ShaderModule>>,
}

#[derive(Clone)]
pub struct RaytracePipelineDesc {
    pub ray_generation: Arc<dyn ShaderModule>,
    pub miss: Vec<Arc<dyn ShaderModule>>,
    pub hit_groups: Vec<HitGroupDesc>,
    pub max_recursion_depth: u32,
    pub set_layouts: Vec<Arc<dyn DeviceDescriptorLayout>>,
}

/// Where a pipeline is bound in a command list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
    RayTracing,
}

/// A compiled device pipeline with its layout
pub trait DevicePipeline: Send + Sync {
    fn bind_point(&self) -> PipelineBindPoint;
    fn as_any(&self) -> &dyn Any;
}
