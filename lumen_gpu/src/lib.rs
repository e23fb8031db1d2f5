/*!
# Lumen GPU

Backend-agnostic GPU abstraction layer.

Lumen wraps a native GPU API behind a small set of traits and builds a
resource layer on top of them: buffers with single or double device copies
and staged host uploads, descriptor pools and sets, model pools drawn with
indirect commands, and graphics, compute and ray tracing pipelines.

## Architecture

- **GraphicsDevice**: trait implemented by backends (see `lumen_gpu_vulkan`)
- **Buffer / Texture**: device memory with an owned host mirror
- **DescriptorPool / DescriptorSet**: resource bindings shared by pipelines
- **ModelPool**: per-instance streams and an indirect draw array
- **GraphicsPipeline / ComputePipeline / RaytracePipeline**: build state machine
- **Renderer**: resource factory and frame driver
*/

// Internal modules
mod error;
mod utils;
pub mod config;
pub mod device;
pub mod log;
pub mod pipeline;
pub mod renderer;
pub mod resource;

// Main lumen namespace module
pub mod lumen {
    // Error types
    pub use crate::error::{Error, Result};

    // Configuration
    pub use crate::config::Config;

    // Renderer
    pub use crate::renderer::{Renderer, RendererStats};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{
            reset_logger, set_logger, set_min_severity, DefaultLogger, LogEntry, LogSeverity, Logger,
        };
    }

    // Device sub-module: backend traits and descriptors
    pub mod device {
        pub use crate::device::*;
    }

    // Resource sub-module
    pub mod resource {
        pub use crate::resource::*;
        pub use crate::utils::ChangeCursor;
    }

    // Pipeline sub-module
    pub mod pipeline {
        pub use crate::pipeline::*;
    }
}

// Re-export math library at crate root
pub use glam;
