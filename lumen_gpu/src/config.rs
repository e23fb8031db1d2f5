//! Renderer and device configuration

use crate::device::{Extent2D, TextureFormat};
use crate::log::LogSeverity;

/// Configuration shared by the renderer and the backends
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Application name reported to the driver
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Enable backend validation layers
    pub enable_validation: bool,
    /// Size of the offscreen render target
    pub extent: Extent2D,
    /// Offscreen color format
    pub color_format: TextureFormat,
    /// Offscreen depth format (None disables the depth target)
    pub depth_format: Option<TextureFormat>,
    /// Clear color of the offscreen target
    pub clear_color: [f32; 4],
    /// Re-record the command list every frame even when nothing changed
    pub rebuild_commands_every_frame: bool,
    /// Minimum log severity applied by applications at startup
    pub log_severity: LogSeverity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Lumen Application".to_string(),
            app_version: (0, 1, 0),
            enable_validation: cfg!(debug_assertions),
            extent: Extent2D::new(1280, 720),
            color_format: TextureFormat::R8G8B8A8_UNORM,
            depth_format: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            rebuild_commands_every_frame: false,
            log_severity: LogSeverity::Info,
        }
    }
}

impl Config {
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    pub fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.extent = Extent2D::new(width, height);
        self
    }

    pub fn with_depth(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_rebuild_commands_every_frame(mut self, enable: bool) -> Self {
        self.rebuild_commands_every_frame = enable;
        self
    }

    pub fn with_log_severity(mut self, severity: LogSeverity) -> Self {
        self.log_severity = severity;
        self
    }
}
