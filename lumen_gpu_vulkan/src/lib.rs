//! Vulkan backend for Lumen
//!
//! Implements `lumen_gpu::lumen::device::GraphicsDevice` on top of ash and
//! gpu-allocator. The device is headless: frames are rendered into
//! offscreen images with Vulkan 1.3 dynamic rendering.

mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_context;
mod vulkan_descriptor;
mod vulkan_device;
mod vulkan_format;
mod vulkan_pipeline;
mod vulkan_shader;
mod vulkan_texture;

#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan_device::VulkanDevice;

#[cfg(feature = "vulkan-validation")]
pub use debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
