/// VulkanShaderModule - Vulkan implementation of the ShaderModule trait

use ash::vk;
use lumen_gpu::lumen::device::{ShaderModule, ShaderModuleDesc, ShaderStage};
use lumen_gpu::lumen::{Error, Result};
use lumen_gpu::{engine_bail_violation, engine_err, engine_error, engine_trace};
use std::any::Any;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::shader_stage_to_vk;

pub struct VulkanShaderModule {
    ctx: Arc<GpuContext>,
    pub(crate) module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl VulkanShaderModule {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &ShaderModuleDesc) -> Result<Self> {
        if desc.code.is_empty() || desc.code.len() % 4 != 0 {
            engine_bail_violation!("lumen::vulkan",
                "Shader code must be a non-empty multiple of 4 bytes (got {})", desc.code.len());
        }

        // Copies into an aligned word buffer and checks the magic number
        let words = ash::util::read_spv(&mut std::io::Cursor::new(desc.code))
            .map_err(|e| engine_err!("lumen::vulkan", "Invalid SPIR-V bytecode: {}", e))?;

        check_entry_point(&words, desc.entry_point)?;

        let entry_point = CString::new(desc.entry_point).map_err(|_| {
            engine_error!("lumen::vulkan", "Shader entry point '{}' contains a NUL byte", desc.entry_point);
            Error::InvalidResource(format!("entry point '{}' contains a NUL byte", desc.entry_point))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe {
            ctx.device.create_shader_module(&create_info, None)
                .map_err(|e| engine_err!("lumen::vulkan", "Failed to create shader module: {:?}", e))?
        };

        engine_trace!("lumen::vulkan", "Created {:?} shader module ({} words)", desc.stage, words.len());

        Ok(Self { ctx, module, stage: desc.stage, entry_point })
    }

    pub(crate) fn entry_point_cstr(&self) -> &CStr {
        &self.entry_point
    }

    pub(crate) fn vk_stage(&self) -> vk::ShaderStageFlags {
        shader_stage_to_vk(self.stage)
    }
}

/// Reflect `words` with spirq and make sure `entry_point` is declared
fn check_entry_point(words: &[u32], entry_point: &str) -> Result<()> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_err!("lumen::vulkan", "SPIR-V reflection failed: {:?}", e))?;

    if !entry_points.iter().any(|ep| ep.name == entry_point) {
        let names: Vec<&str> = entry_points.iter().map(|ep| ep.name.as_str()).collect();
        engine_error!("lumen::vulkan", "Entry point '{}' not found in shader (found {:?})", entry_point, names);
        return Err(Error::InvalidResource(format!("entry point '{}' not found", entry_point)));
    }
    Ok(())
}

impl ShaderModule for VulkanShaderModule {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn entry_point(&self) -> &str {
        self.entry_point.to_str().unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.module, None);
        }
    }
}
