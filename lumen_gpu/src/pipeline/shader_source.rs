/// Shader bytecode loading

use std::path::Path;
use std::sync::Arc;

use crate::device::{GraphicsDevice, ShaderModule, ShaderModuleDesc, ShaderStage};
use crate::error::{Error, Result};
use crate::{engine_bail_violation, engine_error, engine_trace};

/// Entry point used for every stage
pub const SHADER_ENTRY_POINT: &str = "main";

/// Read a SPIR-V file wholesale.
///
/// The bytecode must be non-empty and a whole number of 32-bit words.
pub fn load_shader_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        engine_error!("lumen::Shader", "Failed to read shader '{}': {}", path.display(), e);
        Error::Io(format!("{}: {}", path.display(), e))
    })?;

    if bytes.is_empty() || bytes.len() % 4 != 0 {
        engine_bail_violation!("lumen::Shader",
            "Shader '{}' is not valid SPIR-V ({} bytes, expected a non-empty multiple of 4)",
            path.display(), bytes.len());
    }

    engine_trace!("lumen::Shader", "Loaded '{}' ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

/// Load `path` and create a device module for `stage`
pub(crate) fn create_module(
    device: &dyn GraphicsDevice,
    path: &Path,
    stage: ShaderStage,
) -> Result<Arc<dyn ShaderModule>> {
    let code = load_shader_bytes(path)?;
    device.create_shader_module(&ShaderModuleDesc {
        code: &code,
        stage,
        entry_point: SHADER_ENTRY_POINT,
    })
}
