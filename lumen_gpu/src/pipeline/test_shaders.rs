/// Temporary shader files for pipeline tests

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_FILE: AtomicU32 = AtomicU32::new(0);

/// SPIR-V magic number followed by a version word
const FAKE_SPIRV: [u8; 8] = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];

/// Write `bytes` to a fresh temporary file and return its path
pub fn shader_file_with(name: &str, bytes: &[u8]) -> PathBuf {
    let unique = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("lumen_{}_{}_{}.spv", name, std::process::id(), unique));
    std::fs::write(&path, bytes).expect("write temporary shader");
    path
}

/// A file the loader accepts
pub fn shader_file(name: &str) -> PathBuf {
    shader_file_with(name, &FAKE_SPIRV)
}

/// A path that does not exist
pub fn missing_shader(name: &str) -> PathBuf {
    let unique = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("lumen_missing_{}_{}_{}.spv", name, std::process::id(), unique));
    let _ = std::fs::remove_file(&path);
    path
}
