//! SPIR-V loading.
//!
//! Shaders are compiled ahead of time (for example with `glslc`) and read at
//! startup.

use std::io::Cursor;
use std::path::Path;

use ash::vk;

use crate::error::{GpuError, Result};

/// Decode SPIR-V bytes into words, checking alignment and the magic number.
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| GpuError::ShaderLoad(format!("Invalid SPIR-V: {e}")))
}

/// Read a compiled SPIR-V file.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| GpuError::ShaderLoad(format!("{}: {e}", path.display())))?;
    let words = ash::util::read_spv(&mut Cursor::new(&bytes))
        .map_err(|e| GpuError::ShaderLoad(format!("{}: invalid SPIR-V: {e}", path.display())))?;
    tracing::debug!("Loaded shader {} ({} words)", path.display(), words.len());
    Ok(words)
}

/// Create a shader module from SPIR-V words.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    if code.is_empty() {
        return Err(GpuError::ShaderLoad("Empty shader".to_string()));
    }
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = unsafe { device.create_shader_module(&create_info, None)? };
    Ok(module)
}
