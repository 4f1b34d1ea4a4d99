//! Shader module management.
//!
//! This module handles SPIR-V loading and VkShaderModule creation.
//!
//! # Overview
//!
//! - [`ShaderStage`] defines the type of shader (vertex or fragment)
//! - [`Shader`] wraps VkShaderModule with stage and entry point information
//! - [`QUAD_VERT_SPV`] / [`QUAD_FRAG_SPV`] are the embedded full-screen quad
//!   shaders (GLSL sources live next to them in `shaders/`)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkplay_rhi::device::Device;
//! use vkplay_rhi::shader::{Shader, ShaderStage, QUAD_VERT_SPV};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkplay_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_bytes(device, QUAD_VERT_SPV, ShaderStage::Vertex, "main")?;
//! let _vertex_stage_info = vertex_shader.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::io::Cursor;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vertex shader emitting a full-screen triangle strip from `gl_VertexIndex`.
pub const QUAD_VERT_SPV: &[u8] = include_bytes!("../shaders/quad.vert.spv");

/// Fragment shader sampling the combined image sampler at set 0, binding 0.
pub const QUAD_FRAG_SPV: &[u8] = include_bytes!("../shaders/quad.frag.spv");

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader stage - processes each vertex
    Vertex,
    /// Fragment (pixel) shader stage - processes each fragment
    Fragment,
}

impl ShaderStage {
    /// Converts the shader stage to Vulkan shader stage flags.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Returns a human-readable name for the shader stage.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decodes a SPIR-V binary into code words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the length is not a multiple of 4
/// or the magic number is wrong.
pub fn parse_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let code = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("Invalid SPIR-V: {e}")))?;

    match code.first() {
        Some(&SPIRV_MAGIC) => Ok(code),
        Some(&magic) => Err(RhiError::ShaderError(format!(
            "Invalid SPIR-V magic number {magic:#010x}"
        ))),
        None => Err(RhiError::ShaderError("Empty SPIR-V module".to_string())),
    }
}

/// Vulkan shader module wrapper.
///
/// # Thread Safety
///
/// The shader module itself is immutable after creation and can be
/// safely shared between threads.
pub struct Shader {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan shader module handle.
    module: vk::ShaderModule,
    /// Shader stage type.
    stage: ShaderStage,
    /// Entry point function name.
    entry_point: CString,
}

impl Shader {
    /// Creates a shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The bytes are not a SPIR-V module (see [`parse_spirv`])
    /// - The entry point name contains null bytes
    /// - Shader module creation fails
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = parse_spirv(bytes)?;

        let entry_point_cstring = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!(
            "Created {} shader module with entry point '{}'",
            stage, entry_point
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point: entry_point_cstring,
        })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Creates a pipeline shader stage create info structure.
    ///
    /// The returned structure borrows from this shader and must not outlive it.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_embedded_shaders_parse() {
        for bytes in [QUAD_VERT_SPV, QUAD_FRAG_SPV] {
            let code = parse_spirv(bytes).unwrap();
            assert_eq!(code[0], SPIRV_MAGIC);
            // Version word: SPIR-V 1.0 for Vulkan 1.1 compatibility.
            assert_eq!(code[1], 0x0001_0000);
        }
    }

    #[test]
    fn test_invalid_spirv_alignment() {
        let err = parse_spirv(&[0u8; 5]).unwrap_err();
        assert!(matches!(err, RhiError::ShaderError(_)));
    }

    #[test]
    fn test_invalid_spirv_magic() {
        let err = parse_spirv(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap_err();
        assert!(matches!(err, RhiError::ShaderError(_)));
        assert!(parse_spirv(&[]).is_err());
    }
}
