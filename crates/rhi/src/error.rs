//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A required instance layer is not installed
    #[error("Missing layer: {0}")]
    MissingLayer(String),

    /// A required instance or device extension is not supported
    #[error("Missing extension: {0}")]
    MissingExtension(String),

    /// A required device feature or limit is not supported
    #[error("Missing feature: {0}")]
    MissingFeature(String),

    /// Shader module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// The surface does not offer the presentation format
    #[error("Unsupported surface format: {format:?} / {color_space:?}")]
    UnsupportedSurfaceFormat {
        format: ash::vk::Format,
        color_space: ash::vk::ColorSpaceKHR,
    },

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A hardware buffer cannot be imported under the requested policy
    #[error("Unsupported import: {0}")]
    UnsupportedImport(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// Whether this error means the hardware lacks something mandatory.
    pub fn is_capability_missing(&self) -> bool {
        matches!(
            self,
            Self::NoSuitableGpu
                | Self::MissingLayer(_)
                | Self::MissingExtension(_)
                | Self::MissingFeature(_)
                | Self::UnsupportedSurfaceFormat { .. }
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
