//! Renderer error types.

use thiserror::Error;
use vkplay_rhi::RhiError;

/// Errors that end the render loop.
///
/// Swapchain invalidation and "no frame ready yet" are handled inside the
/// engine and never show up here.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A Vulkan call or capability check failed
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Window or surface creation failed
    #[error(transparent)]
    Platform(#[from] vkplay_core::Error),

    /// Every cache slot holds a buffer that is still referenced
    #[error("Import cache is full: all {capacity} slots are still referenced")]
    CacheFull { capacity: usize },

    /// The frame producer failed unexpectedly
    #[error("Producer error: {0}")]
    Producer(String),

    /// The backend reported a swapchain image the framechain does not have
    #[error("Frame index {index} out of range for a framechain of {len}")]
    FrameIndex { index: usize, len: usize },

    /// A cache slot was used after it was released
    #[error("Cache slot {0} is not valid")]
    StaleSlot(usize),

    /// The render thread panicked
    #[error("Render thread panicked")]
    ThreadPanicked,
}

impl RenderError {
    /// Whether the error means the device lacks something mandatory.
    pub fn is_capability_missing(&self) -> bool {
        matches!(self, Self::Rhi(e) if e.is_capability_missing())
    }
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
