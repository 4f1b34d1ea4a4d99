//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance and device creation
//! - Surface validation and swapchain management
//! - Command buffer recording
//! - Render pass and pipeline creation
//! - Zero-copy import of hardware buffers
//! - Synchronization primitives

mod error;

pub mod command;
pub mod descriptor;
pub mod device;
pub mod import;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
