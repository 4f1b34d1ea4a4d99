//! Platform abstraction layer for the video player.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Vulkan surface creation from raw window handles

mod window;

pub use window::{Surface, Window};
