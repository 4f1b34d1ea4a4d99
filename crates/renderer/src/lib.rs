//! Render engine for hardware-buffer video presentation.
//!
//! This crate drives presentation of decoded frames:
//! - The producer contract and the buffer-available signal
//! - The import cache of per-buffer GPU resources
//! - Per-swapchain-image frame tracking
//! - The event-driven render loop and the thread it runs on
//! - The Vulkan backend

mod cache;
mod engine;
mod error;
mod event;
mod framechain;
mod producer;
mod signal;
mod thread;
mod vulkan;

pub use cache::{ImportCache, SlotId};
pub use engine::{Backend, Engine, Flow, ImageAcquire, PresentStatus};
pub use error::{RenderError, RenderResult};
pub use event::{Event, EventSender};
pub use framechain::{AcquiredUnit, FrameFence, Framechain};
pub use producer::{
    Acquire, BoxedProducer, BufferId, FrameProducer, FrameUnit, ProducerHooks,
};
pub use signal::{BufferSignal, Pulled};
pub use thread::RenderThread;
pub use vulkan::{VulkanBackend, VulkanFrame, VulkanSwapchain};
