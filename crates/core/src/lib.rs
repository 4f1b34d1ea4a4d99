//! Core utilities for the vkplay video presenter.
//!
//! This crate provides foundational types shared by every other crate:
//! - Error types and result aliases
//! - Logging initialization
//! - Launch configuration
//! - A growable ring queue and a blocking channel built on top of it

mod channel;
mod config;
mod error;
mod logging;
mod queue;

pub use channel::{Channel, ChannelGuard};
pub use config::{Config, DEFAULT_IMPORT_CACHE_CAPACITY, ExternalFormatPolicy};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use queue::RingQueue;
