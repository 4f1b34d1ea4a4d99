//! Hardware video decoding for the vkplay renderer.
//!
//! A [`Session`] decodes the first video track of a file with the platform
//! decoder straight into GPU-sampleable hardware buffers. Its
//! [`ReaderProducer`] is the [`FrameProducer`](vkplay_renderer::FrameProducer)
//! the render thread pulls those buffers from.
//!
//! Only Android has such a decoder. Elsewhere [`Session::open`] fails with
//! [`MediaError::Unsupported`].

#[cfg_attr(not(target_os = "android"), allow(dead_code))]
mod decoder;
mod error;
mod latch;

#[cfg(target_os = "android")]
mod android;
#[cfg(not(target_os = "android"))]
mod unsupported;

#[cfg(target_os = "android")]
pub use android::{DecodedFrame, ReaderProducer, Session, SharedBuffer};
#[cfg(not(target_os = "android"))]
pub use unsupported::{DecodedFrame, ReaderProducer, Session, SharedBuffer};

pub use decoder::BUFFER_FLAG_END_OF_STREAM;
pub use error::{MediaError, MediaResult};
pub use latch::StreamEnd;
