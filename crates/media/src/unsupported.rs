//! Stand-ins for platforms without a hardware decoder.
//!
//! Every type is uninhabited: [`Session::open`] always fails, so no value of
//! the others can exist.

use std::path::Path;

use ash::vk;

use vkplay_renderer::{Acquire, BufferId, FrameProducer, FrameUnit, ProducerHooks, RenderResult};
use vkplay_rhi::import::{HardwareBufferDesc, HardwareBufferSource};

use crate::error::{MediaError, MediaResult};

pub enum Session {}

impl Session {
    pub fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        tracing::error!("Cannot decode {}: no hardware decoder", path.as_ref().display());
        Err(MediaError::Unsupported)
    }

    pub fn producer(&self) -> ReaderProducer {
        match *self {}
    }

    pub fn start(&self) {
        match *self {}
    }

    pub fn size(&self) -> (u32, u32) {
        match *self {}
    }
}

pub enum ReaderProducer {}

impl FrameProducer for ReaderProducer {
    type Unit = DecodedFrame;

    fn attach(&mut self, _hooks: ProducerHooks) -> RenderResult<()> {
        match *self {}
    }

    fn acquire_latest(&mut self) -> RenderResult<Acquire<DecodedFrame>> {
        match *self {}
    }
}

pub enum DecodedFrame {}

impl FrameUnit for DecodedFrame {
    type Buffer = SharedBuffer;

    fn buffer_id(&self) -> BufferId {
        match *self {}
    }

    fn buffer(&self) -> RenderResult<SharedBuffer> {
        match *self {}
    }
}

pub enum SharedBuffer {}

impl HardwareBufferSource for SharedBuffer {
    fn hardware_buffer(&self) -> *mut vk::AHardwareBuffer {
        match *self {}
    }

    fn describe(&self) -> HardwareBufferDesc {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_is_unsupported() {
        assert!(matches!(
            Session::open("/sdcard/clip.mp4"),
            Err(MediaError::Unsupported)
        ));
    }
}
