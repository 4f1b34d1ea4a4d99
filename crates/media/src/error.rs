//! Media-layer error types.

use thiserror::Error;

use vkplay_renderer::RenderError;

/// Errors raised while opening or running a decoder session.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The container holds no track with a `video/` MIME type.
    #[error("No video track in {0}")]
    NoVideoTrack(String),

    /// A track format lacks a key the decoder needs.
    #[error("Track format has no {0}")]
    MissingFormatKey(&'static str),

    #[error("No decoder for {0}")]
    NoDecoder(String),

    /// A raw NDK call returned a failure status.
    #[error("{call} failed with status {status}")]
    Status { call: &'static str, status: i32 },

    #[cfg(target_os = "android")]
    #[error("NDK media error: {0}")]
    Ndk(#[from] ndk::media_error::MediaError),

    #[error("Decoder thread panicked")]
    ThreadPanicked,

    /// Hardware decoding into hardware buffers only exists on Android.
    #[error("Media decoding is not supported on this platform")]
    Unsupported,
}

impl From<MediaError> for RenderError {
    fn from(e: MediaError) -> Self {
        RenderError::Producer(e.to_string())
    }
}

/// Result type alias using [`MediaError`].
pub type MediaResult<T> = std::result::Result<T, MediaError>;
