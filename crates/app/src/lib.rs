//! The vkplay application shell.
//!
//! [`Player`] maps window lifecycle events onto the render thread and owns
//! the decoder session feeding it. [`run`] drives a player on a winit event
//! loop until playback ends or the window closes.

#[cfg(target_os = "android")]
mod android;

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkplay_core::Config;
use vkplay_media::{DecodedFrame, Session};
use vkplay_platform::Window;
use vkplay_renderer::{RenderError, RenderThread, VulkanBackend};

const WINDOW_TITLE: &str = "vkplay";
const WINDOW_SIZE: (u32, u32) = (1280, 720);

/// How often the shell checks whether the render thread has finished.
const FINISH_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Owns one playback: the render thread, the decoder session and the window
/// currently bound to the renderer.
pub struct Player {
    renderer: Option<RenderThread<Window, DecodedFrame>>,
    media: Option<Session>,
    window: Option<Window>,
    failure: Option<RenderError>,
}

impl Player {
    /// Start the render thread, open the media source and begin decoding.
    ///
    /// Frames are presented once a window is bound and focused.
    pub fn new(config: &Config) -> Result<Self> {
        info!(
            "Playing {} (validation: {}, external format: {}, cache: {})",
            config.media_source,
            config.validation,
            config.external_format,
            config.import_cache_capacity
        );

        let backend = VulkanBackend::<DecodedFrame>::new(config.validation, config.external_format)?;
        let renderer = RenderThread::spawn(backend, config.import_cache_capacity)?;
        let media = Session::open(&config.media_source)?;

        renderer.start(media.producer());
        media.start();

        Ok(Self {
            renderer: Some(renderer),
            media: Some(media),
            window: None,
            failure: None,
        })
    }

    fn bind_window(&mut self, event_loop: &ActiveEventLoop) {
        let (width, height) = WINDOW_SIZE;
        let window = match Window::new(event_loop, width, height, WINDOW_TITLE) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        if let Some(renderer) = &self.renderer {
            renderer.bind_window(window.clone());
        }
        self.window = Some(window);
    }

    fn unbind_window(&mut self) {
        let Some(window) = self.window.take() else {
            return;
        };

        // The native window may only go once the renderer has let go of it.
        if let Some(renderer) = &self.renderer {
            renderer.unbind_window();
        }
        drop(window);
        debug!("Window released");
    }

    /// Stop the renderer, then the decoder. Safe to call more than once.
    ///
    /// Returns how the render thread ended.
    pub fn shutdown(&mut self) -> Result<(), RenderError> {
        let result = match self.renderer.take() {
            Some(renderer) => {
                renderer.stop();
                renderer.join()
            }
            None => Ok(()),
        };

        if self.media.take().is_some() {
            debug!("Media session closed");
        }
        self.window = None;
        result
    }
}

impl ApplicationHandler for Player {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            self.bind_window(event_loop);
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.unbind_window();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(renderer) = &self.renderer else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Focused(true) => renderer.unpause(),
            WindowEvent::Focused(false) => renderer.pause(),
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.as_ref().is_some_and(RenderThread::is_finished) {
            info!("Playback finished");
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(
            Instant::now() + FINISH_POLL_INTERVAL,
        ));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Err(e) = self.shutdown() {
            if e.is_capability_missing() {
                error!("Device lacks a required capability: {}", e);
            } else {
                warn!("Render thread failed: {}", e);
            }
            self.failure = Some(e);
        }
    }
}

/// Play `config.media_source` on `event_loop` until it ends or the window is
/// closed.
///
/// # Errors
///
/// Fails when the renderer or the decoder cannot be set up, or when the
/// render thread ends with an error.
pub fn run(event_loop: EventLoop<()>, config: &Config) -> Result<()> {
    let mut player = Player::new(config)?;
    event_loop.run_app(&mut player)?;

    if let Some(e) = player.failure.take() {
        return Err(e.into());
    }
    player.shutdown()?;
    info!("Player exited");
    Ok(())
}
