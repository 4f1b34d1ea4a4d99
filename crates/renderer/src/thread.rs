//! The dedicated render thread.

use std::thread::{self, JoinHandle};

use tracing::{error, warn};

use crate::engine::{Backend, Engine};
use crate::error::{RenderError, RenderResult};
use crate::event::EventSender;
use crate::producer::{FrameProducer, FrameUnit};

const THREAD_NAME: &str = "vkplay-render";

/// Marks the loop as exited even if it unwinds, so unbind waiters never
/// hang on a dead thread.
struct ExitGuard<W, U: FrameUnit>(EventSender<W, U>);

impl<W, U: FrameUnit> Drop for ExitGuard<W, U> {
    fn drop(&mut self) {
        self.0.binding().mark_exited();
    }
}

/// A render loop running on its own thread.
///
/// Every control method only queues an event, except
/// [`unbind_window`](Self::unbind_window), which waits until the window's
/// surface is gone. Dropping the handle stops the loop and joins it.
pub struct RenderThread<W, U: FrameUnit> {
    sender: EventSender<W, U>,
    handle: Option<JoinHandle<RenderResult<()>>>,
}

impl<W: Send + 'static, U: FrameUnit> RenderThread<W, U> {
    /// Move `backend` onto a new thread and start its loop there.
    ///
    /// The loop begins paused with no window and no producer.
    pub fn spawn<B>(backend: B, cache_capacity: usize) -> RenderResult<Self>
    where
        B: Backend<Window = W, Unit = U>,
    {
        let sender = EventSender::new();
        let engine_sender = sender.clone();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = ExitGuard(engine_sender.clone());
                Engine::new(backend, cache_capacity, engine_sender).run()
            })
            .map_err(vkplay_core::Error::from)?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    pub fn start(&self, producer: impl FrameProducer<Unit = U> + 'static) {
        self.sender.start(Box::new(producer));
    }

    pub fn stop(&self) {
        self.sender.stop();
    }

    pub fn bind_window(&self, window: W) {
        self.sender.bind_window(window);
    }

    /// Unbind the window and block until the loop has released it.
    ///
    /// Returns immediately if the loop has already exited.
    pub fn unbind_window(&self) {
        let ticket = self.sender.unbind_window();
        self.sender.wait_unbound(ticket);
    }

    pub fn pause(&self) {
        self.sender.pause();
    }

    pub fn unpause(&self) {
        self.sender.unpause();
    }

    pub fn sender(&self) -> &EventSender<W, U> {
        &self.sender
    }

    /// Whether the loop has left, by stop, end of stream or error.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the loop to exit and return how it ended.
    ///
    /// Does not request a stop; call [`stop`](Self::stop) first unless the
    /// stream is expected to end on its own.
    pub fn join(mut self) -> RenderResult<()> {
        Self::join_handle(self.handle.take())
    }

    fn join_handle(handle: Option<JoinHandle<RenderResult<()>>>) -> RenderResult<()> {
        match handle {
            Some(handle) => handle.join().map_err(|_| RenderError::ThreadPanicked)?,
            None => Ok(()),
        }
    }
}

impl<W, U: FrameUnit> Drop for RenderThread<W, U> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.sender.stop();
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Render thread exited with error: {}", e),
            Err(_) => error!("Render thread panicked"),
        }
    }
}
