//! Control events and the handle used to send them to the render loop.
//!
//! Every event travels through one FIFO [`Channel`], so the render loop sees
//! them in the order they were sent. [`EventSender`] is the only way to push
//! events; it keeps the unbind acknowledgement counters consistent with the
//! queue contents, and interrupts the loop if it is waiting for a frame.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use vkplay_core::Channel;

use crate::producer::{BoxedProducer, BufferId, FrameUnit};
use crate::signal::BufferSignal;

const EVENT_QUEUE_CAPACITY: usize = 16;

/// A control event for the render loop.
pub enum Event<W, U: FrameUnit> {
    /// Attach a frame producer and begin playback
    Start(BoxedProducer<U>),
    /// Tear everything down and leave the loop
    Stop,
    /// A window is available for presentation
    BindWindow(W),
    /// The window is going away; presentation resources must be freed
    UnbindWindow,
    /// Stop presenting until [`Event::Unpause`]
    Pause,
    /// Resume presenting
    Unpause,
    /// The producer discarded one of its buffers
    BufferInvalidated(BufferId),
}

impl<W, U: FrameUnit> fmt::Debug for Event<W, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(_) => f.write_str("Start"),
            Self::Stop => f.write_str("Stop"),
            Self::BindWindow(_) => f.write_str("BindWindow"),
            Self::UnbindWindow => f.write_str("UnbindWindow"),
            Self::Pause => f.write_str("Pause"),
            Self::Unpause => f.write_str("Unpause"),
            Self::BufferInvalidated(id) => f.debug_tuple("BufferInvalidated").field(id).finish(),
        }
    }
}

#[derive(Debug, Default)]
struct BindingState {
    requested: u64,
    completed: u64,
    exited: bool,
}

/// Acknowledgement of window unbinds.
///
/// A sender takes a ticket before queueing [`Event::UnbindWindow`]; the
/// render loop completes one ticket per unbind event it handles. Waiters are
/// also released once the loop has exited, whatever the ticket count.
#[derive(Debug, Default)]
pub(crate) struct WindowBinding {
    state: Mutex<BindingState>,
    cond: Condvar,
}

impl WindowBinding {
    fn request_unbind(&self) -> u64 {
        let mut state = self.state.lock();
        state.requested += 1;
        state.requested
    }

    pub(crate) fn complete_unbind(&self) {
        let mut state = self.state.lock();
        state.completed += 1;
        self.cond.notify_all();
    }

    pub(crate) fn mark_exited(&self) {
        let mut state = self.state.lock();
        state.exited = true;
        self.cond.notify_all();
    }

    fn wait_unbound(&self, ticket: u64) {
        let mut state = self.state.lock();
        while state.completed < ticket && !state.exited {
            self.cond.wait(&mut state);
        }
    }

    fn has_exited(&self) -> bool {
        self.state.lock().exited
    }
}

struct Shared<W, U: FrameUnit> {
    events: Channel<Event<W, U>>,
    signal: Arc<BufferSignal>,
    binding: WindowBinding,
}

/// Cloneable handle for controlling a render loop.
pub struct EventSender<W, U: FrameUnit> {
    shared: Arc<Shared<W, U>>,
}

impl<W, U: FrameUnit> Clone for EventSender<W, U> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<W, U: FrameUnit> Default for EventSender<W, U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W, U: FrameUnit> EventSender<W, U> {
    /// Create an empty event queue with a fresh buffer signal.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                events: Channel::new(EVENT_QUEUE_CAPACITY),
                signal: Arc::new(BufferSignal::new()),
                binding: WindowBinding::default(),
            }),
        }
    }

    fn send(&self, event: Event<W, U>) {
        self.shared.events.push(event);
        self.shared.signal.interrupt();
    }

    /// Queue a producer to attach.
    pub fn start(&self, producer: BoxedProducer<U>) {
        self.send(Event::Start(producer));
    }

    /// Queue a stop request.
    ///
    /// Also closes the buffer signal, which wakes a loop blocked waiting for
    /// the next frame.
    pub fn stop(&self) {
        self.send(Event::Stop);
        self.shared.signal.close();
    }

    pub fn bind_window(&self, window: W) {
        self.send(Event::BindWindow(window));
    }

    /// Queue an unbind and return the ticket to wait on.
    pub fn unbind_window(&self) -> u64 {
        let ticket = self.shared.binding.request_unbind();
        self.send(Event::UnbindWindow);
        ticket
    }

    /// Block until the unbind for `ticket` has been handled or the loop has
    /// exited.
    pub fn wait_unbound(&self, ticket: u64) {
        self.shared.binding.wait_unbound(ticket);
    }

    pub fn pause(&self) {
        self.send(Event::Pause);
    }

    pub fn unpause(&self) {
        self.send(Event::Unpause);
    }

    pub fn buffer_invalidated(&self, id: BufferId) {
        self.send(Event::BufferInvalidated(id));
    }

    /// Whether the render loop has finished tearing down.
    pub fn has_exited(&self) -> bool {
        self.shared.binding.has_exited()
    }

    /// Number of events not yet taken by the loop.
    pub fn pending_events(&self) -> usize {
        self.shared.events.len()
    }

    pub(crate) fn signal(&self) -> &Arc<BufferSignal> {
        &self.shared.signal
    }

    pub(crate) fn binding(&self) -> &WindowBinding {
        &self.shared.binding
    }

    pub(crate) fn next_event(&self, block: bool) -> Option<Event<W, U>> {
        if block {
            Some(self.shared.events.pop_wait())
        } else {
            self.shared.events.pop_nowait()
        }
    }
}

impl<W, U: FrameUnit> fmt::Debug for EventSender<W, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("pending_events", &self.pending_events())
            .field("signal", &self.shared.signal)
            .finish()
    }
}
