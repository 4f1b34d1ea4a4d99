//! The contract between the render engine and whatever produces frames.
//!
//! A producer owns a small pool of hardware buffers that it keeps decoding
//! into. Each time it finishes one it calls [`ProducerHooks::notify_available`];
//! the engine later pulls only the newest finished [`FrameUnit`] and drops the
//! rest. A unit holds the buffer for the renderer until it is dropped, after
//! which the producer may write to that buffer again.

use std::fmt;
use std::sync::Arc;

use crate::error::RenderResult;
use crate::signal::BufferSignal;

/// Identity of a hardware buffer, stable for as long as the buffer is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One produced frame, held by the renderer while it is on screen.
pub trait FrameUnit: Send + 'static {
    /// A strong reference to the unit's hardware buffer.
    type Buffer: Send + 'static;

    fn buffer_id(&self) -> BufferId;

    /// Takes a new strong reference to the underlying buffer.
    ///
    /// The import cache keeps this reference for as long as the buffer's GPU
    /// resources exist, which can be longer than the unit lives.
    fn buffer(&self) -> RenderResult<Self::Buffer>;
}

/// Outcome of pulling the newest unit from a producer.
#[derive(Debug)]
pub enum Acquire<U> {
    /// The most recent unit; older undelivered units are dropped.
    Ready(U),
    /// Nothing new yet. Not an error.
    NotReady,
    /// No unit will ever be produced again.
    EndOfStream,
}

/// A source of frames, attached to the engine once with
/// [`Start`](crate::Event::Start).
pub trait FrameProducer: Send {
    type Unit: FrameUnit;

    /// Installs the callbacks through which the producer reports new units,
    /// removed buffers and the end of the stream.
    fn attach(&mut self, hooks: ProducerHooks) -> RenderResult<()>;

    /// Pulls the newest unit without blocking.
    fn acquire_latest(&mut self) -> RenderResult<Acquire<Self::Unit>>;
}

/// A type-erased producer as carried by the engine's event queue.
pub type BoxedProducer<U> = Box<dyn FrameProducer<Unit = U>>;

/// Callbacks handed to a producer on attach.
///
/// Every method is cheap, lock-protected and safe to call from any thread,
/// including the platform's own notification threads.
#[derive(Clone)]
pub struct ProducerHooks {
    signal: Arc<BufferSignal>,
    buffer_removed: Arc<dyn Fn(BufferId) + Send + Sync>,
}

impl ProducerHooks {
    pub fn new(
        signal: Arc<BufferSignal>,
        buffer_removed: impl Fn(BufferId) + Send + Sync + 'static,
    ) -> Self {
        Self {
            signal,
            buffer_removed: Arc::new(buffer_removed),
        }
    }

    /// A new unit is ready.
    pub fn notify_available(&self) {
        self.signal.notify();
    }

    /// The producer dropped its reference to `id` and will never return it
    /// again.
    pub fn buffer_removed(&self, id: BufferId) {
        (self.buffer_removed)(id);
    }

    /// No more units will be produced. Wakes the renderer if it is waiting.
    pub fn end_of_stream(&self) {
        self.signal.close();
    }
}

impl fmt::Debug for ProducerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerHooks")
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_hooks_route_to_signal_and_callback() {
        let signal = Arc::new(BufferSignal::new());
        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = removed.clone();
        let hooks = ProducerHooks::new(signal.clone(), move |id| sink.lock().push(id));

        let before = signal.pending();
        hooks.notify_available();
        assert_eq!(signal.pending(), before + 1);

        hooks.clone().buffer_removed(BufferId(7));
        assert_eq!(*removed.lock(), vec![BufferId(7)]);

        assert!(!signal.is_closed());
        hooks.end_of_stream();
        assert!(signal.is_closed());
    }

    #[test]
    fn test_buffer_id_display() {
        assert_eq!(BufferId(0xdead).to_string(), "0xdead");
    }
}
