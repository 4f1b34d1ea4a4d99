//! One-shot end-of-stream latch shared by the decoder thread and the
//! image-reader producer.

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use vkplay_renderer::ProducerHooks;

#[derive(Debug, Default)]
struct LatchState {
    fired: bool,
    /// The decoder released its last output
    finished: bool,
    rendered: u64,
    delivered: u64,
    hooks: Option<ProducerHooks>,
}

impl LatchState {
    fn drained(&self) -> bool {
        self.finished && self.delivered >= self.rendered
    }
}

/// Records that the decoder will deliver no more frames.
///
/// Firing closes the renderer's buffer signal through the attached hooks.
/// Hooks attached after the latch fired are closed immediately, so the
/// order in which the decoder finishes and the renderer attaches does not
/// matter.
///
/// Rendered outputs reach the image reader asynchronously. After a clean
/// end of stream the latch therefore waits until the reader has delivered
/// every image the decoder rendered.
#[derive(Debug, Default)]
pub struct StreamEnd {
    state: Mutex<LatchState>,
}

impl StreamEnd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an output buffer the decoder rendered to the reader.
    pub fn frame_rendered(&self) {
        self.state.lock().rendered += 1;
    }

    /// Count an image the reader announced.
    pub fn frame_delivered(&self) {
        let mut state = self.state.lock();
        state.delivered += 1;
        self.fire_if_drained(state);
    }

    /// The decoder reached end of stream. Fires now if every rendered
    /// frame was delivered, otherwise on the last delivery.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.finished = true;
        self.fire_if_drained(state);
    }

    /// Fire the latch. Later calls do nothing.
    pub fn fire(&self) {
        let hooks = {
            let mut state = self.state.lock();
            if state.fired {
                return;
            }
            state.fired = true;
            state.hooks.clone()
        };

        debug!("Stream end latched");
        if let Some(hooks) = hooks {
            hooks.end_of_stream();
        }
    }

    pub fn attach(&self, hooks: ProducerHooks) {
        let fired = {
            let mut state = self.state.lock();
            state.hooks = Some(hooks.clone());
            state.fired
        };

        if fired {
            hooks.end_of_stream();
        }
    }

    pub fn has_fired(&self) -> bool {
        self.state.lock().fired
    }

    fn fire_if_drained(&self, state: MutexGuard<'_, LatchState>) {
        let drained = state.drained();
        drop(state);
        if drained {
            self.fire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vkplay_renderer::BufferSignal;

    fn hooks() -> (ProducerHooks, Arc<BufferSignal>) {
        let signal = Arc::new(BufferSignal::new());
        (ProducerHooks::new(signal.clone(), |_| {}), signal)
    }

    #[test]
    fn test_fire_closes_attached_signal() {
        let latch = StreamEnd::new();
        let (hooks, signal) = hooks();
        latch.attach(hooks);

        assert!(!latch.has_fired());
        assert!(!signal.is_closed());

        latch.fire();
        assert!(latch.has_fired());
        assert!(signal.is_closed());
    }

    #[test]
    fn test_attach_after_fire_closes_immediately() {
        let latch = StreamEnd::new();
        latch.fire();

        let (hooks, signal) = hooks();
        latch.attach(hooks);
        assert!(signal.is_closed());
    }

    #[test]
    fn test_fire_without_hooks_is_remembered() {
        let latch = StreamEnd::new();
        latch.fire();
        latch.fire();
        assert!(latch.has_fired());
    }

    #[test]
    fn test_finish_waits_for_undelivered_frames() {
        let latch = StreamEnd::new();
        let (hooks, signal) = hooks();
        latch.attach(hooks);

        for _ in 0..3 {
            latch.frame_rendered();
        }
        latch.frame_delivered();
        latch.finish();
        assert!(!latch.has_fired());

        latch.frame_delivered();
        assert!(!signal.is_closed());
        latch.frame_delivered();
        assert!(latch.has_fired());
        assert!(signal.is_closed());
    }

    #[test]
    fn test_finish_after_every_delivery_fires_at_once() {
        let latch = StreamEnd::new();
        latch.frame_rendered();
        latch.frame_delivered();
        assert!(!latch.has_fired());

        latch.finish();
        assert!(latch.has_fired());
    }

    #[test]
    fn test_deliveries_before_finish_do_not_fire() {
        let latch = StreamEnd::new();
        latch.frame_delivered();
        latch.frame_delivered();
        assert!(!latch.has_fired());
    }
}
