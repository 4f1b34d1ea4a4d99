//! Per-swapchain-image frame resources and in-flight tracking.
//!
//! A [`Framechain`] owns one frame per swapchain image. Each frame has an
//! immutable part supplied by the backend (command buffer, framebuffer, fence)
//! and an acquired part set every time it is drawn: the cache slot it samples
//! and the producer unit keeping that buffer on screen.
//!
//! # Frame lifecycle
//!
//! ```text
//! reset ──assign──▶ acquired ──push_in_flight──▶ in flight
//!   ▲                                               │
//!   └──────── fence signaled: reset fence, ◀────────┘
//!             drop unit, release slot
//! ```
//!
//! Submitted frames are queued in submission order. With a single queue they
//! complete in that order too, so [`Framechain::collect_completed`] stops at
//! the first frame that is still pending.

use tracing::trace;
use vkplay_core::RingQueue;

use crate::cache::SlotId;
use crate::error::{RenderError, RenderResult};

/// The completion fence of a frame.
pub trait FrameFence {
    /// Non-blocking check of whether the frame's GPU work is done.
    fn is_signaled(&self) -> RenderResult<bool>;

    /// Blocks until the frame's GPU work is done.
    fn wait(&self) -> RenderResult<()>;

    /// Returns the fence to the unsignaled state.
    fn reset(&self) -> RenderResult<()>;
}

/// What a frame currently shows.
#[derive(Debug)]
pub struct AcquiredUnit<U> {
    pub slot: SlotId,
    pub unit: U,
}

struct FrameSlot<F, U> {
    frame: F,
    acquired: Option<AcquiredUnit<U>>,
}

impl<F: FrameFence, U> FrameSlot<F, U> {
    /// `is_reset` holds exactly when nothing is acquired.
    fn is_reset(&self) -> bool {
        self.acquired.is_none()
    }

    fn reset(&mut self, release: &mut impl FnMut(SlotId)) -> RenderResult<()> {
        self.frame.reset()?;
        if let Some(AcquiredUnit { slot, unit }) = self.acquired.take() {
            drop(unit);
            release(slot);
        }
        Ok(())
    }
}

/// All frames of one swapchain plus the queue of submitted frames.
pub struct Framechain<F, U> {
    frames: Vec<FrameSlot<F, U>>,
    in_flight: RingQueue<usize>,
}

impl<F: FrameFence, U> Framechain<F, U> {
    /// Wraps `frames`, one per swapchain image, all reset.
    pub fn new(frames: Vec<F>) -> Self {
        let in_flight = RingQueue::with_capacity(frames.len());
        Self {
            frames: frames
                .into_iter()
                .map(|frame| FrameSlot {
                    frame,
                    acquired: None,
                })
                .collect(),
            in_flight,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, index: usize) -> RenderResult<&F> {
        self.slot(index).map(|slot| &slot.frame)
    }

    pub fn acquired(&self, index: usize) -> Option<&AcquiredUnit<U>> {
        self.frames.get(index).and_then(|slot| slot.acquired.as_ref())
    }

    pub fn is_reset(&self, index: usize) -> bool {
        self.frames.get(index).is_none_or(FrameSlot::is_reset)
    }

    /// Frames submitted and not yet collected.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Makes frame `index` reusable, waiting for its previous submission if
    /// it has not been collected yet. `release` is called with the slot of
    /// the unit it dropped.
    pub fn prepare(
        &mut self,
        index: usize,
        release: &mut impl FnMut(SlotId),
    ) -> RenderResult<()> {
        let slot = self.slot_mut(index)?;
        if !slot.is_reset() {
            trace!("Frame {} still in use, waiting", index);
            slot.frame.wait()?;
            slot.reset(release)?;
        }
        Ok(())
    }

    /// Attaches the unit frame `index` will show. The frame must be reset.
    pub fn assign(&mut self, index: usize, slot_id: SlotId, unit: U) -> RenderResult<()> {
        let slot = self.slot_mut(index)?;
        debug_assert!(slot.is_reset(), "frame {} assigned while in use", index);
        slot.acquired = Some(AcquiredUnit {
            slot: slot_id,
            unit,
        });
        Ok(())
    }

    /// Queues frame `index` as submitted.
    pub fn push_in_flight(&mut self, index: usize) {
        self.in_flight.push(index);
    }

    /// Resets every submitted frame whose fence has signaled, oldest first,
    /// stopping at the first one still pending. Never blocks. Returns the
    /// number of entries removed from the in-flight queue.
    pub fn collect_completed(&mut self, release: &mut impl FnMut(SlotId)) -> RenderResult<usize> {
        let mut collected = 0;
        while let Some(&index) = self.in_flight.peek() {
            let slot = self.slot_mut(index)?;
            if !slot.is_reset() {
                if !slot.frame.is_signaled()? {
                    break;
                }
                slot.reset(release)?;
            }
            self.in_flight.pop();
            collected += 1;
        }
        if collected > 0 {
            trace!("Collected {} frame(s)", collected);
        }
        Ok(collected)
    }

    /// Waits for every frame still in use and resets it. After this the
    /// framechain holds no units and can be dropped.
    pub fn release(&mut self, release: &mut impl FnMut(SlotId)) -> RenderResult<()> {
        for slot in self.frames.iter_mut().filter(|slot| !slot.is_reset()) {
            slot.frame.wait()?;
            slot.reset(release)?;
        }
        while self.in_flight.pop().is_some() {}
        Ok(())
    }

    fn slot(&self, index: usize) -> RenderResult<&FrameSlot<F, U>> {
        let len = self.frames.len();
        self.frames
            .get(index)
            .ok_or(RenderError::FrameIndex { index, len })
    }

    fn slot_mut(&mut self, index: usize) -> RenderResult<&mut FrameSlot<F, U>> {
        let len = self.frames.len();
        self.frames
            .get_mut(index)
            .ok_or(RenderError::FrameIndex { index, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// A fence the test signals by hand.
    #[derive(Clone, Default)]
    struct ManualFence {
        signaled: Rc<Cell<bool>>,
        waits: Rc<Cell<usize>>,
    }

    impl ManualFence {
        fn signal(&self) {
            self.signaled.set(true);
        }
    }

    impl FrameFence for ManualFence {
        fn is_signaled(&self) -> RenderResult<bool> {
            Ok(self.signaled.get())
        }

        fn wait(&self) -> RenderResult<()> {
            // Waiting always completes the GPU work in this model.
            self.waits.set(self.waits.get() + 1);
            self.signaled.set(true);
            Ok(())
        }

        fn reset(&self) -> RenderResult<()> {
            self.signaled.set(false);
            Ok(())
        }
    }

    fn chain(n: usize) -> (Framechain<ManualFence, &'static str>, Vec<ManualFence>) {
        let fences: Vec<_> = (0..n).map(|_| ManualFence::default()).collect();
        (Framechain::new(fences.clone()), fences)
    }

    fn submit(chain: &mut Framechain<ManualFence, &'static str>, index: usize, unit: &'static str) {
        chain.prepare(index, &mut |_| {}).unwrap();
        chain.assign(index, SlotId::new(index), unit).unwrap();
        chain.push_in_flight(index);
    }

    #[test]
    fn test_new_frames_are_reset() {
        let (chain, _) = chain(3);
        assert_eq!(chain.len(), 3);
        assert!((0..3).all(|i| chain.is_reset(i)));
        assert_eq!(chain.in_flight(), 0);
    }

    #[test]
    fn test_collect_stops_at_first_pending() {
        let (mut chain, fences) = chain(3);
        submit(&mut chain, 0, "a");
        submit(&mut chain, 1, "b");
        submit(&mut chain, 2, "c");

        // The youngest frame finishing first must not be reported.
        fences[2].signal();
        let mut released = Vec::new();
        assert_eq!(chain.collect_completed(&mut |s| released.push(s)).unwrap(), 0);
        assert!(released.is_empty());
        assert!(!chain.is_reset(2));

        fences[0].signal();
        assert_eq!(chain.collect_completed(&mut |s| released.push(s)).unwrap(), 1);
        assert!(chain.is_reset(0));
        assert!(!chain.is_reset(1));

        fences[1].signal();
        assert_eq!(chain.collect_completed(&mut |s| released.push(s)).unwrap(), 2);
        assert_eq!(released.len(), 3);
        assert_eq!(chain.in_flight(), 0);
    }

    #[test]
    fn test_prepare_waits_before_replacing_unit() {
        let (mut chain, fences) = chain(2);
        submit(&mut chain, 0, "first");
        assert_eq!(fences[0].waits.get(), 0);

        let mut released = Vec::new();
        chain.prepare(0, &mut |s| released.push(s)).unwrap();
        assert_eq!(fences[0].waits.get(), 1);
        assert_eq!(released.len(), 1);
        assert!(chain.is_reset(0));
        // The fence was reset along with the frame.
        assert!(!fences[0].signaled.get());

        chain.assign(0, SlotId::new(0), "second").unwrap();
        assert_eq!(chain.acquired(0).map(|a| a.unit), Some("second"));
    }

    #[test]
    fn test_prepare_on_reset_frame_does_not_wait() {
        let (mut chain, fences) = chain(2);
        chain.prepare(1, &mut |_| panic!("nothing to release")).unwrap();
        assert_eq!(fences[1].waits.get(), 0);
    }

    #[test]
    fn test_stale_queue_entries_for_reused_frames() {
        // Frame 0 is reused before being collected; its first queue entry
        // is skipped once the frame is reset.
        let (mut chain, fences) = chain(1);
        submit(&mut chain, 0, "a");
        submit(&mut chain, 0, "b");
        assert_eq!(chain.in_flight(), 2);

        fences[0].signal();
        assert_eq!(chain.collect_completed(&mut |_| {}).unwrap(), 2);
        assert_eq!(chain.in_flight(), 0);
    }

    #[test]
    fn test_release_waits_for_everything() {
        let (mut chain, fences) = chain(3);
        submit(&mut chain, 0, "a");
        submit(&mut chain, 2, "c");

        let mut released = 0;
        chain.release(&mut |_| released += 1).unwrap();
        assert_eq!(released, 2);
        assert_eq!(fences[0].waits.get(), 1);
        assert_eq!(fences[1].waits.get(), 0);
        assert_eq!(fences[2].waits.get(), 1);
        assert_eq!(chain.in_flight(), 0);
        assert!((0..3).all(|i| chain.is_reset(i)));
    }

    #[test]
    fn test_out_of_range_index() {
        let (mut chain, _) = chain(2);
        assert!(matches!(
            chain.prepare(5, &mut |_| {}),
            Err(RenderError::FrameIndex { index: 5, len: 2 })
        ));
        assert!(chain.frame(2).is_err());
    }
}
