//! The "a new frame is available" signal between producer and renderer.
//!
//! The producer side only ever increments a counter; the consumer waits for
//! it to become non-zero, zeroes it, and pulls the single newest unit from the
//! producer. Any number of notifications therefore collapse into one pull, and
//! units the renderer was too slow for are never seen.
//!
//! The signal can also be closed, which is how the producer reports the end of
//! the stream. A closed signal never blocks. Control events interrupt a wait
//! without closing, so the render loop can handle them while no frame comes.

use std::fmt;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::RenderResult;
use crate::producer::Acquire;

#[derive(Debug)]
struct SignalState {
    /// Starts at one so the first wait pulls once without a notification.
    /// A producer attached mid-stream can already hold a unit whose
    /// notification went out before the hooks were installed.
    pending: u64,
    closed: bool,
    interrupted: bool,
}

/// Outcome of [`BufferSignal::wait_and_pull`].
#[derive(Debug, PartialEq, Eq)]
pub enum Pulled<T> {
    /// The newest unit.
    Ready(T),
    /// [`BufferSignal::interrupt`] was called before any unit arrived.
    Interrupted,
    /// No unit will ever arrive.
    EndOfStream,
}

/// Counting wake-up signal with latest-wins consumption.
pub struct BufferSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl BufferSignal {
    /// Creates an open signal.
    ///
    /// The count starts at one: a producer attached after it began decoding
    /// may already hold a unit that no notification will announce.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState {
                pending: 1,
                closed: false,
                interrupted: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Records that a new unit is available and wakes every waiter.
    pub fn notify(&self) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_add(1);
        trace!("Buffer available, pending {}", state.pending);
        self.cond.notify_all();
    }

    /// Closes the signal and wakes every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cond.notify_all();
    }

    /// Wakes a waiter without a unit. The wait returns
    /// [`Pulled::Interrupted`] unless a notification is also pending.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Notifications not yet consumed by a pull.
    pub fn pending(&self) -> u64 {
        self.state.lock().pending
    }

    /// Waits for a notification, then pulls the newest unit with `pull`.
    ///
    /// Returns [`Pulled::EndOfStream`] once the stream has ended, either
    /// because `pull` said so or because the signal is closed and `pull` has
    /// nothing left. A `NotReady` pull on an open signal waits for the next
    /// notification. A pending notification wins over an interrupt; either
    /// way the interrupt is consumed.
    ///
    /// # Errors
    ///
    /// Errors from `pull` are passed through.
    pub fn wait_and_pull<T, F>(&self, mut pull: F) -> RenderResult<Pulled<T>>
    where
        F: FnMut() -> RenderResult<Acquire<T>>,
    {
        loop {
            let closed = {
                let mut state = self.state.lock();
                while state.pending == 0 && !state.closed && !state.interrupted {
                    self.cond.wait(&mut state);
                }
                let interrupted = std::mem::take(&mut state.interrupted);
                if state.pending == 0 && !state.closed && interrupted {
                    return Ok(Pulled::Interrupted);
                }
                state.pending = 0;
                state.closed
            };

            match pull()? {
                Acquire::Ready(unit) => return Ok(Pulled::Ready(unit)),
                Acquire::EndOfStream => return Ok(Pulled::EndOfStream),
                Acquire::NotReady if closed => return Ok(Pulled::EndOfStream),
                Acquire::NotReady => trace!("Woken without a unit, waiting again"),
            }
        }
    }
}

impl Default for BufferSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BufferSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BufferSignal")
            .field("pending", &state.pending)
            .field("closed", &state.closed)
            .field("interrupted", &state.interrupted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// A producer store that only keeps the newest unit.
    #[derive(Default)]
    struct Latest {
        unit: Option<u32>,
        ended: bool,
    }

    impl Latest {
        fn pull(&mut self) -> RenderResult<Acquire<u32>> {
            Ok(match self.unit.take() {
                Some(unit) => Acquire::Ready(unit),
                None if self.ended => Acquire::EndOfStream,
                None => Acquire::NotReady,
            })
        }
    }

    #[test]
    fn test_starts_with_one_pending() {
        let signal = BufferSignal::new();
        assert_eq!(signal.pending(), 1);
        assert!(!signal.is_closed());
    }

    #[test]
    fn test_first_wait_pulls_unit_held_before_attach() {
        let signal = BufferSignal::new();
        let mut store = Latest {
            unit: Some(7),
            ..Latest::default()
        };

        // No notify: the unit arrived before anyone could announce it.
        let pulled = signal.wait_and_pull(|| store.pull()).unwrap();
        assert_eq!(pulled, Pulled::Ready(7));
        assert_eq!(signal.pending(), 0);
    }

    #[test]
    fn test_latest_wins_coalescing() {
        let signal = BufferSignal::new();
        let mut store = Latest::default();

        for unit in 1..=5 {
            store.unit = Some(unit);
            signal.notify();
        }
        assert_eq!(signal.pending(), 6);

        let pulled = signal.wait_and_pull(|| store.pull()).unwrap();
        assert_eq!(pulled, Pulled::Ready(5));
        assert_eq!(signal.pending(), 0);
    }

    #[test]
    fn test_not_ready_waits_for_next_notification() {
        let signal = Arc::new(BufferSignal::new());
        let store = Arc::new(Mutex::new(Latest::default()));

        let producer = {
            let signal = signal.clone();
            let store = store.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                store.lock().unit = Some(9);
                signal.notify();
            })
        };

        // The initial pending count wakes the first wait, which finds nothing.
        let pulled = signal.wait_and_pull(|| store.lock().pull()).unwrap();
        assert_eq!(pulled, Pulled::Ready(9));
        producer.join().unwrap();
    }

    #[test]
    fn test_end_of_stream_from_pull() {
        let signal = BufferSignal::new();
        let mut store = Latest {
            unit: None,
            ended: true,
        };
        assert_eq!(
            signal.wait_and_pull(|| store.pull()).unwrap(),
            Pulled::EndOfStream
        );
    }

    #[test]
    fn test_close_wakes_blocked_waiter() {
        let signal = Arc::new(BufferSignal::new());
        let mut pulls = VecDeque::from([Acquire::NotReady, Acquire::NotReady]);

        let closer = {
            let signal = signal.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                signal.close();
            })
        };

        let pulled: Pulled<u32> = signal
            .wait_and_pull(|| Ok(pulls.pop_front().unwrap_or(Acquire::NotReady)))
            .unwrap();
        assert_eq!(pulled, Pulled::EndOfStream);
        closer.join().unwrap();
    }

    #[test]
    fn test_closed_signal_still_delivers_ready_units() {
        let signal = BufferSignal::new();
        signal.close();
        let mut store = Latest {
            unit: Some(3),
            ended: false,
        };

        assert_eq!(
            signal.wait_and_pull(|| store.pull()).unwrap(),
            Pulled::Ready(3)
        );
        assert_eq!(
            signal.wait_and_pull(|| store.pull()).unwrap(),
            Pulled::EndOfStream
        );
    }

    #[test]
    fn test_interrupt_wakes_blocked_waiter() {
        let signal = Arc::new(BufferSignal::new());
        let mut store = Latest::default();
        // Consume the initial count.
        store.unit = Some(1);
        assert_eq!(
            signal.wait_and_pull(|| store.pull()).unwrap(),
            Pulled::Ready(1)
        );

        let interrupter = {
            let signal = signal.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                signal.interrupt();
            })
        };

        let mut pulls = 0;
        let pulled = signal
            .wait_and_pull(|| {
                pulls += 1;
                store.pull()
            })
            .unwrap();
        assert_eq!(pulled, Pulled::Interrupted);
        assert_eq!(pulls, 0);
        interrupter.join().unwrap();
    }

    #[test]
    fn test_pending_unit_wins_over_interrupt() {
        let signal = BufferSignal::new();
        let mut store = Latest {
            unit: Some(4),
            ended: false,
        };
        signal.interrupt();

        assert_eq!(
            signal.wait_and_pull(|| store.pull()).unwrap(),
            Pulled::Ready(4)
        );
        // The interrupt was consumed along with the notification.
        store.unit = Some(5);
        signal.notify();
        assert_eq!(
            signal.wait_and_pull(|| store.pull()).unwrap(),
            Pulled::Ready(5)
        );
    }

    #[test]
    fn test_pull_errors_propagate() {
        let signal = BufferSignal::new();
        let result: RenderResult<Pulled<u32>> =
            signal.wait_and_pull(|| Err(crate::RenderError::Producer("boom".into())));
        assert!(result.is_err());
    }
}
