//! Connection State Cell
//!
//! Holds the current [`ConnectionState`] together with the callbacks waiting
//! for a particular state. Registration and transitions share one short-lived
//! lock, so a callback registered concurrently with a transition is either
//! fired by that transition or fired immediately, never lost.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::context::CallbackQueue;
use crate::network::ConnectionState;

type Work = Box<dyn FnOnce() + Send + 'static>;

struct Waiting {
    target: ConnectionState,
    context: CallbackQueue,
    work: Work,
}

struct Inner {
    state: ConnectionState,
    waiting: Vec<Waiting>,
}

/// Current connection state plus state-reached callbacks.
pub struct ConnectionStateCell {
    inner: Mutex<Inner>,
    watch: watch::Sender<ConnectionState>,
}

impl Default for ConnectionStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateCell {
    /// Creates a cell in `NotConnected`.
    pub fn new() -> Self {
        let (watch, _) = watch::channel(ConnectionState::NotConnected);
        ConnectionStateCell {
            inner: Mutex::new(Inner {
                state: ConnectionState::NotConnected,
                waiting: Vec::new(),
            }),
            watch,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the current state.
    pub fn get(&self) -> ConnectionState {
        self.lock().state
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.watch.subscribe()
    }

    /// Runs `work` on `context` once the state is `target`.
    ///
    /// Fires immediately if the state already is `target`; otherwise the work
    /// is kept until the next time `target` is entered, then discarded.
    pub fn execute_when<F>(&self, target: ConnectionState, context: &CallbackQueue, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.state == target {
            drop(inner);
            context.execute(work);
            return;
        }
        inner.waiting.push(Waiting {
            target,
            context: context.clone(),
            work: Box::new(work),
        });
    }

    /// Number of callbacks still waiting.
    pub fn waiting_callbacks(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Moves to `next` and fires the callbacks waiting for it.
    ///
    /// Returns the previous state, or `None` if nothing changed.
    pub(crate) fn set(&self, next: ConnectionState) -> Option<ConnectionState> {
        let (previous, due) = {
            let mut inner = self.lock();
            if inner.state == next {
                return None;
            }
            let previous = inner.state;
            inner.state = next;
            self.watch.send_replace(next);

            let (due, waiting): (Vec<_>, Vec<_>) = inner
                .waiting
                .drain(..)
                .partition(|w| w.target == next);
            inner.waiting = waiting;
            (previous, due)
        };

        for waiting in due {
            waiting.context.execute(waiting.work);
        }
        Some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter_job(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fires_immediately_when_already_in_state() {
        let cell = ConnectionStateCell::new();
        let (queue, mut receiver) = CallbackQueue::channel("test");
        let fired = Arc::new(AtomicUsize::new(0));

        cell.execute_when(ConnectionState::NotConnected, &queue, counter_job(&fired));

        assert_eq!(cell.waiting_callbacks(), 0);
        receiver.run_pending();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fires_once_on_entering_state() {
        let cell = ConnectionStateCell::new();
        let (queue, mut receiver) = CallbackQueue::channel("test");
        let fired = Arc::new(AtomicUsize::new(0));

        cell.execute_when(ConnectionState::Connected, &queue, counter_job(&fired));
        cell.execute_when(ConnectionState::Connected, &queue, counter_job(&fired));
        cell.execute_when(ConnectionState::Disconnecting, &queue, counter_job(&fired));
        assert_eq!(cell.waiting_callbacks(), 3);

        cell.set(ConnectionState::Connecting);
        receiver.run_pending();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        cell.set(ConnectionState::Connected);
        receiver.run_pending();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(cell.waiting_callbacks(), 1);

        // Re-entering does not fire consumed callbacks again
        cell.set(ConnectionState::NotConnected);
        cell.set(ConnectionState::Connected);
        receiver.run_pending();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_set_same_state_is_noop() {
        let cell = ConnectionStateCell::new();
        assert_eq!(cell.set(ConnectionState::NotConnected), None);
        assert_eq!(
            cell.set(ConnectionState::Connecting),
            Some(ConnectionState::NotConnected)
        );
        assert_eq!(cell.get(), ConnectionState::Connecting);
    }

    #[test]
    fn test_watch_observes_changes() {
        let cell = ConnectionStateCell::new();
        let rx = cell.subscribe();
        cell.set(ConnectionState::Connecting);
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);
    }
}
