//! Execution Contexts
//!
//! A [`CallbackQueue`] is a named, serial execution context. Work posted with
//! [`CallbackQueue::execute`] runs one job at a time, in posting order, on
//! whatever drives the matching [`CallbackReceiver`]: a spawned tokio task, or
//! the application's own main loop via [`CallbackReceiver::run_pending`].
//!
//! The session delivers every completion and signal through such a queue so
//! that caller-side code never runs on the session's protocol context.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Sending side of a serial execution context.
#[derive(Clone)]
pub struct CallbackQueue {
    tx: mpsc::UnboundedSender<Job>,
    label: Arc<str>,
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("label", &self.label)
            .finish()
    }
}

impl CallbackQueue {
    /// Creates a queue and the receiver that runs its jobs.
    pub fn channel(label: &str) -> (CallbackQueue, CallbackReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let label: Arc<str> = Arc::from(label);
        (
            CallbackQueue {
                tx,
                label: label.clone(),
            },
            CallbackReceiver { rx, label },
        )
    }

    /// Creates a queue whose jobs run on a dedicated tokio task.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn(label: &str) -> CallbackQueue {
        let (queue, receiver) = Self::channel(label);
        tokio::spawn(receiver.run());
        queue
    }

    /// Posts a job to this context.
    ///
    /// Returns false if the receiver is gone; the job is dropped.
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            tracing::warn!(queue = %self.label, "callback queue closed, dropping job");
            return false;
        }
        true
    }

    /// Returns the queue's label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Receiving side of a [`CallbackQueue`]; runs the posted jobs.
pub struct CallbackReceiver {
    rx: mpsc::UnboundedReceiver<Job>,
    label: Arc<str>,
}

impl CallbackReceiver {
    /// Runs every job already queued without waiting for more.
    ///
    /// Returns the number of jobs run.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            run_job(&self.label, job);
            ran += 1;
        }
        ran
    }

    /// Waits for the next job and runs it.
    ///
    /// Returns false once every queue handle has been dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                run_job(&self.label, job);
                true
            }
            None => false,
        }
    }

    /// Runs jobs until every queue handle has been dropped.
    pub async fn run(mut self) {
        while self.run_next().await {}
        tracing::debug!(queue = %self.label, "callback queue drained");
    }
}

fn run_job(label: &str, job: Job) {
    // One failing callback must not take the rest of the queue down.
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!(queue = %label, "callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_jobs_run_in_posting_order() {
        let (queue, mut receiver) = CallbackQueue::channel("test");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            assert!(queue.execute(move || seen.lock().unwrap().push(i)));
        }

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(receiver.run_pending(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_job_does_not_block_others() {
        let (queue, mut receiver) = CallbackQueue::channel("test");
        let seen = Arc::new(Mutex::new(false));

        queue.execute(|| panic!("boom"));
        let flag = seen.clone();
        queue.execute(move || *flag.lock().unwrap() = true);

        assert_eq!(receiver.run_pending(), 2);
        assert!(*seen.lock().unwrap());
    }

    #[test]
    fn test_execute_after_receiver_dropped() {
        let (queue, receiver) = CallbackQueue::channel("gone");
        drop(receiver);
        assert!(!queue.execute(|| {}));
        assert_eq!(queue.label(), "gone");
    }

    #[tokio::test]
    async fn test_spawned_queue_runs_jobs() {
        let queue = CallbackQueue::spawn("spawned");
        let (tx, rx) = tokio::sync::oneshot::channel();
        queue.execute(move || {
            let _ = tx.send(42);
        });
        assert_eq!(rx.await.unwrap(), 42);
    }
}
