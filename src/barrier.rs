//! Completion counting for fan-in.
//!
//! Works like a dispatch group: `enter` once per outstanding task, `leave`
//! when each one finishes, and jobs registered with `notify` are submitted
//! to their executor when the count drops to zero.
use std::mem;

use parking_lot::Mutex;

use crate::executor::Job;
use crate::Executor;

#[derive(Default)]
pub(crate) struct Countdown {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    outstanding: usize,
    waiting: Vec<(Executor, Job)>,
}

impl Countdown {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enter(&self) {
        self.inner.lock().outstanding += 1;
    }

    pub(crate) fn leave(&self) {
        let released = {
            let mut inner = self.inner.lock();
            debug_assert!(inner.outstanding > 0, "unbalanced Countdown::leave");
            inner.outstanding = inner.outstanding.saturating_sub(1);
            if inner.outstanding > 0 {
                return;
            }
            mem::take(&mut inner.waiting)
        };
        for (executor, job) in released {
            executor.spawn(job);
        }
    }

    /// Runs `job` on `executor` once nothing is outstanding, which may be
    /// right away.
    pub(crate) fn notify<F>(&self, executor: &Executor, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.outstanding > 0 {
            inner.waiting.push((executor.clone(), Box::new(job)));
            return;
        }
        drop(inner);
        executor.spawn(job);
    }

    #[cfg(test)]
    fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::ManualQueue;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_notify_after_last_leave() {
        let queue = ManualQueue::default();
        let countdown = Countdown::new();
        countdown.enter();
        countdown.enter();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        countdown.notify(&queue.executor(), move || flag.store(true, Ordering::SeqCst));
        countdown.leave();
        assert_eq!(queue.run_until_idle(), 0);
        countdown.leave();
        assert_eq!(countdown.outstanding(), 0);
        assert_eq!(queue.run_until_idle(), 1);
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_notify_when_idle_is_deferred() {
        let queue = ManualQueue::default();
        let countdown = Countdown::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        countdown.notify(&queue.executor(), move || flag.store(true, Ordering::SeqCst));
        assert!(!done.load(Ordering::SeqCst));
        queue.run_until_idle();
        assert!(done.load(Ordering::SeqCst));
    }
}
