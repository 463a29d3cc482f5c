//! The settlement cell behind every [`Promise`](crate::Promise).
//!
//! One lock guards one state machine covering both channels. Leaving
//! `Pending` for `Fulfilled` discards the rejection observers, leaving it for
//! `Rejected` discards the fulfillment observers, and `Cancelled` discards
//! both. Observers are pulled out under the lock and scheduled after it is
//! released, so a registration racing with settlement lands either in the
//! drained list or sees the settled state, never both and never neither.
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Poll, Waker};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::{Error, Executor};

pub(crate) type Callback<V> = Box<dyn FnOnce(V) + Send + 'static>;

/// What a waiter gets back from a settled cell.
pub(crate) type Outcome<T, E> = Result<Result<T, E>, Error>;

struct Observer<V> {
    executor: Executor,
    callback: Callback<V>,
}

impl<V: Send + 'static> Observer<V> {
    fn schedule(self, value: V) {
        let Observer { executor, callback } = self;
        executor.spawn(move || callback(value));
    }
}

struct Pending<T, E> {
    on_fulfilled: Vec<Observer<T>>,
    on_rejected: Vec<Observer<E>>,
    wakers: Vec<Waker>,
}

impl<T, E> Pending<T, E> {
    fn wake(self) -> (Vec<Observer<T>>, Vec<Observer<E>>) {
        for waker in self.wakers {
            waker.wake();
        }
        (self.on_fulfilled, self.on_rejected)
    }
}

enum State<T, E> {
    Pending(Pending<T, E>),
    Fulfilled(T),
    Rejected(E),
    Cancelled,
}

impl<T, E> State<T, E> {
    fn name(&self) -> &'static str {
        match self {
            State::Pending(_) => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
            State::Cancelled => "cancelled",
        }
    }
}

pub(crate) struct Cell<T, E> {
    state: Mutex<State<T, E>>,
    settled: Condvar,
    // Set once anyone has looked at, or subscribed to, the failure channel.
    observed: AtomicBool,
}

impl<T, E> Cell<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn with_state(state: State<T, E>) -> Self {
        Self {
            state: Mutex::new(state),
            settled: Condvar::new(),
            observed: AtomicBool::new(false),
        }
    }

    pub(crate) fn pending() -> Self {
        Self::with_state(State::Pending(Pending {
            on_fulfilled: Vec::new(),
            on_rejected: Vec::new(),
            wakers: Vec::new(),
        }))
    }

    pub(crate) fn fulfilled(value: T) -> Self {
        Self::with_state(State::Fulfilled(value))
    }

    pub(crate) fn rejected(error: E) -> Self {
        Self::with_state(State::Rejected(error))
    }

    /// Swaps in `next` if still pending and hands back the pending lists.
    fn transition(&self, next: State<T, E>) -> Option<Pending<T, E>> {
        let previous = {
            let mut state = self.state.lock();
            if !matches!(*state, State::Pending(_)) {
                return None;
            }
            mem::replace(&mut *state, next)
        };
        self.settled.notify_all();
        match previous {
            State::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    pub(crate) fn fulfill(&self, value: T) -> bool {
        let Some(pending) = self.transition(State::Fulfilled(value.clone())) else {
            return false;
        };
        let (on_fulfilled, on_rejected) = pending.wake();
        drop(on_rejected);
        for observer in on_fulfilled {
            observer.schedule(value.clone());
        }
        true
    }

    pub(crate) fn reject(&self, error: E) -> bool {
        let Some(pending) = self.transition(State::Rejected(error.clone())) else {
            return false;
        };
        let (on_fulfilled, on_rejected) = pending.wake();
        drop(on_fulfilled);
        if !on_rejected.is_empty() {
            self.observed.store(true, Ordering::Relaxed);
        }
        for observer in on_rejected {
            observer.schedule(error.clone());
        }
        true
    }

    pub(crate) fn cancel(&self) -> bool {
        let Some(pending) = self.transition(State::Cancelled) else {
            return false;
        };
        let (on_fulfilled, on_rejected) = pending.wake();
        log::trace!(
            "cancelled promise dropped {} observers",
            on_fulfilled.len() + on_rejected.len()
        );
        true
    }

    pub(crate) fn on_fulfilled(&self, executor: &Executor, callback: Callback<T>) {
        let value = match &mut *self.state.lock() {
            State::Pending(pending) => {
                pending.on_fulfilled.push(Observer {
                    executor: executor.clone(),
                    callback,
                });
                return;
            }
            State::Fulfilled(value) => value.clone(),
            State::Rejected(_) | State::Cancelled => return,
        };
        executor.spawn(move || callback(value));
    }

    pub(crate) fn on_rejected(&self, executor: &Executor, callback: Callback<E>) {
        self.observed.store(true, Ordering::Relaxed);
        let error = match &mut *self.state.lock() {
            State::Pending(pending) => {
                pending.on_rejected.push(Observer {
                    executor: executor.clone(),
                    callback,
                });
                return;
            }
            State::Rejected(error) => error.clone(),
            State::Fulfilled(_) | State::Cancelled => return,
        };
        executor.spawn(move || callback(error));
    }

    pub(crate) fn value(&self) -> Option<T> {
        match &*self.state.lock() {
            State::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub(crate) fn error(&self) -> Option<E> {
        match &*self.state.lock() {
            State::Rejected(error) => {
                self.observed.store(true, Ordering::Relaxed);
                Some(error.clone())
            }
            _ => None,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), State::Pending(_))
    }

    pub(crate) fn is_fulfilled(&self) -> bool {
        matches!(*self.state.lock(), State::Fulfilled(_))
    }

    pub(crate) fn is_rejected(&self) -> bool {
        matches!(*self.state.lock(), State::Rejected(_))
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), State::Cancelled)
    }

    fn outcome(&self, state: &State<T, E>) -> Option<Outcome<T, E>> {
        match state {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(Ok(value.clone()))),
            State::Rejected(error) => {
                self.observed.store(true, Ordering::Relaxed);
                Some(Ok(Err(error.clone())))
            }
            State::Cancelled => Some(Err(Error::Cancelled)),
        }
    }

    pub(crate) fn poll_settled(&self, waker: &Waker) -> Poll<Outcome<T, E>> {
        let mut state = self.state.lock();
        if let Some(outcome) = self.outcome(&state) {
            return Poll::Ready(outcome);
        }
        if let State::Pending(pending) = &mut *state {
            if !pending.wakers.iter().any(|w| w.will_wake(waker)) {
                pending.wakers.push(waker.clone());
            }
        }
        Poll::Pending
    }

    /// Blocks until settled, or until `deadline` passes.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> Outcome<T, E> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = self.outcome(&state) {
                return outcome;
            }
            match deadline {
                None => self.settled.wait(&mut state),
                Some(deadline) => {
                    if self.settled.wait_until(&mut state, deadline).timed_out() {
                        return self.outcome(&state).unwrap_or(Err(Error::Timeout));
                    }
                }
            }
        }
    }
}

impl<T, E> fmt::Debug for Cell<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("state", &self.state.lock().name())
            .finish()
    }
}

impl<T, E> Drop for Cell<T, E> {
    fn drop(&mut self) {
        match self.state.get_mut() {
            State::Pending(pending) => log::trace!(
                "promise dropped while pending with {} observers",
                pending.on_fulfilled.len() + pending.on_rejected.len()
            ),
            State::Rejected(_) if !*self.observed.get_mut() => {
                log::debug!("rejected promise dropped without anyone observing the error")
            }
            _ => {}
        }
    }
}
