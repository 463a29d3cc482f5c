use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::cell::Cell;
use crate::pool::panic_message;
use crate::{Error, Executor};

/// The eventual result of an asynchronous computation.
///
/// A promise is a cheap, cloneable handle; every clone observes and settles
/// the same underlying cell. It starts out pending, fulfilled (see
/// [`Promise::of`]) or rejected (see [`Promise::of_error`]), and a pending
/// promise settles at most once. The first of [`fulfill`](Self::fulfill) and
/// [`reject`](Self::reject) wins; later calls are ignored.
///
/// # Examples
///
/// ```
/// use dispatch_promise::Promise;
///
/// let promise = Promise::<i32, String>::pending();
/// assert!(promise.fulfill(42));
/// assert!(!promise.reject("too late".into()));
/// assert_eq!(promise.value(), Some(42));
/// assert!(promise.is_fulfilled());
/// ```
pub struct Promise<T, E> {
    pub(crate) cell: Arc<Cell<T, E>>,
}

/// The producing half of a [`Promise`].
///
/// Hand this to whatever external operation will eventually complete the
/// promise. Clones share the promise, so the first call to
/// [`fulfill`](Self::fulfill) or [`reject`](Self::reject) across all of them
/// wins.
///
/// # Examples
///
/// ```
/// use dispatch_promise::Promise;
/// use futures::executor::block_on;
/// use std::thread;
/// let promise = Promise::<(), String>::pending();
/// let resolver = promise.resolver();
/// let task = thread::spawn(move || resolver.reject(String::from("💥")));
/// assert_eq!(block_on(promise).unwrap(), Err(String::from("💥")));
/// task.join().expect("The task thread has panicked");
/// ```
pub struct Resolver<T, E> {
    cell: Arc<Cell<T, E>>,
}

/// A non-owning reference to a [`Promise`].
pub struct WeakPromise<T, E> {
    cell: Weak<Cell<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// A promise waiting for someone to settle it.
    pub fn pending() -> Self {
        Self {
            cell: Arc::new(Cell::pending()),
        }
    }

    /// An already fulfilled promise.
    pub fn of(value: T) -> Self {
        Self {
            cell: Arc::new(Cell::fulfilled(value)),
        }
    }

    /// An already rejected promise.
    pub fn of_error(error: E) -> Self {
        Self {
            cell: Arc::new(Cell::rejected(error)),
        }
    }

    pub fn from_result(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::of(value),
            Err(error) => Self::of_error(error),
        }
    }

    /// Runs `work` on the default executor. See [`run_on`](Self::run_on).
    pub fn run<F>(work: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::run_on(&Executor::default(), work)
    }

    /// Submits `work` to `executor` and settles with what it returns.
    ///
    /// If the executor refuses the work, or `work` panics, the promise is
    /// cancelled.
    pub fn run_on<F>(executor: &Executor, work: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let promise = Self::pending();
        let resolver = promise.resolver();
        if !executor.spawn(move || resolver.complete_with(work)) {
            promise.cancel();
        }
        promise
    }

    /// Runs `work` on the default executor. See
    /// [`run_async_on`](Self::run_async_on).
    pub fn run_async<F>(work: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E> + Send + 'static,
    {
        Self::run_async_on(&Executor::default(), work)
    }

    /// Submits `work` to `executor`, handing it a [`Resolver`] for this
    /// promise so that it can settle it later, from anywhere.
    ///
    /// An `Err` returned synchronously by `work` rejects the promise.
    pub fn run_async_on<F>(executor: &Executor, work: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E> + Send + 'static,
    {
        let promise = Self::pending();
        let resolver = promise.resolver();
        let started = executor.spawn(move || {
            let handle = resolver.clone();
            match guarded(move || work(handle)) {
                Some(Ok(())) => {}
                Some(Err(error)) => {
                    resolver.reject(error);
                }
                None => {
                    resolver.cancel();
                }
            }
        });
        if !started {
            promise.cancel();
        }
        promise
    }

    /// Fulfills the promise. Returns `false`, changing nothing, if it had
    /// already settled or was cancelled.
    pub fn fulfill(&self, value: T) -> bool {
        self.cell.fulfill(value)
    }

    /// Rejects the promise. Returns `false`, changing nothing, if it had
    /// already settled or was cancelled.
    pub fn reject(&self, error: E) -> bool {
        self.cell.reject(error)
    }

    /// Stops this promise from ever notifying anyone.
    ///
    /// Observers attached so far are dropped and the promise stays unsettled
    /// for good. Work already submitted to produce the value keeps running;
    /// its result is ignored.
    pub fn cancel(&self) -> bool {
        self.cell.cancel()
    }

    pub fn resolver(&self) -> Resolver<T, E> {
        Resolver {
            cell: Arc::clone(&self.cell),
        }
    }

    pub fn downgrade(&self) -> WeakPromise<T, E> {
        WeakPromise {
            cell: Arc::downgrade(&self.cell),
        }
    }

    pub fn value(&self) -> Option<T> {
        self.cell.value()
    }

    pub fn error(&self) -> Option<E> {
        self.cell.error()
    }

    pub fn is_pending(&self) -> bool {
        self.cell.is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        self.cell.is_fulfilled()
    }

    pub fn is_rejected(&self) -> bool {
        self.cell.is_rejected()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cell.is_cancelled()
    }

    /// Blocks the current thread until the promise settles.
    ///
    /// Calling this from a job running on the executor that is supposed to
    /// settle the promise deadlocks a single-worker executor.
    pub fn wait(&self) -> Result<Result<T, E>, Error> {
        self.cell.wait(None)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<Result<T, E>, Error> {
        self.cell.wait(Some(Instant::now() + timeout))
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn fulfill(&self, value: T) -> bool {
        self.cell.fulfill(value)
    }

    pub fn reject(&self, error: E) -> bool {
        self.cell.reject(error)
    }

    pub fn settle(&self, result: Result<T, E>) -> bool {
        match result {
            Ok(value) => self.fulfill(value),
            Err(error) => self.reject(error),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.cell.is_pending()
    }

    pub(crate) fn cancel(&self) -> bool {
        self.cell.cancel()
    }

    /// Settles with the result of `work`, cancelling instead if it panics.
    pub(crate) fn complete_with<F>(&self, work: F)
    where
        F: FnOnce() -> Result<T, E>,
    {
        match guarded(work) {
            Some(result) => {
                self.settle(result);
            }
            None => {
                self.cancel();
            }
        }
    }
}

impl<T, E> WeakPromise<T, E> {
    pub fn upgrade(&self) -> Option<Promise<T, E>> {
        self.cell.upgrade().map(|cell| Promise { cell })
    }

    pub fn is_alive(&self) -> bool {
        self.cell.strong_count() > 0
    }
}

/// Runs user code, turning a panic into `None`.
pub(crate) fn guarded<R>(work: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => Some(result),
        Err(cause) => {
            log::error!(
                "continuation panicked, cancelling its promise: {}",
                panic_message(&*cause)
            );
            None
        }
    }
}

impl<T, E> Future for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<Result<T, E>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.cell.poll_settled(cx.waker())
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T, E> Clone for WeakPromise<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Promise").field(&self.cell).finish()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolver").field(&self.cell).finish()
    }
}

impl<T, E> fmt::Debug for WeakPromise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakPromise")
            .field("alive", &self.is_alive())
            .finish()
    }
}
