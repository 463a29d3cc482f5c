//! Destinations for deferred work.
//!
//! Every continuation in this crate is handed to an [`Executor`] instead of
//! being run inline. The crate ships [`ThreadPool`](crate::ThreadPool); any
//! other FIFO queue can take part by implementing [`Schedule`].
//!
//! One process-wide default executor backs the combinators that take no
//! executor argument. It can be installed once with [`set_default`] before
//! first use; otherwise a single-worker pool named `main` is created lazily.
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::{Error, ThreadPool};

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO queue that runs submitted jobs at some later point, off the
/// submitting call stack.
pub trait Schedule: Send + Sync + 'static {
    fn submit(&self, job: Job) -> Result<(), Error>;
}

/// Cloneable handle to a [`Schedule`] implementation.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<dyn Schedule>,
}

static DEFAULT: OnceLock<Executor> = OnceLock::new();

impl Executor {
    pub fn new<S: Schedule>(schedule: S) -> Self {
        Self {
            inner: Arc::new(schedule),
        }
    }

    pub fn from_arc(schedule: Arc<dyn Schedule>) -> Self {
        Self { inner: schedule }
    }

    /// The process-wide default executor.
    pub fn main() -> Self {
        DEFAULT
            .get_or_init(|| Executor::new(ThreadPool::builder().threads(1).name("main").build()))
            .clone()
    }

    pub fn submit<F>(&self, work: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.submit(Box::new(work))
    }

    /// Submits `work`, logging and dropping it if the executor refuses it.
    pub(crate) fn spawn<F>(&self, work: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.submit(work) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("dropping work refused by executor: {err}");
                false
            }
        }
    }

    pub fn ptr_eq(&self, other: &Executor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Executor::main()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("inner", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

impl From<ThreadPool> for Executor {
    fn from(pool: ThreadPool) -> Self {
        Executor::new(pool)
    }
}

/// Installs the process-wide default executor.
///
/// Fails with [`Error::DefaultExecutorSet`] if a default is already in
/// place, including the lazily created one.
pub fn set_default(executor: Executor) -> Result<(), Error> {
    DEFAULT
        .set(executor)
        .map_err(|_| Error::DefaultExecutorSet)
}
