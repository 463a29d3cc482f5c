//! Single-assignment promises whose continuations run on an [`Executor`].
//!
//! A [`Promise`] settles at most once, either fulfilled with a value or
//! rejected with an error. Continuations attached with [`Promise::then`],
//! [`Promise::catch`] and friends never run on the caller's stack: they are
//! submitted to an executor once the source settles. Fan-in over several
//! promises is available through [`all`], [`tuple`] and [`tuple3`].
//!
//! # Examples
//!
//! ```
//! use dispatch_promise::{Promise, ThreadPool, Executor};
//!
//! let pool = Executor::new(ThreadPool::builder().threads(2).build());
//! let answer = Promise::<i32, String>::run_on(&pool, || Ok(41))
//!     .then_on(&pool, |n| Ok(n + 1));
//! assert_eq!(answer.wait().unwrap(), Ok(42));
//! ```
//!
//! Promises are also futures:
//!
//! ```
//! use dispatch_promise::Promise;
//! use futures::executor::block_on;
//! use std::thread;
//!
//! let promise = Promise::<String, ()>::pending();
//! let resolver = promise.resolver();
//! let task = thread::spawn(move || resolver.fulfill("🍓".into()));
//! assert_eq!(block_on(promise).unwrap(), Ok(String::from("🍓")));
//! task.join().expect("The task thread has panicked");
//! ```

mod barrier;
mod cell;
mod chain;
pub mod executor;
mod fan_in;
mod pool;
mod promise;

pub use executor::{Executor, Job, Schedule};
pub use fan_in::{all, all_on, tuple, tuple3, tuple3_on, tuple_on};
pub use pool::{Builder, PoolConfig, ThreadPool};
pub use promise::{Promise, Resolver, WeakPromise};

/// Failures raised by the promise machinery itself.
///
/// Domain errors travel through the `E` parameter of [`Promise`] and never
/// show up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the promise was cancelled before it settled")]
    Cancelled,
    #[error("timed out waiting for the promise to settle")]
    Timeout,
    #[error("the default executor has already been set")]
    DefaultExecutorSet,
    #[error("the executor has been shut down")]
    Shutdown,
    #[error("failed to spawn a worker thread")]
    Spawn(#[from] std::io::Error),
}
