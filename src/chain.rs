//! Continuations on a [`Promise`].
//!
//! Every combinator comes in two forms: one taking an explicit executor
//! (`*_on`) and one using the process-wide default executor. Derived
//! promises are wired to their source only through observer closures held by
//! the source, so a chain never keeps its upstream alive.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::promise::guarded;
use crate::{Executor, Promise, Resolver};

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Runs `f` with the value once fulfilled. Returns `self`.
    pub fn on_fulfilled<F>(&self, f: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_fulfilled_on(&Executor::default(), f)
    }

    pub fn on_fulfilled_on<F>(&self, executor: &Executor, f: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.cell.on_fulfilled(executor, Box::new(f));
        self
    }

    /// Runs `f` with the error once rejected. Returns `self`.
    pub fn on_rejected<F>(&self, f: F) -> &Self
    where
        F: FnOnce(E) + Send + 'static,
    {
        self.on_rejected_on(&Executor::default(), f)
    }

    pub fn on_rejected_on<F>(&self, executor: &Executor, f: F) -> &Self
    where
        F: FnOnce(E) + Send + 'static,
    {
        self.cell.on_rejected(executor, Box::new(f));
        self
    }

    /// Runs `f` once settled either way. A cancelled promise never runs it.
    pub fn always<F>(&self, f: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.always_on(&Executor::default(), f)
    }

    pub fn always_on<F>(&self, executor: &Executor, f: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(f)));
        let other = Arc::clone(&slot);
        self.on_fulfilled_on(executor, move |_| {
            if let Some(f) = slot.lock().take() {
                f()
            }
        });
        self.on_rejected_on(executor, move |_| {
            if let Some(f) = other.lock().take() {
                f()
            }
        })
    }

    /// Settles `other` the same way this promise settles.
    pub fn bind(&self, other: &Promise<T, E>) -> &Self {
        self.bind_on(&Executor::default(), other)
    }

    pub fn bind_on(&self, executor: &Executor, other: &Promise<T, E>) -> &Self {
        self.forward_to(executor, other.resolver())
    }

    fn forward_to(&self, executor: &Executor, resolver: Resolver<T, E>) -> &Self {
        let on_error = resolver.clone();
        self.on_fulfilled_on(executor, move |value| {
            resolver.fulfill(value);
        })
        .on_rejected_on(executor, move |error| {
            on_error.reject(error);
        })
    }

    fn forward_rejection<U>(&self, executor: &Executor, resolver: Resolver<U, E>)
    where
        U: Clone + Send + 'static,
    {
        self.on_rejected_on(executor, move |error| {
            resolver.reject(error);
        });
    }

    /// Transforms the value with `f`, which may fail.
    ///
    /// A rejection of this promise skips `f` and rejects the derived promise
    /// with the same error.
    ///
    /// # Examples
    ///
    /// ```
    /// use dispatch_promise::Promise;
    ///
    /// let next = Promise::<i32, String>::of(42).then(|n| Ok(n + 1));
    /// assert_eq!(next.wait().unwrap(), Ok(43));
    /// ```
    pub fn then<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        self.then_on(&Executor::default(), f)
    }

    pub fn then_on<U, F>(&self, executor: &Executor, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        if let Some(error) = self.error() {
            return Promise::of_error(error);
        }
        let derived = Promise::pending();
        let resolver = derived.resolver();
        self.on_fulfilled_on(executor, move |value| resolver.complete_with(|| f(value)));
        self.forward_rejection(executor, derived.resolver());
        derived
    }

    /// Like [`then`](Self::then), for transforms that cannot fail.
    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map_on(&Executor::default(), f)
    }

    pub fn map_on<U, F>(&self, executor: &Executor, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then_on(executor, move |value| Ok(f(value)))
    }

    /// Runs `f` for its side effect and passes the value through unchanged,
    /// unless `f` fails.
    pub fn inspect<F>(&self, f: F) -> Promise<T, E>
    where
        F: FnOnce(&T) -> Result<(), E> + Send + 'static,
    {
        self.inspect_on(&Executor::default(), f)
    }

    pub fn inspect_on<F>(&self, executor: &Executor, f: F) -> Promise<T, E>
    where
        F: FnOnce(&T) -> Result<(), E> + Send + 'static,
    {
        self.then_on(executor, move |value| f(&value).map(|()| value))
    }

    /// Chains another asynchronous step: the derived promise settles when
    /// the promise returned by `f` does.
    pub fn and_then<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U, E> + Send + 'static,
    {
        self.and_then_on(&Executor::default(), f)
    }

    pub fn and_then_on<U, F>(&self, executor: &Executor, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U, E> + Send + 'static,
    {
        if let Some(error) = self.error() {
            return Promise::of_error(error);
        }
        let derived = Promise::pending();
        let resolver = derived.resolver();
        let inner_executor = executor.clone();
        self.on_fulfilled_on(executor, move |value| match guarded(|| f(value)) {
            Some(inner) => {
                inner.forward_to(&inner_executor, resolver);
            }
            None => {
                resolver.cancel();
            }
        });
        self.forward_rejection(executor, derived.resolver());
        derived
    }

    /// Recovers from a rejection with `f`. A fulfilled value passes through
    /// untouched.
    pub fn catch<F>(&self, f: F) -> Promise<T, E>
    where
        F: FnOnce(E) -> Result<T, E> + Send + 'static,
    {
        self.catch_on(&Executor::default(), f)
    }

    pub fn catch_on<F>(&self, executor: &Executor, f: F) -> Promise<T, E>
    where
        F: FnOnce(E) -> Result<T, E> + Send + 'static,
    {
        let derived = Promise::pending();
        let resolver = derived.resolver();
        let on_success = derived.resolver();
        self.on_fulfilled_on(executor, move |value| {
            on_success.fulfill(value);
        })
        .on_rejected_on(executor, move |error| resolver.complete_with(|| f(error)));
        derived
    }

    /// Like [`catch`](Self::catch), but recovers asynchronously with the
    /// promise returned by `f`.
    pub fn or_else<F>(&self, f: F) -> Promise<T, E>
    where
        F: FnOnce(E) -> Promise<T, E> + Send + 'static,
    {
        self.or_else_on(&Executor::default(), f)
    }

    pub fn or_else_on<F>(&self, executor: &Executor, f: F) -> Promise<T, E>
    where
        F: FnOnce(E) -> Promise<T, E> + Send + 'static,
    {
        let derived = Promise::pending();
        let resolver = derived.resolver();
        let on_success = derived.resolver();
        let inner_executor = executor.clone();
        self.on_fulfilled_on(executor, move |value| {
            on_success.fulfill(value);
        })
        .on_rejected_on(executor, move |error| match guarded(|| f(error)) {
            Some(inner) => {
                inner.forward_to(&inner_executor, resolver);
            }
            None => {
                resolver.cancel();
            }
        });
        derived
    }
}
