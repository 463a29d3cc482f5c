//! Aggregating several promises into one.
//!
//! The aggregate fulfills once every input has fulfilled and rejects with
//! whichever input error arrives first. Inputs that are still running after
//! a rejection keep running; their results are discarded.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::barrier::Countdown;
use crate::{Executor, Promise, Resolver};

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Registers `input` with the countdown, storing its value in `slot` or
/// rejecting the aggregate through `resolver`.
fn gather<V, R, E>(
    executor: &Executor,
    barrier: &Arc<Countdown>,
    resolver: &Resolver<R, E>,
    input: &Promise<V, E>,
) -> Slot<V>
where
    V: Clone + Send + 'static,
    R: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let slot: Slot<V> = Arc::new(Mutex::new(None));
    barrier.enter();
    let on_value = (Arc::clone(&slot), Arc::clone(barrier));
    let on_error = (resolver.clone(), Arc::clone(barrier));
    input
        .on_fulfilled_on(executor, move |value| {
            let (slot, barrier) = on_value;
            *slot.lock() = Some(value);
            barrier.leave();
        })
        .on_rejected_on(executor, move |error| {
            let (resolver, barrier) = on_error;
            resolver.reject(error);
            barrier.leave();
        });
    slot
}

/// Waits for every promise in `promises`. See [`all_on`].
pub fn all<T, E, I>(promises: I) -> Promise<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    all_on(&Executor::default(), promises)
}

/// Fulfills with the values of `promises` in input order once all of them
/// have fulfilled, or rejects with the first error to arrive.
///
/// An empty input fulfills right away with an empty vector.
///
/// # Examples
///
/// ```
/// use dispatch_promise::{all, Promise};
///
/// let promises = vec![Promise::<i32, String>::of(42), Promise::of(13)];
/// assert_eq!(all(promises).wait().unwrap(), Ok(vec![42, 13]));
/// ```
pub fn all_on<T, E, I>(executor: &Executor, promises: I) -> Promise<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let promises: Vec<Promise<T, E>> = promises.into_iter().collect();
    if promises.is_empty() {
        return Promise::of(Vec::new());
    }
    let result = Promise::pending();
    let resolver = result.resolver();
    let barrier = Arc::new(Countdown::new());
    let slots: Vec<Slot<T>> = promises
        .iter()
        .map(|input| gather(executor, &barrier, &resolver, input))
        .collect();
    barrier.notify(executor, move || {
        // A rejection may have raced the last leave.
        if !resolver.is_pending() {
            return;
        }
        let values: Option<Vec<T>> = slots.iter().map(|slot| slot.lock().take()).collect();
        if let Some(values) = values {
            resolver.fulfill(values);
        }
    });
    result
}

/// Pairs two promises. See [`tuple_on`].
pub fn tuple<A, B, E>(first: &Promise<A, E>, second: &Promise<B, E>) -> Promise<(A, B), E>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    tuple_on(&Executor::default(), first, second)
}

/// Fulfills with both values once both promises fulfill, or rejects with
/// the first error to arrive.
pub fn tuple_on<A, B, E>(
    executor: &Executor,
    first: &Promise<A, E>,
    second: &Promise<B, E>,
) -> Promise<(A, B), E>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let result = Promise::pending();
    let resolver = result.resolver();
    let barrier = Arc::new(Countdown::new());
    let a = gather(executor, &barrier, &resolver, first);
    let b = gather(executor, &barrier, &resolver, second);
    barrier.notify(executor, move || {
        if !resolver.is_pending() {
            return;
        }
        if let (Some(a), Some(b)) = (a.lock().take(), b.lock().take()) {
            resolver.fulfill((a, b));
        }
    });
    result
}

/// Gathers three promises. See [`tuple3_on`].
pub fn tuple3<A, B, C, E>(
    first: &Promise<A, E>,
    second: &Promise<B, E>,
    third: &Promise<C, E>,
) -> Promise<(A, B, C), E>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    tuple3_on(&Executor::default(), first, second, third)
}

/// Three-way [`tuple_on`]: all three values, or the first error to arrive.
pub fn tuple3_on<A, B, C, E>(
    executor: &Executor,
    first: &Promise<A, E>,
    second: &Promise<B, E>,
    third: &Promise<C, E>,
) -> Promise<(A, B, C), E>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let result = Promise::pending();
    let resolver = result.resolver();
    let barrier = Arc::new(Countdown::new());
    let a = gather(executor, &barrier, &resolver, first);
    let b = gather(executor, &barrier, &resolver, second);
    let c = gather(executor, &barrier, &resolver, third);
    barrier.notify(executor, move || {
        if !resolver.is_pending() {
            return;
        }
        if let (Some(a), Some(b), Some(c)) = (a.lock().take(), b.lock().take(), c.lock().take()) {
            resolver.fulfill((a, b, c));
        }
    });
    result
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Pairs this promise with `other`, see [`tuple`].
    pub fn attach<U>(&self, other: &Promise<U, E>) -> Promise<(T, U), E>
    where
        U: Clone + Send + 'static,
    {
        tuple(self, other)
    }

    pub fn attach_on<U>(&self, executor: &Executor, other: &Promise<U, E>) -> Promise<(T, U), E>
    where
        U: Clone + Send + 'static,
    {
        tuple_on(executor, self, other)
    }

    pub fn attach2<U, V>(
        &self,
        second: &Promise<U, E>,
        third: &Promise<V, E>,
    ) -> Promise<(T, U, V), E>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        tuple3(self, second, third)
    }

    pub fn attach2_on<U, V>(
        &self,
        executor: &Executor,
        second: &Promise<U, E>,
        third: &Promise<V, E>,
    ) -> Promise<(T, U, V), E>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        tuple3_on(executor, self, second, third)
    }
}
