mod common;

use common::ManualQueue;
use dispatch_promise::{all_on, Promise};

#[test]
fn test_settled_chain_is_reclaimed() {
    let queue = ManualQueue::default();
    let executor = queue.executor();
    let source = Promise::<i32, String>::pending();
    let weak_source = source.downgrade();
    let (weak_first, weak_second) = {
        let first = source.then_on(&executor, |x| Ok(x + 1));
        let second = first.catch_on(&executor, |_| Ok(0));
        (first.downgrade(), second.downgrade())
    };
    // Pending derived promises are held by the source's observers.
    assert!(weak_first.is_alive());
    assert!(weak_second.is_alive());

    source.fulfill(1);
    drop(source);
    queue.run_until_idle();

    assert!(!weak_source.is_alive());
    assert!(!weak_first.is_alive());
    assert!(!weak_second.is_alive());
}

#[test]
fn test_cancel_releases_derived_promises() {
    let queue = ManualQueue::default();
    let executor = queue.executor();
    let source = Promise::<i32, String>::pending();
    let weak_derived = source.then_on(&executor, |x| Ok(x)).downgrade();
    assert!(weak_derived.is_alive());
    source.cancel();
    assert!(!weak_derived.is_alive());
}

#[test]
fn test_derived_promise_does_not_pin_source() {
    let queue = ManualQueue::default();
    let executor = queue.executor();
    let source = Promise::<i32, String>::pending();
    let weak_source = source.downgrade();
    let derived = source.then_on(&executor, |x| Ok(x));
    drop(source);
    assert!(!weak_source.is_alive());
    assert!(derived.is_pending());
}

#[test]
fn test_fan_in_is_reclaimed() {
    let queue = ManualQueue::default();
    let executor = queue.executor();
    let inputs: Vec<Promise<i32, String>> = (0..3).map(|_| Promise::pending()).collect();
    let weak_inputs: Vec<_> = inputs.iter().map(Promise::downgrade).collect();
    let result = all_on(&executor, inputs.clone());
    let weak_result = result.downgrade();
    for (index, input) in inputs.iter().enumerate() {
        input.fulfill(index as i32);
    }
    drop(inputs);
    queue.run_until_idle();
    assert_eq!(result.value(), Some(vec![0, 1, 2]));
    drop(result);
    assert!(!weak_result.is_alive());
    assert!(weak_inputs.iter().all(|weak| !weak.is_alive()));
}
