mod common;

use std::thread;
use std::time::Duration;

use common::{ManualQueue, TIMEOUT};
use dispatch_promise::{all, all_on, tuple3_on, Executor, Promise, ThreadPool};
use proptest::prelude::*;

#[test]
fn test_all_with_staggered_delays() {
    let pool = Executor::new(ThreadPool::builder().threads(4).build());
    let delayed = |millis: u64, value: Option<i32>| {
        Promise::<Option<i32>, String>::run_on(&pool, move || {
            thread::sleep(Duration::from_millis(millis));
            Ok(value)
        })
    };
    let inputs = vec![delayed(30, Some(42)), delayed(10, Some(13)), delayed(20, None)];
    let result = all_on(&pool, inputs);
    assert_eq!(
        result.wait_timeout(TIMEOUT).unwrap(),
        Ok(vec![Some(42), Some(13), None])
    );
}

#[test]
fn test_all_rejects_with_early_failure() {
    let pool = Executor::new(ThreadPool::builder().threads(4).build());
    let slow = Promise::<i32, String>::run_on(&pool, || {
        thread::sleep(Duration::from_millis(50));
        Ok(42)
    });
    let fast = Promise::<i32, String>::run_on(&pool, || Err("fast failure".into()));
    let result = all_on(&pool, vec![slow.clone(), fast]);
    assert_eq!(
        result.wait_timeout(TIMEOUT).unwrap(),
        Err(String::from("fast failure"))
    );
    assert_eq!(slow.wait_timeout(TIMEOUT).unwrap(), Ok(42));
    assert!(result.is_rejected());
    assert_eq!(result.value(), None);
}

#[test]
fn test_all_of_nothing() {
    let result = all(Vec::<Promise<i32, String>>::new());
    assert_eq!(result.value(), Some(vec![]));
}

#[test]
fn test_tuple3_on_pool() {
    let pool = Executor::new(ThreadPool::builder().threads(2).build());
    let a = Promise::<i32, String>::run_on(&pool, || Ok(1));
    let b = Promise::<&'static str, String>::run_on(&pool, || Ok("two"));
    let c = Promise::<f64, String>::of(3.0);
    let result = tuple3_on(&pool, &a, &b, &c);
    assert_eq!(result.wait_timeout(TIMEOUT).unwrap(), Ok((1, "two", 3.0)));
}

proptest! {
    #[test]
    fn all_preserves_index_order(order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()) {
        let queue = ManualQueue::default();
        let executor = queue.executor();
        let inputs: Vec<Promise<usize, String>> = (0..8).map(|_| Promise::pending()).collect();
        let result = all_on(&executor, inputs.clone());
        for index in order {
            inputs[index].fulfill(index * 10);
            queue.run_until_idle();
        }
        prop_assert_eq!(result.value(), Some((0..8).map(|i| i * 10).collect::<Vec<_>>()));
    }

    #[test]
    fn all_takes_first_rejection_in_time(order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle()) {
        let queue = ManualQueue::default();
        let executor = queue.executor();
        let inputs: Vec<Promise<usize, usize>> = (0..6).map(|_| Promise::pending()).collect();
        let result = all_on(&executor, inputs.clone());
        let first = order[0];
        for index in order {
            inputs[index].reject(index);
            queue.run_until_idle();
        }
        prop_assert_eq!(result.error(), Some(first));
    }
}
