#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dispatch_promise::{Error, Executor, Job, Schedule};
use parking_lot::Mutex;

/// Executor whose jobs only run when the test drains it.
#[derive(Clone, Default)]
pub struct ManualQueue {
    jobs: Arc<Mutex<VecDeque<Job>>>,
}

impl ManualQueue {
    pub fn executor(&self) -> Executor {
        Executor::new(self.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.jobs.lock().pop_front();
            match next {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Schedule for ManualQueue {
    fn submit(&self, job: Job) -> Result<(), Error> {
        self.jobs.lock().push_back(job);
        Ok(())
    }
}

pub const TIMEOUT: Duration = Duration::from_secs(10);
