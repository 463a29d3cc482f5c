use std::any::Any;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::executor::{Job, Schedule};
use crate::Error;

static DEFAULT_STACK_SIZE: usize = 262144usize;
static MAX_THREADS: usize = 1024;
static THREADS_ENV: &str = "DISPATCH_PROMISE_THREADS";

/// Sizing and naming of a [`ThreadPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on worker threads. Workers are spawned on demand.
    pub threads: usize,
    /// Prefix of every worker thread name.
    pub name: String,
    pub stack_size: usize,
}

impl PoolConfig {
    /// Reads the worker count from `DISPATCH_PROMISE_THREADS`, falling back
    /// to the hardware-derived default when unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(THREADS_ENV) {
            match value.trim().parse::<usize>() {
                Ok(threads) if threads > 0 => config.threads = threads.min(MAX_THREADS),
                _ => log::warn!("ignoring invalid {THREADS_ENV}={value:?}"),
            }
        }
        config
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let hw_parallelism = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            threads: (hw_parallelism * 2 + 1).min(MAX_THREADS),
            name: String::from("dispatch-promise"),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Builds a [`ThreadPool`] from a [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct Builder {
    config: PoolConfig,
}

impl Builder {
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads.clamp(1, MAX_THREADS);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.config.stack_size = stack_size;
        self
    }

    pub fn build(self) -> ThreadPool {
        ThreadPool::with_config(self.config)
    }
}

/// A FIFO work queue drained by a bounded set of worker threads.
///
/// With one worker the pool behaves like a serial queue: jobs run one at a
/// time in submission order. A job that panics is logged and the worker
/// moves on to the next one. Dropping the last clone shuts the pool down;
/// workers finish the queued jobs and exit.
#[derive(Clone)]
pub struct ThreadPool {
    handle: Arc<Handle>,
}

// Owned only by user-facing clones; workers hold `Shared` directly.
struct Handle {
    shared: Arc<Shared>,
}

struct Shared {
    config: PoolConfig,
    locked: Mutex<Locked>,
    available: Condvar,
}

struct Locked {
    queue: VecDeque<Job>,
    n_idle_workers: usize,
    workers: Vec<JoinHandle<()>>,
    closed: bool,
}

impl ThreadPool {
    pub fn builder() -> Builder {
        Builder {
            config: PoolConfig::from_env(),
        }
    }

    /// Builds a pool from `config`, clamping `threads` into `1..=1024`.
    pub fn with_config(mut config: PoolConfig) -> Self {
        config.threads = config.threads.clamp(1, MAX_THREADS);
        let capacity = config.threads;
        Self {
            handle: Arc::new(Handle {
                shared: Arc::new(Shared {
                    config,
                    locked: Mutex::new(Locked {
                        queue: VecDeque::new(),
                        n_idle_workers: 0,
                        workers: Vec::with_capacity(capacity),
                        closed: false,
                    }),
                    available: Condvar::new(),
                }),
            }),
        }
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.handle.shared
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared().config
    }

    /// Number of worker threads spawned so far.
    pub fn workers(&self) -> usize {
        self.shared().locked.lock().workers.len()
    }

    /// Refuses further work. Jobs already queued still run.
    pub fn shutdown(&self) {
        self.shared().shutdown();
    }

    /// Shuts the pool down and waits for every worker to exit.
    ///
    /// A worker calling this skips joining itself.
    pub fn join(&self) {
        let shared = self.shared();
        shared.shutdown();
        let workers = std::mem::take(&mut shared.locked.lock().workers);
        let current = std::thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                log::error!("{}: worker exited by panic", shared.config.name);
            }
        }
    }
}

impl Shared {
    fn shutdown(&self) {
        self.locked.lock().closed = true;
        self.available.notify_all();
    }

    fn next_job(&self) -> Option<Job> {
        let mut pool = self.locked.lock();
        loop {
            match pool.queue.pop_front() {
                Some(job) => return Some(job),
                None if pool.closed => return None,
                None => {
                    pool.n_idle_workers += 1;
                    self.available.wait(&mut pool);
                    pool.n_idle_workers -= 1;
                }
            }
        }
    }

    fn worker(shared: Arc<Shared>, id: usize) -> std::io::Result<JoinHandle<()>> {
        let name = format!("{}-{id}", shared.config.name);
        let stack_size = shared.config.stack_size;
        std::thread::Builder::new()
            .name(name)
            .stack_size(stack_size)
            .spawn(move || {
                log::trace!("Worker {id}: starting");
                while let Some(job) = shared.next_job() {
                    if let Err(cause) = catch_unwind(AssertUnwindSafe(job)) {
                        log::error!("Worker {id}: job panicked: {}", panic_message(&*cause));
                    }
                }
                log::trace!("Worker {id}: exiting");
            })
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl Schedule for ThreadPool {
    fn submit(&self, job: Job) -> Result<(), Error> {
        let shared = self.shared();
        let need_notify = {
            let mut pool = shared.locked.lock();
            if pool.closed {
                return Err(Error::Shutdown);
            }
            pool.queue.push_back(job);
            if pool.n_idle_workers == 0 && pool.workers.len() < shared.config.threads {
                let id = pool.workers.len();
                match Shared::worker(Arc::clone(shared), id) {
                    Ok(worker) => pool.workers.push(worker),
                    Err(err) if pool.workers.is_empty() => {
                        pool.queue.pop_back();
                        return Err(Error::Spawn(err));
                    }
                    Err(err) => log::warn!("{}: cannot grow pool: {err}", shared.config.name),
                }
            }
            pool.n_idle_workers > 0
        };
        if need_notify {
            shared.available.notify_one();
        }
        Ok(())
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("config", self.config())
            .finish_non_exhaustive()
    }
}

pub(crate) fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn test_serial_pool_keeps_fifo_order() {
        let pool = ThreadPool::builder().threads(1).name("serial").build();
        let (tx, rx) = channel();
        for i in 0..100 {
            let tx = tx.clone();
            pool.submit(Box::new(move || tx.send(i).unwrap())).unwrap();
        }
        let received: Vec<i32> = (0..100)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(received, (0..100).collect::<Vec<_>>());
        assert_eq!(pool.workers(), 1);
        pool.join();
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = ThreadPool::builder().threads(1).build();
        pool.submit(Box::new(|| panic!("boom"))).unwrap();
        let (tx, rx) = channel();
        pool.submit(Box::new(move || tx.send(42).unwrap())).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        pool.join();
    }

    #[test]
    fn test_shutdown_refuses_work() {
        let pool = ThreadPool::builder().threads(2).build();
        pool.shutdown();
        assert!(matches!(
            pool.submit(Box::new(|| {})),
            Err(Error::Shutdown)
        ));
    }

    #[test]
    fn test_builder_clamps_threads() {
        let pool = ThreadPool::builder().threads(0).build();
        assert_eq!(pool.config().threads, 1);
        let pool = ThreadPool::builder().threads(5000).build();
        assert_eq!(pool.config().threads, MAX_THREADS);
    }

    #[test]
    fn test_dropping_last_handle_stops_workers() {
        let pool = ThreadPool::builder().threads(3).name("dropped").build();
        let (tx, rx) = channel();
        for i in 0..3 {
            let tx = tx.clone();
            pool.submit(Box::new(move || {
                std::thread::sleep(Duration::from_millis(10));
                tx.send(i).unwrap();
            }))
            .unwrap();
        }
        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert!(pool.workers() > 0);
        // Every live worker owns a strong reference to the shared state.
        let shared = Arc::downgrade(pool.shared());
        let clone = pool.clone();
        drop(pool);
        assert!(shared.upgrade().is_some());
        drop(clone);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while shared.strong_count() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(shared.strong_count(), 0);
    }

    #[test]
    fn test_queued_jobs_run_after_last_handle_drops() {
        let pool = ThreadPool::builder().threads(1).build();
        let (tx, rx) = channel();
        for i in 0..10 {
            let tx = tx.clone();
            pool.submit(Box::new(move || tx.send(i).unwrap())).unwrap();
        }
        drop(pool);
        let received: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_with_config_clamps_zero_threads() {
        let config = PoolConfig {
            threads: 0,
            ..PoolConfig::default()
        };
        let pool = ThreadPool::with_config(config);
        assert_eq!(pool.config().threads, 1);
        let (tx, rx) = channel();
        pool.submit(Box::new(move || tx.send(1).unwrap())).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert_eq!(pool.workers(), 1);
        pool.join();
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(3);
        assert_eq!(panic_message(&*payload), "<non-string panic payload>");
    }
}
