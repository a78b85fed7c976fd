// src/exec/thread_pool.rs

//! Worker threads executing algorithm bodies.
//!
//! Algorithms are synchronous and may block, so they run on a rayon pool
//! rather than on the Tokio runtime. Each job is told which worker runs it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use rayon::ThreadPoolBuildError;
use tracing::{debug, info, warn};

use crate::errors::SchedulingError;

pub type WorkerId = usize;

pub type Job = Box<dyn FnOnce(WorkerId) + Send + 'static>;

/// Where the scheduler sends execution tasks.
pub trait ThreadPool: Send + Sync {
    fn submit(&self, job: Job) -> Result<(), SchedulingError>;

    fn size(&self) -> usize;
}

/// Per-thread setup run once on every worker before its first job.
pub trait ThreadInitHook: Send + Sync {
    fn init_thread(&self, worker: WorkerId);
}

/// Which workers already ran their init hooks.
#[derive(Debug)]
pub struct WorkerInitTable {
    done: Vec<AtomicBool>,
}

impl WorkerInitTable {
    fn new(workers: usize) -> Self {
        Self {
            done: (0..workers).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn is_initialized(&self, worker: WorkerId) -> bool {
        self.done
            .get(worker)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub fn initialized_count(&self) -> usize {
        self.done
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    fn mark(&self, worker: WorkerId) {
        if let Some(flag) = self.done.get(worker) {
            flag.store(true, Ordering::Release);
        }
    }
}

/// Jobs handed to rayon that have not returned yet.
#[derive(Debug, Default)]
struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    fn enter(self: &Arc<Self>) -> OutstandingGuard {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        OutstandingGuard(Arc::clone(self))
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Decrements on drop, so a panicking job is still accounted for.
struct OutstandingGuard(Arc<Outstanding>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Fixed-size pool of named worker threads (`hive-worker-N`).
pub struct WorkerPool {
    size: usize,
    pool: Mutex<Option<rayon::ThreadPool>>,
    outstanding: Arc<Outstanding>,
    init: Arc<WorkerInitTable>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("initialized", &self.init.initialized_count())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(
        size: usize,
        hooks: Vec<Arc<dyn ThreadInitHook>>,
    ) -> Result<Self, ThreadPoolBuildError> {
        let init = Arc::new(WorkerInitTable::new(size));
        let hooks: Arc<[Arc<dyn ThreadInitHook>]> = hooks.into();

        let start_init = Arc::clone(&init);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|worker| format!("hive-worker-{worker}"))
            .start_handler(move |worker| {
                debug!(worker, "initializing worker thread");
                for hook in hooks.iter() {
                    hook.init_thread(worker);
                }
                start_init.mark(worker);
            })
            .exit_handler(|worker| debug!(worker, "worker thread exiting"))
            .panic_handler(|_| warn!("worker job panicked"))
            .build()?;

        info!(size, "worker pool started");

        Ok(Self {
            size,
            pool: Mutex::new(Some(pool)),
            outstanding: Arc::new(Outstanding::default()),
            init,
        })
    }

    pub fn init_table(&self) -> &Arc<WorkerInitTable> {
        &self.init
    }

    /// Stop accepting jobs and wait for the submitted ones to finish.
    pub fn shutdown(&self) {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(pool) = pool else {
            return;
        };

        // A job may hold the last reference to this pool; it cannot wait on itself.
        let on_worker = pool.current_thread_index().is_some();
        drop(pool);
        if !on_worker {
            self.outstanding.wait_idle();
        }
    }
}

impl ThreadPool for WorkerPool {
    fn submit(&self, job: Job) -> Result<(), SchedulingError> {
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pool) = pool.as_ref() else {
            return Err(SchedulingError::SchedulerStopped);
        };

        let guard = self.outstanding.enter();
        pool.spawn(move || {
            let _guard = guard;
            job(rayon::current_thread_index().unwrap_or_default());
        });
        Ok(())
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc as std_mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    struct CountingHook(AtomicUsize);

    impl ThreadInitHook for CountingHook {
        fn init_thread(&self, _worker: WorkerId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn runs_jobs_on_named_workers() {
        let pool = WorkerPool::new(2, Vec::new()).unwrap();
        let (tx, rx) = std_mpsc::channel();

        for _ in 0..4 {
            let tx = tx.clone();
            pool.submit(Box::new(move |worker| {
                let name = thread::current().name().map(str::to_string);
                tx.send((worker, name)).unwrap();
            }))
            .unwrap();
        }

        for _ in 0..4 {
            let (worker, name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(worker < 2);
            assert_eq!(name, Some(format!("hive-worker-{worker}")));
        }
    }

    #[test]
    fn init_hooks_run_once_per_worker() {
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let pool = WorkerPool::new(1, vec![hook.clone() as Arc<dyn ThreadInitHook>]).unwrap();
        let (tx, rx) = std_mpsc::channel();

        for _ in 0..3 {
            let tx = tx.clone();
            let table = Arc::clone(pool.init_table());
            pool.submit(Box::new(move |worker| {
                tx.send(table.is_initialized(worker)).unwrap();
            }))
            .unwrap();
        }

        for _ in 0..3 {
            assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
        assert!(!pool.init_table().is_initialized(7));
    }

    #[test]
    fn shutdown_waits_for_submitted_jobs() {
        let pool = WorkerPool::new(2, Vec::new()).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let done = Arc::clone(&done);
            pool.submit(Box::new(move |_| {
                thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn panicking_job_does_not_block_shutdown() {
        let pool = WorkerPool::new(1, Vec::new()).unwrap();
        pool.submit(Box::new(|_| panic!("boom"))).unwrap();
        pool.shutdown();
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let pool = WorkerPool::new(1, Vec::new()).unwrap();
        pool.shutdown();
        let err = pool.submit(Box::new(|_| {})).unwrap_err();
        assert_eq!(err, SchedulingError::SchedulerStopped);
    }
}
