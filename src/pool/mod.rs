//! A named, fixed-capacity worker pool with lazy worker creation, a
//! shared FIFO queue, and idle reaping, modeled after the original
//! library's `LSThreadPool`.
//!
//! The pool maintains one shared FIFO and a pool-level monitor (shared
//! with every worker thread, see [`worker::SharedQueue`]). On submission
//! it pushes the invocation and wakes one waiter; if every worker is busy
//! and `live < size`, it additionally spawns a fresh worker so the new
//! item is picked up without waiting for an existing one to free up.

mod worker;

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use worker::{SharedQueue, Worker};

use crate::{
    delayed::DelayedCallService,
    error::{Error, Result},
    invocation::{ArgValue, Invocation, Selector, TargetHandle},
    log::{self, ls_log},
};

/// Wall-clock duration after which a non-working worker is eligible for
/// reaping.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(10);
/// Interval at which the idle-worker collector re-arms itself.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(15);

struct Inner {
    name: Arc<str>,
    size: u32,
    idle_threshold: Duration,
    reap_interval: Duration,
    shared_queue: Arc<SharedQueue>,
    workers: Mutex<Vec<Arc<Worker>>>,
    next_worker_id: AtomicU64,
    disposed: AtomicBool,
}

/// A named, bounded worker pool.
///
/// Cloning a `WorkerPool` is cheap and shares the same underlying pool;
/// it is a thin handle around the pool's shared state.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// Creates a pool named `name` with a maximum of `size` concurrently
    /// live workers. Rejects a zero size or an empty name with
    /// [`Error::invalid_argument`].
    pub fn create(name: impl Into<String>, size: u32) -> Result<WorkerPool> {
        Self::create_with_idle_threshold(name, size, DEFAULT_IDLE_THRESHOLD)
    }

    pub(crate) fn create_with_idle_threshold(
        name: impl Into<String>,
        size: u32,
        idle_threshold: Duration,
    ) -> Result<WorkerPool> {
        Self::create_with_schedule(name, size, idle_threshold, DEFAULT_REAP_INTERVAL)
    }

    /// Like [`create_with_idle_threshold`](Self::create_with_idle_threshold), but
    /// also lets the caller override the idle-worker reaper's re-arm interval
    /// instead of always using [`DEFAULT_REAP_INTERVAL`].
    pub(crate) fn create_with_schedule(
        name: impl Into<String>,
        size: u32,
        idle_threshold: Duration,
        reap_interval: Duration,
    ) -> Result<WorkerPool> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_argument("pool name must not be empty"));
        }
        if size == 0 {
            return Err(Error::invalid_argument("pool size must be positive"));
        }

        let pool = WorkerPool {
            inner: Arc::new(Inner {
                name: Arc::from(name.as_str()),
                size,
                idle_threshold,
                reap_interval,
                shared_queue: SharedQueue::new(),
                workers: Mutex::new(Vec::new()),
                next_worker_id: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        };

        pool.arm_reaper();
        Ok(pool)
    }

    /// The pool's diagnostic name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Enqueues a zero-argument callable, returning its [`Invocation`]
    /// immediately. Fails with [`Error::disposed`] after [`dispose`](Self::dispose).
    pub fn schedule<F>(&self, callable: F) -> Result<Arc<Invocation>>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_invocation(Invocation::from_call(callable, None))
    }

    /// Enqueues a target+selector invocation, returning its [`Invocation`]
    /// immediately.
    pub fn schedule_method(
        &self,
        target: TargetHandle,
        selector: Selector,
        arg: Option<ArgValue>,
    ) -> Result<Arc<Invocation>> {
        self.schedule_invocation(Invocation::from_method(target, selector, arg, None))
    }

    fn schedule_invocation(&self, invocation: Arc<Invocation>) -> Result<Arc<Invocation>> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(Error::disposed());
        }

        self.inner.shared_queue.push(invocation.clone());

        // The idle-count check and the spawn decision must happen under the
        // same lock acquisition: if they're read separately, two concurrent
        // submissions on a pool with no idle workers can each observe
        // `live < size` and both spawn, pushing `live` past `size`.
        {
            let mut workers = self.inner.workers.lock().unwrap();
            let no_idle_worker = !workers.iter().any(|w| !w.is_working());
            if no_idle_worker && workers.len() < self.inner.size as usize {
                self.spawn_worker_locked(&mut workers);
            }
        }

        ls_log!(
            log::THREAD_POOL,
            &self.inner.name,
            "scheduled invocation, queue depth now {}",
            self.inner.shared_queue.len()
        );

        Ok(invocation)
    }

    fn live_workers(&self) -> usize {
        self.inner.workers.lock().unwrap().len()
    }

    fn spawn_worker_locked(&self, workers: &mut Vec<Arc<Worker>>) {
        let id = self.inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::spawn(
            id,
            self.inner.name.clone(),
            self.inner.shared_queue.clone(),
            self.inner.idle_threshold,
        );
        workers.push(worker);
        ls_log!(log::THREAD_POOL, &self.inner.name, "spawned worker #{id}");
    }

    /// The current length of the shared pending queue.
    pub fn queue_size(&self) -> usize {
        self.inner.shared_queue.len()
    }

    /// The number of workers currently alive (bounded by `size`).
    pub fn live_worker_count(&self) -> usize {
        self.live_workers()
    }

    /// Marks the pool disposed, signals all workers to terminate after
    /// draining the shared queue, and refuses further submissions.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Release);
        let workers = self.inner.workers.lock().unwrap();
        for worker in workers.iter() {
            worker.stop();
        }
        // Workers may be blocked in `wait_timeout`; nudge them so they
        // observe `running == false` promptly instead of waiting out the
        // full idle threshold.
        self.inner.shared_queue.condvar.notify_all();
        for worker in workers.iter() {
            worker.join();
        }
    }

    fn arm_reaper(&self) {
        let pool = self.clone();
        let reap_interval = self.inner.reap_interval;
        DelayedCallService::shared().perform(move || pool.reap_idle_workers(), reap_interval);
    }

    fn reap_idle_workers(&self) {
        if self.inner.disposed.load(Ordering::Acquire) {
            return;
        }

        let mut workers = self.inner.workers.lock().unwrap();
        let before = workers.len();
        let (keep, reap): (Vec<_>, Vec<_>) = workers
            .drain(..)
            .partition(|w| w.is_working() || w.idle_for() < self.inner.idle_threshold);
        *workers = keep;
        let after = workers.len();
        drop(workers);

        for worker in &reap {
            worker.stop();
        }
        self.inner.shared_queue.condvar.notify_all();
        for worker in &reap {
            worker.join();
        }

        if before != after {
            ls_log!(
                log::THREAD_POOL,
                &self.inner.name,
                "reaped {} idle worker(s), {after} live",
                before - after
            );
        }

        self.arm_reaper();
    }
}
