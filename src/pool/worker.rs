//! A single pool worker thread, modeled after the original library's
//! `LSThreadPoolThread`.
//!
//! In the original Objective-C implementation each `LSThreadPoolThread` is
//! constructed with the *same* queue and monitor objects the pool itself
//! holds (`threadWithPool:name:queue:queueMonitor:`), so despite the
//! per-thread ivars, the FIFO and its condition are shared across every
//! worker in a pool, not private to one. This module keeps that shape: a
//! [`Worker`] is handed an `Arc` to the pool's shared queue/monitor and a
//! `working`/`last_activity` pair that *is* private, used by the idle
//! reaper to pick reclaim candidates.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::{
    invocation::Invocation,
    log::{self, ls_log},
};

/// The pool-level monitor: one shared FIFO and its condition variable,
/// used by every worker in the pool.
pub(crate) struct SharedQueue {
    pub(crate) queue: Mutex<VecDeque<Arc<Invocation>>>,
    pub(crate) condvar: Condvar,
}

impl SharedQueue {
    pub(crate) fn new() -> Arc<SharedQueue> {
        Arc::new(SharedQueue {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        })
    }

    /// Pushes an invocation and wakes exactly one waiting worker.
    pub(crate) fn push(&self, invocation: Arc<Invocation>) {
        self.queue.lock().unwrap().push_back(invocation);
        self.condvar.notify_one();
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

/// A live worker owned by exactly one [`crate::pool::WorkerPool`].
pub(crate) struct Worker {
    id: u64,
    working: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    last_activity: Arc<Mutex<Instant>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawns a new worker thread bound to the pool's shared queue.
    pub(crate) fn spawn(
        id: u64,
        pool_name: Arc<str>,
        shared: Arc<SharedQueue>,
        idle_threshold: Duration,
    ) -> Arc<Worker> {
        let working = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let last_activity = Arc::new(Mutex::new(Instant::now()));

        let thread_working = working.clone();
        let thread_running = running.clone();
        let thread_last_activity = last_activity.clone();
        let thread_name = format!("{pool_name}-{id}");

        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                worker_loop(
                    thread_name,
                    shared,
                    thread_working,
                    thread_running,
                    thread_last_activity,
                    idle_threshold,
                )
            })
            .expect("failed to spawn worker thread");

        Arc::new(Worker {
            id,
            working,
            running,
            last_activity,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_working(&self) -> bool {
        self.working.load(Ordering::Acquire)
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    /// Signals the worker thread to stop once its current item (if any)
    /// finishes, matching the pool's "terminate after draining" dispose
    /// discipline.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn join(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    name: String,
    shared: Arc<SharedQueue>,
    working: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    last_activity: Arc<Mutex<Instant>>,
    idle_threshold: Duration,
) {
    loop {
        let mut queue = shared.queue.lock().unwrap();

        let invocation = loop {
            if let Some(invocation) = queue.pop_front() {
                break invocation;
            }
            if !running.load(Ordering::Acquire) {
                return;
            }
            let (guard, _timeout) = shared.condvar.wait_timeout(queue, idle_threshold).unwrap();
            queue = guard;
            if !running.load(Ordering::Acquire) && queue.is_empty() {
                return;
            }
        };

        drop(queue);

        working.store(true, Ordering::Release);
        *last_activity.lock().unwrap() = Instant::now();

        let panicked = invocation.run();
        if panicked {
            ls_log!(log::THREAD_POOL, &name, "invocation panicked on worker {name}");
        }

        *last_activity.lock().unwrap() = Instant::now();
        working.store(false, Ordering::Release);
    }
}
