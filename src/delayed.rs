//! A process-wide delayed-call service, modeled after the original
//! library's `LSTimerThread`: a singleton scheduler thread that fires
//! callbacks after a delay and supports best-effort cancellation by
//! identity.
//!
//! The scheduler owns a time-ordered queue of pending entries and a
//! monitor (`Mutex` + `Condvar`). It sleeps until either the earliest
//! entry's fire time or a new signal (a fresh `perform`/`cancel` call),
//! wakes, pops every due entry in fire-time order (ties broken by
//! insertion order), releases the lock, and runs each entry on the
//! scheduler thread itself. A panic inside a fired invocation is caught
//! and logged; it never kills the scheduler thread.

use std::{
    collections::BinaryHeap,
    cmp::Ordering as CmpOrdering,
    sync::{Arc, Condvar, Mutex, OnceLock},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::{
    invocation::{ArgValue, Invocation, Selector, TargetHandle},
    log::{self, ls_log},
};

static SEQUENCE: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

struct Entry {
    fire_at: Instant,
    sequence: u64,
    invocation: Arc<Invocation>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.sequence == other.sequence
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // `BinaryHeap` is a max-heap; we want the earliest fire time (and,
        // on ties, the earliest insertion) to sort first, so reverse both
        // comparisons.
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<Entry>>,
    condvar: Condvar,
    stop: Mutex<bool>,
}

/// A running delayed-call service instance, spawned lazily and torn down
/// by [`DelayedCallService::dispose`].
pub struct DelayedCallService {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

static INSTANCE: OnceLock<Mutex<Option<Arc<DelayedCallService>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Arc<DelayedCallService>>> {
    INSTANCE.get_or_init(|| Mutex::new(None))
}

impl DelayedCallService {
    /// Returns the process-wide instance, spawning its scheduler thread
    /// on first use (or after a prior [`dispose`](Self::dispose)).
    pub fn shared() -> Arc<DelayedCallService> {
        let mut guard = slot().lock().unwrap();
        if let Some(existing) = guard.as_ref() {
            return existing.clone();
        }
        let service = Arc::new(DelayedCallService::spawn());
        *guard = Some(service.clone());
        service
    }

    fn spawn() -> DelayedCallService {
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            condvar: Condvar::new(),
            stop: Mutex::new(false),
        });

        let worker_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("ls-delayed-call".into())
            .spawn(move || scheduler_loop(worker_shared))
            .expect("failed to spawn delayed-call scheduler thread");

        DelayedCallService {
            shared,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Schedules a zero-argument callable to run after `delay`.
    pub fn perform<F>(&self, callable: F, delay: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Invocation::from_call(callable, Some(delay)));
    }

    /// Schedules a target+selector invocation to run after `delay`.
    pub fn perform_selector(
        &self,
        target: TargetHandle,
        selector: Selector,
        arg: Option<ArgValue>,
        delay: Duration,
    ) {
        self.enqueue(Invocation::from_method(target, selector, arg, Some(delay)));
    }

    fn enqueue(&self, invocation: Arc<Invocation>) {
        let delay = invocation.delay().unwrap_or_default();
        let fire_at = Instant::now() + delay;
        let sequence = SEQUENCE.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        ls_log!(log::TIMER, &"delayed-call", "scheduling entry #{sequence} in {delay:?}");

        let mut queue = self.shared.queue.lock().unwrap();
        queue.push(Entry {
            fire_at,
            sequence,
            invocation,
        });
        drop(queue);
        self.shared.condvar.notify_one();
    }

    /// Removes every pending entry whose `(target, selector, arg)` matches.
    /// Entries already popped for execution are unaffected: cancellation
    /// is best-effort and only ever touches the pending queue.
    pub fn cancel(&self, target: &TargetHandle, selector: Selector, arg: Option<&ArgValue>) {
        self.retain_pending(|inv| !inv.matches(target.id(), Some(selector), arg));
    }

    /// Removes pending entries with `selector` and no argument.
    pub fn cancel_selector(&self, target: &TargetHandle, selector: Selector) {
        self.cancel(target, selector, None);
    }

    /// Removes every pending entry for `target`, regardless of selector or
    /// argument.
    pub fn cancel_target(&self, target: &TargetHandle) {
        self.retain_pending(|inv| !inv.matches(target.id(), None, None));
    }

    fn retain_pending(&self, mut keep: impl FnMut(&Invocation) -> bool) {
        let mut queue = self.shared.queue.lock().unwrap();
        let remaining: Vec<Entry> = queue.drain().filter(|e| keep(&e.invocation)).collect();
        queue.extend(remaining);
    }

    /// Stops the scheduler thread. A subsequent call to
    /// [`DelayedCallService::shared`] spawns a fresh instance.
    pub fn dispose() {
        let Some(service) = slot().lock().unwrap().take() else {
            return;
        };
        *service.shared.stop.lock().unwrap() = true;
        service.shared.condvar.notify_one();
        if let Some(thread) = service.thread.lock().unwrap().take() {
            let _ = thread.join();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }
}

fn scheduler_loop(shared: Arc<Shared>) {
    loop {
        let mut queue = shared.queue.lock().unwrap();

        if *shared.stop.lock().unwrap() {
            return;
        }

        let due: Vec<Entry> = loop {
            match queue.peek() {
                None => {
                    // Nothing pending: sleep until signalled.
                    let (guard, _) = shared.condvar.wait_timeout(queue, Duration::from_secs(3600)).unwrap();
                    queue = guard;
                    if *shared.stop.lock().unwrap() {
                        return;
                    }
                    continue;
                }
                Some(entry) => {
                    let now = Instant::now();
                    if entry.fire_at <= now {
                        let mut batch = Vec::new();
                        while let Some(top) = queue.peek() {
                            if top.fire_at <= now {
                                batch.push(queue.pop().unwrap());
                            } else {
                                break;
                            }
                        }
                        break batch;
                    }
                    let wait_for = entry.fire_at - now;
                    let (guard, _) = shared.condvar.wait_timeout(queue, wait_for).unwrap();
                    queue = guard;
                    if *shared.stop.lock().unwrap() {
                        return;
                    }
                    continue;
                }
            }
        };

        drop(queue);

        for entry in due {
            let panicked = entry.invocation.run();
            if panicked {
                ls_log!(
                    log::TIMER,
                    &"delayed-call",
                    "entry #{} panicked during execution",
                    entry.sequence
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn fires_after_delay() {
        let service = DelayedCallService::spawn();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();

        service.perform(move || fired2.store(true, Ordering::SeqCst), Duration::from_millis(30));

        std::thread::sleep(Duration::from_millis(200));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_before_fire_prevents_execution() {
        let service = DelayedCallService::spawn();

        struct Probe(AtomicBool);
        impl crate::invocation::Target for Probe {
            fn invoke(&self, _selector: Selector, _arg: Option<&ArgValue>) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let target = Arc::new(Probe(AtomicBool::new(false)));
        let handle = TargetHandle::new(target.clone());

        service.perform_selector(
            handle.clone(),
            "tick",
            Some(ArgValue::Int(1)),
            Duration::from_millis(500),
        );
        service.cancel(&handle, "tick", Some(&ArgValue::Int(1)));

        std::thread::sleep(Duration::from_secs(2));
        assert!(!target.0.load(Ordering::SeqCst));
    }

    #[test]
    fn due_entries_fire_in_fire_time_order_with_fifo_tie_break() {
        let service = DelayedCallService::spawn();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            service.perform(move || order.lock().unwrap().push(i), Duration::from_millis(10));
        }

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
