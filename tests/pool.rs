use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ls_thread_pool::pool::WorkerPool;

#[test]
fn submissions_beyond_capacity_queue_and_all_complete() {
    let pool = WorkerPool::create("integration-pool", 3).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut invocations = Vec::new();

    for i in 0..12 {
        let seen = seen.clone();
        invocations.push(
            pool.schedule(move || {
                std::thread::sleep(Duration::from_millis(20));
                seen.lock().unwrap().push(i);
            })
            .unwrap(),
        );
    }

    for inv in invocations {
        inv.wait_for_completion();
    }

    let mut done = seen.lock().unwrap().clone();
    done.sort_unstable();
    assert_eq!(done, (0..12).collect::<Vec<_>>());
    assert_eq!(pool.queue_size(), 0);
    assert!(pool.live_worker_count() <= 3);
}

#[test]
fn a_panicking_callable_does_not_take_down_the_pool() {
    let pool = WorkerPool::create("panic-pool", 2).unwrap();

    let panicking = pool.schedule(|| panic!("boom")).unwrap();
    panicking.wait_for_completion();

    let counter = Arc::new(AtomicUsize::new(0));
    let counter2 = counter.clone();
    let after = pool.schedule(move || { counter2.fetch_add(1, Ordering::SeqCst); }).unwrap();
    after.wait_for_completion();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn dispose_drains_in_flight_work_before_refusing_new_submissions() {
    let pool = WorkerPool::create("dispose-pool", 2).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter2 = counter.clone();

    let inv = pool
        .schedule(move || {
            std::thread::sleep(Duration::from_millis(50));
            counter2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    pool.dispose();
    inv.wait_for_completion();
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    assert!(pool.schedule(|| {}).unwrap_err().is_disposed());
}
