use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ls_thread_pool::delayed::DelayedCallService;
use ls_thread_pool::invocation::{ArgValue, Target, TargetHandle};

#[test]
fn a_delayed_call_does_not_run_before_its_delay_elapses() {
    let service = DelayedCallService::shared();
    let fired = Arc::new(AtomicBool::new(false));
    let fired2 = fired.clone();

    service.perform(move || fired2.store(true, Ordering::SeqCst), Duration::from_millis(150));
    std::thread::sleep(Duration::from_millis(40));
    assert!(!fired.load(Ordering::SeqCst));

    std::thread::sleep(Duration::from_millis(200));
    assert!(fired.load(Ordering::SeqCst));
}

struct Probe(AtomicUsize);
impl Target for Probe {
    fn invoke(&self, _selector: &'static str, _arg: Option<&ArgValue>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn cancel_selector_only_removes_entries_scheduled_without_an_argument() {
    let service = DelayedCallService::shared();
    let probe = Arc::new(Probe(AtomicUsize::new(0)));
    let handle = TargetHandle::new(probe.clone());

    service.perform_selector(handle.clone(), "refresh", None, Duration::from_millis(80));
    service.perform_selector(handle.clone(), "refresh", Some(ArgValue::Int(9)), Duration::from_millis(80));
    service.cancel_selector(&handle, "refresh");

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(probe.0.load(Ordering::SeqCst), 1);
}

#[test]
fn cancel_target_removes_every_pending_entry_for_that_target() {
    let service = DelayedCallService::shared();
    let probe = Arc::new(Probe(AtomicUsize::new(0)));
    let handle = TargetHandle::new(probe.clone());

    service.perform_selector(handle.clone(), "a", None, Duration::from_millis(80));
    service.perform_selector(handle.clone(), "b", Some(ArgValue::Text("x".into())), Duration::from_millis(80));
    service.cancel_target(&handle);

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(probe.0.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrently_scheduled_calls_all_eventually_fire() {
    let service = DelayedCallService::shared();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..8 {
        let order = order.clone();
        service.perform(move || order.lock().unwrap().push(i), Duration::from_millis(20));
    }

    std::thread::sleep(Duration::from_millis(250));
    let mut done = order.lock().unwrap().clone();
    done.sort_unstable();
    assert_eq!(done, (0..8).collect::<Vec<_>>());
}
