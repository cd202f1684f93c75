//! A one-shot completion event, shared by [`crate::invocation::Invocation`]
//! and dispatch operations: `wait` blocks until `fire` has been called
//! once, from any thread, any number of times after the first.

use std::sync::{Condvar, Mutex};

pub(crate) struct Latch {
    fired: Mutex<bool>,
    condvar: Condvar,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Latch {
            fired: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn fire(&self) {
        let mut fired = self.fired.lock().unwrap();
        *fired = true;
        self.condvar.notify_all();
    }

    pub(crate) fn wait(&self) {
        let mut fired = self.fired.lock().unwrap();
        while !*fired {
            fired = self.condvar.wait(fired).unwrap();
        }
    }

    pub(crate) fn is_fired(&self) -> bool {
        *self.fired.lock().unwrap()
    }
}
