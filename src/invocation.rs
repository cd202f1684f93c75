//! The unit of deferred work shared by the worker pool and the delayed-call
//! service, modeled after the original library's `LSInvocation`.
//!
//! Objective-C's dynamic `target` + `selector` + optional `argument` dispatch
//! has no direct Rust equivalent, so it is replaced here with a typed
//! callable: either a boxed zero-argument closure, or a target handle plus
//! an interned selector tag and an optional small argument value. Both
//! forms carry a one-shot completion latch that `wait_for_completion`
//! blocks on and `run` fires exactly once.

use std::{
    any::Any,
    fmt,
    sync::{Arc, Mutex},
};

use crate::latch::Latch;

/// Identifies the method a [`Target`] should run for a given [`Selector`].
///
/// Selectors are interned `&'static str` tags rather than a runtime
/// method lookup; a `Target` implementation matches on the tag itself.
pub type Selector = &'static str;

/// An object that can receive a selector-based invocation.
///
/// Implementors typically match on `selector` and downcast `arg` to the
/// type they expect; this crate never inspects `arg` except for identity
/// and equality when matching cancellation keys.
pub trait Target: Send + Sync + 'static {
    fn invoke(&self, selector: Selector, arg: Option<&ArgValue>);
}

/// A small, comparable value that can be carried as an invocation's
/// argument.
///
/// `Opaque` variants compare by pointer identity of the boxed value, which
/// is what the original library's `isEqual:` fallback (pointer equality)
/// amounts to for arbitrary objects; the other variants compare by value,
/// matching the original's behavior for common argument types (most
/// commonly strings and numbers).
#[derive(Clone)]
pub enum ArgValue {
    Unit,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Unit => write!(f, "Unit"),
            ArgValue::Bool(b) => write!(f, "Bool({b})"),
            ArgValue::Int(i) => write!(f, "Int({i})"),
            ArgValue::Text(s) => write!(f, "Text({s:?})"),
            ArgValue::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ArgValue::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

impl PartialEq for ArgValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ArgValue::Unit, ArgValue::Unit) => true,
            (ArgValue::Bool(a), ArgValue::Bool(b)) => a == b,
            (ArgValue::Int(a), ArgValue::Int(b)) => a == b,
            (ArgValue::Text(a), ArgValue::Text(b)) => a == b,
            (ArgValue::Bytes(a), ArgValue::Bytes(b)) => a == b,
            (ArgValue::Opaque(a), ArgValue::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for ArgValue {}

/// Identifies a [`Target`] for cancellation purposes, by `Arc` pointer
/// identity rather than by value.
#[derive(Clone)]
pub struct TargetHandle(pub(crate) Arc<dyn Target>);

impl TargetHandle {
    pub fn new(target: Arc<dyn Target>) -> Self {
        TargetHandle(target)
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetHandle({:#x})", self.id())
    }
}

enum Body {
    Call(Mutex<Option<Box<dyn FnOnce() + Send>>>),
    Method {
        target: TargetHandle,
        selector: Selector,
        arg: Option<ArgValue>,
    },
}

/// A unit of deferred work: immutable once created, executed exactly
/// once, and observable through [`Invocation::wait_for_completion`].
pub struct Invocation {
    body: Body,
    latch: Arc<Latch>,
    delay: Option<std::time::Duration>,
}

impl Invocation {
    /// Builds a zero-argument callable invocation, optionally fired after
    /// `delay` by the delayed-call service rather than immediately by a
    /// worker pool.
    pub fn from_call<F>(call: F, delay: Option<std::time::Duration>) -> Arc<Invocation>
    where
        F: FnOnce() + Send + 'static,
    {
        Arc::new(Invocation {
            body: Body::Call(Mutex::new(Some(Box::new(call)))),
            latch: Arc::new(Latch::new()),
            delay,
        })
    }

    /// Builds a target+selector invocation with an optional argument and
    /// optional delay.
    pub fn from_method(
        target: TargetHandle,
        selector: Selector,
        arg: Option<ArgValue>,
        delay: Option<std::time::Duration>,
    ) -> Arc<Invocation> {
        Arc::new(Invocation {
            body: Body::Method { target, selector, arg },
            latch: Arc::new(Latch::new()),
            delay,
        })
    }

    pub(crate) fn delay(&self) -> Option<std::time::Duration> {
        self.delay
    }

    /// Runs the invocation's body. Catches panics from user code so a
    /// caller executing invocations on a long-lived thread never dies;
    /// the completion latch still fires in that case.
    ///
    /// Returns `true` if user code panicked.
    pub(crate) fn run(&self) -> bool {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match &self.body {
            Body::Call(call) => {
                if let Some(call) = call.lock().unwrap().take() {
                    call();
                }
            }
            Body::Method { target, selector, arg } => {
                target.0.invoke(selector, arg.as_ref());
            }
        }));
        self.latch.fire();
        result.is_err()
    }

    /// Blocks the calling thread until [`Invocation::run`] has completed.
    pub fn wait_for_completion(&self) {
        self.latch.wait();
    }

    /// Non-blocking check of completion.
    pub fn is_completed(&self) -> bool {
        self.latch.is_fired()
    }

    /// `true` if this invocation targets `target` via selector `selector`
    /// and (when present) argument `arg`, following the original library's
    /// three cancellation granularities: by argument, by selector only
    /// (only matches entries scheduled without an argument), or by target
    /// alone.
    pub(crate) fn matches(&self, target_id: usize, selector: Option<Selector>, arg: Option<&ArgValue>) -> bool {
        let Body::Method {
            target: my_target,
            selector: my_selector,
            arg: my_arg,
        } = &self.body
        else {
            return false;
        };

        if my_target.id() != target_id {
            return false;
        }

        match selector {
            None => true,
            Some(selector) => {
                if *my_selector != selector {
                    return false;
                }
                match arg {
                    None => my_arg.is_none(),
                    Some(arg) => my_arg.as_ref() == Some(arg),
                }
            }
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Body::Call(_) => write!(f, "Invocation::Call"),
            Body::Method { target, selector, arg } => f
                .debug_struct("Invocation::Method")
                .field("target", target)
                .field("selector", selector)
                .field("arg", arg)
                .finish(),
        }
    }
}
