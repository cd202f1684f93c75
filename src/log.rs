//! A simple bitmask-filtered logging facility, matching the original
//! library's `LSLog`: independently enable/disable logging per source,
//! format a line with thread id, source label and instance id, and hand it
//! either to an installed [`LogDelegate`] or to the process console.
//!
//! Unlike the original, lines are never lost when no delegate is
//! installed: the local sink emits through [`tracing`] so the crate still
//! participates in a host application's structured-logging setup instead
//! of writing straight to stdout.

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
    sync::RwLock,
};

/// Timer / delayed-call service log source.
pub const TIMER: u32 = 8;
/// Endpoint dispatcher log source.
pub const URL_DISPATCHER: u32 = 16;
/// Worker pool log source.
pub const THREAD_POOL: u32 = 32;

const ALL_SOURCES: u32 = TIMER | URL_DISPATCHER | THREAD_POOL;

static ENABLED_MASK: AtomicU32 = AtomicU32::new(0);

/// Receives preformatted log lines once installed via [`set_delegate`].
///
/// The line contains the current thread identifier, the source label and
/// instance id, and the message; it never contains a trailing newline.
pub trait LogDelegate: Send + Sync {
    fn append_log_line(&self, line: &str);
}

static DELEGATE: RwLock<Option<Box<dyn LogDelegate>>> = RwLock::new(None);

/// Installs a log delegate, or clears it (reverting to the local
/// `tracing`-backed sink) when passed `None`.
pub fn set_delegate(delegate: Option<Box<dyn LogDelegate>>) {
    *DELEGATE.write().unwrap_or_else(|e| e.into_inner()) = delegate;
}

/// Enables logging for a specific source (one of [`TIMER`],
/// [`URL_DISPATCHER`], [`THREAD_POOL`]).
pub fn enable_source_type(source: u32) {
    ENABLED_MASK.fetch_or(source, Ordering::Relaxed);
}

/// Enables logging for all known sources.
pub fn enable_all_source_types() {
    ENABLED_MASK.store(ALL_SOURCES, Ordering::Relaxed);
}

/// Disables logging for a specific source.
pub fn disable_source_type(source: u32) {
    ENABLED_MASK.fetch_and(!source, Ordering::Relaxed);
}

/// Disables logging for all sources.
pub fn disable_all_source_types() {
    ENABLED_MASK.store(0, Ordering::Relaxed);
}

/// Whether logging of a specific source is currently enabled.
pub fn is_source_type_enabled(source: u32) -> bool {
    ENABLED_MASK.load(Ordering::Relaxed) & source != 0
}

fn source_label(source: u32) -> &'static str {
    match source {
        TIMER => "TIMER",
        URL_DISPATCHER => "URL_DISPATCHER",
        THREAD_POOL => "THREAD_POOL",
        _ => "UNKNOWN",
    }
}

/// Formats and emits a log line for `source`, tagged with `instance` (an
/// opaque identifier for the logging object, e.g. a pool name).
///
/// No-op if `source` is currently disabled. This is the internal entry
/// point used by the pool, scheduler and dispatcher; it is not part of the
/// crate's public API.
pub(crate) fn log(source: u32, instance: &dyn fmt::Display, args: fmt::Arguments<'_>) {
    if !is_source_type_enabled(source) {
        return;
    }

    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");
    let line = format!(
        "[{thread_name}] {} ({instance}): {args}",
        source_label(source)
    );

    let delegate = DELEGATE.read().unwrap_or_else(|e| e.into_inner());
    match delegate.as_ref() {
        Some(delegate) => delegate.append_log_line(&line),
        None => emit_to_tracing(source, &line),
    }
}

#[cfg(feature = "tracing")]
fn emit_to_tracing(source: u32, line: &str) {
    match source {
        TIMER => tracing::debug!(target: "ls_thread_pool::timer", "{line}"),
        URL_DISPATCHER => tracing::debug!(target: "ls_thread_pool::dispatcher", "{line}"),
        THREAD_POOL => tracing::debug!(target: "ls_thread_pool::pool", "{line}"),
        _ => tracing::debug!(target: "ls_thread_pool", "{line}"),
    }
}

#[cfg(not(feature = "tracing"))]
fn emit_to_tracing(_source: u32, line: &str) {
    println!("{line}");
}

macro_rules! ls_log {
    ($source:expr, $instance:expr, $($arg:tt)*) => {
        $crate::log::log($source, $instance, format_args!($($arg)*))
    };
}

pub(crate) use ls_log;
