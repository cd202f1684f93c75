//! The per-endpoint HTTP request dispatcher: a process-wide singleton
//! that admits requests against per-endpoint concurrency caps, demultiplexes
//! transport events to caller delegates, and coordinates idle reaping of
//! its private async-submission pool through the delayed-call service.

pub mod config;
pub mod delegate;
pub mod operation;
pub mod request;
mod transport;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, OnceLock},
};

pub use config::{DispatcherConfig, DispatcherConfigBuilder, OverflowPolicy};
pub use delegate::{AuthChallengeHandler, AuthChallengeSender, AuthenticationChallenge, Credential, DispatchDelegate};
pub use operation::{DispatchOperation, State as OperationState};
pub use request::Request;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::log::{self, ls_log};
use crate::pool::WorkerPool;
use transport::Transport;

const ASYNC_POOL_NAME: &str = "ls-dispatcher-async";
const ASYNC_POOL_SIZE: u32 = 4;

struct Waiter {
    endpoint: Endpoint,
    op: Arc<DispatchOperation>,
    delegate: Arc<dyn DispatchDelegate>,
    is_long: bool,
    gather_data: bool,
}

#[derive(Default)]
struct EndpointCounters {
    running_short: u32,
    running_long: u32,
    short_waiters: VecDeque<Waiter>,
    long_waiters: VecDeque<Waiter>,
}

struct State {
    config: DispatcherConfig,
    // Settable at runtime (§4.3.6), so it lives outside `config` as its
    // own atomic rather than behind the counters lock.
    max_long_per_endpoint: std::sync::atomic::AtomicU32,
    counters: Mutex<std::collections::HashMap<Endpoint, EndpointCounters>>,
}

/// The per-endpoint admission-controlled HTTP dispatcher.
///
/// Cloning a `Dispatcher` shares the same underlying state; the process-wide
/// instance is reached through [`Dispatcher::shared`].
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<State>,
    transport: Arc<Transport>,
    async_pool: WorkerPool,
}

static INSTANCE: OnceLock<Mutex<Option<Dispatcher>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Dispatcher>> {
    INSTANCE.get_or_init(|| Mutex::new(None))
}

impl Dispatcher {
    /// Returns the process-wide dispatcher, constructing it with
    /// [`DispatcherConfig::default`] on first use (or after a prior
    /// [`Dispatcher::dispose`]).
    pub fn shared() -> Result<Dispatcher> {
        let mut guard = slot().lock().unwrap();
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }
        let dispatcher = Dispatcher::with_config(DispatcherConfig::default())?;
        *guard = Some(dispatcher.clone());
        Ok(dispatcher)
    }

    /// Constructs a standalone dispatcher, independent of the process-wide
    /// singleton. Useful for tests that need isolated admission counters.
    pub fn with_config(config: DispatcherConfig) -> Result<Dispatcher> {
        config.validate()?;

        let async_pool =
            WorkerPool::create_with_schedule(ASYNC_POOL_NAME, ASYNC_POOL_SIZE, config.idle_threshold, config.reap_interval)?;
        let transport = Transport::new(config.max_per_endpoint)?;

        let max_long_per_endpoint = std::sync::atomic::AtomicU32::new(config.max_long_per_endpoint);

        Ok(Dispatcher {
            state: Arc::new(State {
                config,
                max_long_per_endpoint,
                counters: Mutex::new(std::collections::HashMap::new()),
            }),
            transport: Arc::new(transport),
            async_pool,
        })
    }

    /// `M`: the maximum of short+long requests concurrently running
    /// against a single endpoint.
    pub fn max_per_endpoint(&self) -> u32 {
        self.state.config.max_per_endpoint
    }

    /// `L`: the maximum of long requests concurrently running against a
    /// single endpoint.
    pub fn max_long_per_endpoint(&self) -> u32 {
        self.state.max_long_per_endpoint.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Updates `L` at runtime. Rejects `new_limit > max_per_endpoint` with
    /// [`Error::invalid_argument`]. Does not cancel currently running long
    /// operations in excess of the new limit; it only gates future
    /// admissions.
    pub fn set_max_long_per_endpoint(&self, new_limit: u32) -> Result<()> {
        if new_limit > self.state.config.max_per_endpoint {
            return Err(Error::invalid_argument(
                "max_long_per_endpoint must not exceed max_per_endpoint",
            ));
        }
        self.state
            .max_long_per_endpoint
            .store(new_limit, std::sync::atomic::Ordering::Release);
        Ok(())
    }

    /// `true` iff a long submission to `endpoint` would be admitted right
    /// now: `long(e) < L ∧ short(e) + long(e) < M`.
    pub fn is_long_allowed(&self, endpoint: &Endpoint) -> bool {
        let counters = self.state.counters.lock().unwrap();
        let entry = counters.get(endpoint);
        let (short, long) = entry.map(|e| (e.running_short, e.running_long)).unwrap_or((0, 0));
        long < self.max_long_per_endpoint() && short + long < self.max_per_endpoint()
    }

    /// The number of long requests currently running against `endpoint`.
    pub fn count_running_long(&self, endpoint: &Endpoint) -> u32 {
        self.state
            .counters
            .lock()
            .unwrap()
            .get(endpoint)
            .map(|e| e.running_long)
            .unwrap_or(0)
    }

    /// Submits a synchronous request: blocks the caller until the
    /// operation reaches a terminal state, accumulating the body into
    /// `operation.data()`. `request` accepts a bare URL (defaulting to a
    /// header-less, body-less `GET`) or an explicit [`Request`] built with
    /// a method, headers, and/or a body.
    pub fn dispatch_synchronous(
        &self,
        request: impl Into<Request>,
        delegate: Arc<dyn DispatchDelegate>,
    ) -> Result<Arc<DispatchOperation>> {
        let op = self.submit(request.into(), delegate, false, true)?;
        op.wait_for_completion();
        Ok(op)
    }

    /// Submits a short asynchronous request: returns immediately; the
    /// body streams to `delegate` and is not accumulated. If every slot
    /// for the endpoint is busy, the enqueue-and-wait happens on the
    /// dispatcher's private pool so this call never blocks the caller.
    pub fn dispatch_async_short(
        &self,
        request: impl Into<Request>,
        delegate: Arc<dyn DispatchDelegate>,
    ) -> Result<Arc<DispatchOperation>> {
        self.submit(request.into(), delegate, false, false)
    }

    /// Submits a long asynchronous request, counted against both `M` and
    /// `L`. Denied admissions are handled per [`OverflowPolicy`].
    pub fn dispatch_async_long(
        &self,
        request: impl Into<Request>,
        delegate: Arc<dyn DispatchDelegate>,
    ) -> Result<Arc<DispatchOperation>> {
        self.submit(request.into(), delegate, true, false)
    }

    fn submit(
        &self,
        request: Request,
        delegate: Arc<dyn DispatchDelegate>,
        is_long: bool,
        gather_data: bool,
    ) -> Result<Arc<DispatchOperation>> {
        let endpoint = Endpoint::parse(&request.url)?;
        let op = DispatchOperation::new(request, endpoint.clone(), is_long, gather_data);

        if is_long {
            self.admit_long(endpoint, op, delegate)
        } else {
            self.admit_short(endpoint, op, delegate)
        }
    }

    fn admit_short(
        &self,
        endpoint: Endpoint,
        op: Arc<DispatchOperation>,
        delegate: Arc<dyn DispatchDelegate>,
    ) -> Result<Arc<DispatchOperation>> {
        let admitted = {
            let mut counters = self.state.counters.lock().unwrap();
            let entry = counters.entry(endpoint.clone()).or_default();
            if entry.running_short + entry.running_long < self.max_per_endpoint() {
                entry.running_short += 1;
                true
            } else {
                false
            }
        };

        if admitted {
            self.start_task(endpoint, op.clone(), delegate, false);
            return Ok(op);
        }

        // Offload the wait onto the dispatcher's private pool: the
        // submitting thread returns immediately, a pool worker blocks
        // until a slot is released on its behalf.
        let dispatcher = self.clone();
        let waiter_endpoint = endpoint.clone();
        let waiter_op = op.clone();
        let waiter_delegate = delegate.clone();
        self.async_pool.schedule(move || {
            dispatcher.block_for_short_slot(waiter_endpoint, waiter_op, waiter_delegate);
        })?;

        Ok(op)
    }

    fn block_for_short_slot(&self, endpoint: Endpoint, op: Arc<DispatchOperation>, delegate: Arc<dyn DispatchDelegate>) {
        let mut counters = self.state.counters.lock().unwrap();
        let entry = counters.entry(endpoint.clone()).or_default();
        if entry.running_short + entry.running_long < self.max_per_endpoint() {
            entry.running_short += 1;
        } else {
            entry.short_waiters.push_back(Waiter {
                endpoint: endpoint.clone(),
                op: op.clone(),
                delegate: delegate.clone(),
                is_long: false,
                gather_data: false,
            });
            return;
        }
        drop(counters);
        self.start_task(endpoint, op, delegate, false);
    }

    fn admit_long(
        &self,
        endpoint: Endpoint,
        op: Arc<DispatchOperation>,
        delegate: Arc<dyn DispatchDelegate>,
    ) -> Result<Arc<DispatchOperation>> {
        let mut counters = self.state.counters.lock().unwrap();
        let entry = counters.entry(endpoint.clone()).or_default();

        let l = self.max_long_per_endpoint();
        let m = self.max_per_endpoint();

        if entry.running_long < l && entry.running_short + entry.running_long < m {
            entry.running_long += 1;
            drop(counters);
            self.start_task(endpoint, op.clone(), delegate, true);
            return Ok(op);
        }

        match self.state.config.overflow_policy {
            OverflowPolicy::Throw => {
                drop(counters);
                Err(Error::long_limit_exceeded(endpoint.to_string()))
            }
            OverflowPolicy::Fail => {
                drop(counters);
                let error = Error::overflow_fail(endpoint.to_string());
                ls_log!(log::URL_DISPATCHER, &endpoint, "long admission denied under Fail policy");
                delegate.did_fail_with_error(&op, &error);
                op.fail(error);
                Ok(op)
            }
            OverflowPolicy::Enqueue => {
                if let Some(max_depth) = self.state.config.max_enqueue_depth {
                    if entry.long_waiters.len() >= max_depth {
                        drop(counters);
                        return Err(Error::queue_full(endpoint.to_string()));
                    }
                }
                entry.long_waiters.push_back(Waiter {
                    endpoint: endpoint.clone(),
                    op: op.clone(),
                    delegate,
                    is_long: true,
                    gather_data: false,
                });
                Ok(op)
            }
        }
    }

    fn start_task(&self, endpoint: Endpoint, op: Arc<DispatchOperation>, delegate: Arc<dyn DispatchDelegate>, is_long: bool) {
        ls_log!(
            log::URL_DISPATCHER,
            &endpoint,
            "starting {} task for {}",
            if is_long { "long" } else { "short" },
            op.request_url()
        );

        let dispatcher = self.clone();
        self.transport.spawn_request(op, delegate, move |op| {
            dispatcher.release_slot(op.endpoint().clone(), is_long);
        });
    }

    /// Releases an endpoint's admission slot and admits exactly one
    /// waiter: long-waiters are preferred over short-waiters, matching
    /// the dispatcher's FIFO-per-class fairness with long-waiter
    /// priority on release.
    fn release_slot(&self, endpoint: Endpoint, was_long: bool) {
        let next = {
            let mut counters = self.state.counters.lock().unwrap();
            let Some(entry) = counters.get_mut(&endpoint) else {
                return;
            };

            if was_long {
                entry.running_long = entry.running_long.saturating_sub(1);
            } else {
                entry.running_short = entry.running_short.saturating_sub(1);
            }

            let m = self.state.config.max_per_endpoint;
            let l = self.max_long_per_endpoint();

            if entry.running_long < l && entry.running_short + entry.running_long < m {
                if let Some(waiter) = entry.long_waiters.pop_front() {
                    entry.running_long += 1;
                    Some(waiter)
                } else if entry.running_short + entry.running_long < m {
                    entry.short_waiters.pop_front().map(|waiter| {
                        entry.running_short += 1;
                        waiter
                    })
                } else {
                    None
                }
            } else if entry.running_short + entry.running_long < m {
                entry.short_waiters.pop_front().map(|waiter| {
                    entry.running_short += 1;
                    waiter
                })
            } else {
                None
            }
        };

        if let Some(waiter) = next {
            self.start_task(waiter.endpoint, waiter.op, waiter.delegate, waiter.is_long);
            let _ = waiter.gather_data;
        }
    }

    /// Tears down the background runtime and private async pool. A
    /// subsequent call to [`Dispatcher::shared`] constructs a fresh
    /// instance.
    pub fn dispose() {
        if let Some(dispatcher) = slot().lock().unwrap().take() {
            dispatcher.async_pool.dispose();
        }
    }
}
