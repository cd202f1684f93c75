//! A single in-flight (or completed) dispatch operation.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::dispatch::request::Request;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::latch::Latch;

/// The operation's position in its lifecycle. Transitions only ever move
/// left to right; the three right-hand states are terminal and sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Succeeded | State::Failed | State::Cancelled)
    }
}

struct Mutable {
    state: State,
    response: Option<(http::StatusCode, http::HeaderMap)>,
    data: Option<Vec<u8>>,
    error: Option<Error>,
}

/// One in-flight or completed request, returned to the caller immediately
/// on submission and updated as transport events arrive.
///
/// Readonly attributes (`request_url`, `method`, `request_headers`, `body`,
/// `endpoint`, `is_long`) are fixed at creation; `response`/`error`/`data`
/// fill in as the operation progresses and are readable at any time
/// without blocking.
pub struct DispatchOperation {
    request_url: String,
    method: http::Method,
    request_headers: http::HeaderMap,
    body: Option<Bytes>,
    endpoint: Endpoint,
    is_long: bool,
    gather_data: bool,
    mutable: Mutex<Mutable>,
    latch: Latch,
    cancelled: std::sync::atomic::AtomicBool,
}

impl DispatchOperation {
    pub(crate) fn new(request: Request, endpoint: Endpoint, is_long: bool, gather_data: bool) -> Arc<Self> {
        Arc::new(DispatchOperation {
            request_url: request.url,
            method: request.method,
            request_headers: request.headers,
            body: request.body,
            endpoint,
            is_long,
            gather_data,
            mutable: Mutex::new(Mutable {
                state: State::Created,
                response: None,
                data: None,
                error: None,
            }),
            latch: Latch::new(),
            cancelled: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn request_url(&self) -> &str {
        &self.request_url
    }

    /// The method the request was submitted with (`GET` unless the caller
    /// built a [`Request`] with a different one).
    pub fn method(&self) -> &http::Method {
        &self.method
    }

    /// The headers the request was submitted with.
    pub fn request_headers(&self) -> &http::HeaderMap {
        &self.request_headers
    }

    /// The body the request was submitted with, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_long(&self) -> bool {
        self.is_long
    }

    pub fn state(&self) -> State {
        self.mutable.lock().unwrap().state
    }

    /// The response's status and headers, once `did_receive_response` has
    /// fired at least once.
    pub fn response(&self) -> Option<(http::StatusCode, http::HeaderMap)> {
        self.mutable.lock().unwrap().response.clone()
    }

    /// The accumulated body. Only ever populated when the operation was
    /// submitted with `gather_data` (synchronous requests); `None`
    /// otherwise, even after the operation finishes.
    pub fn data(&self) -> Option<Vec<u8>> {
        self.mutable.lock().unwrap().data.clone()
    }

    /// Takes the terminal error, if any, consuming it. `Error` is not
    /// `Clone`, so this is a take rather than a borrow; calling it twice
    /// after failure returns `None` the second time.
    pub fn take_error(&self) -> Option<Error> {
        self.mutable.lock().unwrap().error.take()
    }

    pub fn wait_for_completion(&self) {
        self.latch.wait();
    }

    pub fn is_completed(&self) -> bool {
        self.latch.is_fired()
    }

    /// Requests cancellation. Idempotent; a no-op once the operation has
    /// already reached a terminal state. The actual transition to
    /// `Cancelled` happens when the transport delivers its eventual
    /// cancelled-error event, per the crate's cancel-then-fail contract.
    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::Release);
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::Acquire)
    }

    pub(crate) fn mark_running(&self) {
        let mut mutable = self.mutable.lock().unwrap();
        if mutable.state == State::Created {
            mutable.state = State::Running;
        }
    }

    pub(crate) fn record_response(&self, status: http::StatusCode, headers: http::HeaderMap) {
        let mut mutable = self.mutable.lock().unwrap();
        mutable.response = Some((status, headers));
    }

    pub(crate) fn append_data(&self, chunk: &Bytes) {
        if !self.gather_data {
            return;
        }
        let mut mutable = self.mutable.lock().unwrap();
        mutable.data.get_or_insert_with(Vec::new).extend_from_slice(chunk);
    }

    /// Transitions to `Succeeded` if not already terminal, then fires the
    /// completion latch. Returns `true` if this call performed the
    /// transition (i.e. it is the terminal event to act on).
    pub(crate) fn finish(&self) -> bool {
        let became_terminal = {
            let mut mutable = self.mutable.lock().unwrap();
            if mutable.state.is_terminal() {
                false
            } else {
                mutable.state = State::Succeeded;
                true
            }
        };
        if became_terminal {
            self.latch.fire();
        }
        became_terminal
    }

    /// Transitions to `Cancelled` (if cancellation was requested) or
    /// `Failed`, records the error, and fires the completion latch.
    /// Returns `true` if this call performed the transition.
    pub(crate) fn fail(&self, error: Error) -> bool {
        let became_terminal = {
            let mut mutable = self.mutable.lock().unwrap();
            if mutable.state.is_terminal() {
                false
            } else {
                mutable.state = if self.is_cancel_requested() {
                    State::Cancelled
                } else {
                    State::Failed
                };
                mutable.error = Some(error);
                true
            }
        };
        if became_terminal {
            self.latch.fire();
        }
        became_terminal
    }
}

impl std::fmt::Debug for DispatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchOperation")
            .field("request_url", &self.request_url)
            .field("endpoint", &self.endpoint)
            .field("is_long", &self.is_long)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::parse("http://example.com").unwrap()
    }

    fn request() -> Request {
        Request::get("http://example.com")
    }

    #[test]
    fn finish_is_terminal_exactly_once() {
        let op = DispatchOperation::new(request(), endpoint(), false, true);
        assert!(op.finish());
        assert!(!op.finish());
        assert_eq!(op.state(), State::Succeeded);
        assert!(op.is_completed());
    }

    #[test]
    fn fail_after_cancel_request_lands_on_cancelled() {
        let op = DispatchOperation::new(request(), endpoint(), false, false);
        op.cancel();
        assert!(op.fail(Error::cancelled("example.com:80")));
        assert_eq!(op.state(), State::Cancelled);
    }

    #[test]
    fn data_only_accumulates_when_gather_data_is_set() {
        let streaming = DispatchOperation::new(request(), endpoint(), false, false);
        streaming.append_data(&Bytes::from_static(b"hello"));
        assert_eq!(streaming.data(), None);

        let buffered = DispatchOperation::new(request(), endpoint(), false, true);
        buffered.append_data(&Bytes::from_static(b"hello"));
        buffered.append_data(&Bytes::from_static(b" world"));
        assert_eq!(buffered.data(), Some(b"hello world".to_vec()));
    }

    #[test]
    fn carries_the_method_headers_and_body_it_was_submitted_with() {
        let request = Request::new(http::Method::POST, "http://example.com/submit")
            .header(http::header::CONTENT_TYPE, http::HeaderValue::from_static("text/plain"))
            .body(Bytes::from_static(b"payload"));
        let op = DispatchOperation::new(request, endpoint(), false, false);

        assert_eq!(op.method(), http::Method::POST);
        assert_eq!(op.request_headers().get(http::header::CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(op.body(), Some(&Bytes::from_static(b"payload")));
    }
}
