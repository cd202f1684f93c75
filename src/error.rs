//! The crate's error taxonomy.
//!
//! Mirrors the shape of a typical reqwest-lineage error module: a small
//! `Kind` enum describes *why*, an opaque boxed inner struct carries the
//! optional source and endpoint context, and `Error` itself stays `Copy`-free
//! but cheap to move around.

use std::{error::Error as StdError, fmt};

/// The crate's result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Distinguishes the circumstances under which an [`Error`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A precondition was violated: a null/empty argument where one is
    /// forbidden, `max_long_per_endpoint > max_per_endpoint`, or an unknown
    /// overflow policy.
    InvalidArgument,
    /// The singleton or pool this call targeted has already been disposed.
    Disposed,
    /// A long request was denied admission under the `Throw` overflow
    /// policy.
    LongLimitExceeded,
    /// The underlying HTTP transport failed: connect error, TLS error,
    /// timeout, DNS failure, or an operation that was cancelled.
    Transport,
    /// A long request was denied admission under the `Fail` overflow
    /// policy and reported asynchronously through the delegate.
    OverflowFail,
    /// A long request could not be enqueued because `max_enqueue_depth`
    /// was exceeded under the `Enqueue` overflow policy.
    QueueFull,
    /// An [`AuthChallengeHandler`](crate::dispatch::AuthChallengeHandler)
    /// rejected an authentication challenge's protection space, or
    /// requested cancellation of the challenged request.
    AuthenticationRejected,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::InvalidArgument => "invalid argument",
            Kind::Disposed => "disposed",
            Kind::LongLimitExceeded => "long request limit exceeded",
            Kind::Transport => "transport error",
            Kind::OverflowFail => "long request overflow",
            Kind::QueueFull => "enqueue depth exceeded",
            Kind::AuthenticationRejected => "authentication challenge rejected",
        }
    }
}

struct Inner {
    kind: Kind,
    endpoint: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

/// The crate's error type.
///
/// Carries a [`Kind`] plus optional endpoint context and a chained source
/// error (typically a transport failure from `wreq`).
pub struct Error {
    inner: Box<Inner>,
}

impl Error {
    fn new(kind: Kind) -> Self {
        Error {
            inner: Box::new(Inner {
                kind,
                endpoint: None,
                source: None,
            }),
        }
    }

    fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.inner.source = Some(source.into());
        self
    }

    fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.inner.endpoint = Some(endpoint.into());
        self
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::new(Kind::InvalidArgument).with_source(IoMessage(message.into()))
    }

    pub(crate) fn disposed() -> Self {
        Error::new(Kind::Disposed)
    }

    pub(crate) fn long_limit_exceeded(endpoint: impl Into<String>) -> Self {
        Error::new(Kind::LongLimitExceeded).with_endpoint(endpoint)
    }

    pub(crate) fn queue_full(endpoint: impl Into<String>) -> Self {
        Error::new(Kind::QueueFull).with_endpoint(endpoint)
    }

    pub(crate) fn overflow_fail(endpoint: impl Into<String>) -> Self {
        Error::new(Kind::OverflowFail).with_endpoint(endpoint)
    }

    pub(crate) fn transport(endpoint: impl Into<String>, source: wreq::Error) -> Self {
        Error::new(Kind::Transport)
            .with_endpoint(endpoint)
            .with_source(source)
    }

    pub(crate) fn cancelled(endpoint: impl Into<String>) -> Self {
        Error::new(Kind::Transport)
            .with_endpoint(endpoint)
            .with_source(IoMessage("operation cancelled".into()))
    }

    pub(crate) fn authentication_rejected(endpoint: impl Into<String>) -> Self {
        Error::new(Kind::AuthenticationRejected).with_endpoint(endpoint)
    }

    /// The kind of error this is.
    pub fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// The endpoint (`host:port`) this error is associated with, if any.
    pub fn endpoint(&self) -> Option<&str> {
        self.inner.endpoint.as_deref()
    }

    /// True if this error was raised by a precondition violation.
    pub fn is_invalid_argument(&self) -> bool {
        self.inner.kind == Kind::InvalidArgument
    }

    /// True if this error was raised by submitting to a disposed
    /// singleton or pool.
    pub fn is_disposed(&self) -> bool {
        self.inner.kind == Kind::Disposed
    }

    /// True if this error is a transport failure (including cancellation).
    pub fn is_transport(&self) -> bool {
        self.inner.kind == Kind::Transport
    }

    /// True if this error came from the `Throw` overflow policy.
    pub fn is_long_limit_exceeded(&self) -> bool {
        self.inner.kind == Kind::LongLimitExceeded
    }

    /// True if this error came from a rejected or cancelled authentication
    /// challenge.
    pub fn is_authentication_rejected(&self) -> bool {
        self.inner.kind == Kind::AuthenticationRejected
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut b = f.debug_struct("Error");
        b.field("kind", &self.inner.kind);
        if let Some(endpoint) = &self.inner.endpoint {
            b.field("endpoint", endpoint);
        }
        if let Some(source) = &self.inner.source {
            b.field("source", source);
        }
        b.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.kind.as_str())?;
        if let Some(endpoint) = &self.inner.endpoint {
            write!(f, " for endpoint {endpoint}")?;
        }
        if let Some(source) = &self.inner.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_deref().map(|e| e as _)
    }
}

/// A trivial `Display`/`Error` wrapper around a plain message, used when
/// there's no real source error to chain (e.g. `InvalidArgument`).
#[derive(Debug)]
struct IoMessage(String);

impl fmt::Display for IoMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for IoMessage {}
