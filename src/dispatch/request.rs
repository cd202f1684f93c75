//! What to submit: method, URL, headers and an optional body, mirroring
//! the teacher's own `RequestBuilder` surface instead of narrowing every
//! dispatch to a bare GET.

use bytes::Bytes;

/// A request descriptor accepted by [`crate::dispatch::Dispatcher`]'s
/// submission methods.
///
/// Built explicitly via [`Request::new`]/[`Request::get`], or implicitly
/// from a bare URL (`&str`, `String`, `&String`) for the common
/// GET-with-no-extra-headers case.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: http::Method,
    pub(crate) url: String,
    pub(crate) headers: http::HeaderMap,
    pub(crate) body: Option<Bytes>,
}

impl Request {
    /// A request with the given method and URL, no headers, no body.
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Request {
            method,
            url: url.into(),
            headers: http::HeaderMap::new(),
            body: None,
        }
    }

    /// A `GET` request to `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    /// Sets (overwriting any prior value for `name`) a request header.
    pub fn header(mut self, name: http::header::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attaches a body, implicitly switching most callers to `POST`/`PUT`
    /// intent; the method itself is unaffected and still comes from
    /// [`Request::new`]/the method passed at construction.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &http::Method {
        &self.method
    }

    pub fn headers(&self) -> &http::HeaderMap {
        &self.headers
    }
}

impl From<&str> for Request {
    fn from(url: &str) -> Self {
        Request::get(url)
    }
}

impl From<String> for Request {
    fn from(url: String) -> Self {
        Request::get(url)
    }
}

impl From<&String> for Request {
    fn from(url: &String) -> Self {
        Request::get(url.clone())
    }
}
