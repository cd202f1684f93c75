//! Canonical endpoint keys, used by the dispatcher to bucket admission
//! counters. An endpoint is the `host:port` pair a request resolves to;
//! scheme, path and query play no part in admission control.

use url::Url;

use crate::error::{Error, Result};

/// A canonical `host:port` endpoint key.
///
/// Two requests that differ only in scheme, path or query share the same
/// `Endpoint` and therefore the same admission counters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(String);

impl Endpoint {
    /// Derives the endpoint key for `url`, defaulting the port from the
    /// scheme when the URL does not specify one explicitly. Fails with
    /// [`Error::invalid_argument`] if the URL has no host (e.g. a
    /// `data:` URL) or an unrecognized scheme with no default port.
    pub fn from_url(url: &Url) -> Result<Endpoint> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_argument(format!("url has no host: {url}")))?;

        let port = match url.port() {
            Some(port) => port,
            None => default_port(url.scheme())
                .ok_or_else(|| Error::invalid_argument(format!("url scheme has no default port: {url}")))?,
        };

        Ok(Endpoint(format!("{host}:{port}")))
    }

    /// Parses a raw request URL string and derives its endpoint key.
    pub fn parse(raw_url: &str) -> Result<Endpoint> {
        let url = Url::parse(raw_url).map_err(|e| Error::invalid_argument(format!("invalid url {raw_url:?}: {e}")))?;
        Endpoint::from_url(&url)
    }

    /// The `host:port` string this endpoint represents.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_default_ports_per_scheme() {
        assert_eq!(Endpoint::parse("http://example.com/a/b?q=1").unwrap().as_str(), "example.com:80");
        assert_eq!(Endpoint::parse("https://example.com/a").unwrap().as_str(), "example.com:443");
    }

    #[test]
    fn explicit_port_overrides_default() {
        assert_eq!(Endpoint::parse("http://example.com:8080/x").unwrap().as_str(), "example.com:8080");
    }

    #[test]
    fn scheme_path_and_query_do_not_affect_the_key() {
        let a = Endpoint::parse("https://example.com/one?x=1").unwrap();
        let b = Endpoint::parse("https://example.com/two?y=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_urls_without_a_host() {
        assert!(Endpoint::parse("data:text/plain,hello").is_err());
    }
}
