//! The delegate protocol a caller implements to observe a dispatch
//! operation's lifecycle, plus the optional authentication-challenge
//! capability.

use std::sync::{Arc, Condvar, Mutex};

use bytes::Bytes;

use crate::dispatch::operation::DispatchOperation;
use crate::error::Error;

/// Receives lifecycle events for operations it was registered against.
///
/// `did_receive_response` and `did_receive_data` may each be called more
/// than once per operation (the latter as the body streams in); exactly
/// one of `did_finish`/`did_fail` is called, exactly once, as the
/// terminal event.
pub trait DispatchDelegate: Send + Sync {
    fn did_receive_response(&self, op: &Arc<DispatchOperation>, status: http::StatusCode, headers: &http::HeaderMap);

    fn did_receive_data(&self, op: &Arc<DispatchOperation>, chunk: &Bytes);

    fn did_fail_with_error(&self, op: &Arc<DispatchOperation>, error: &Error);

    fn did_finish(&self, op: &Arc<DispatchOperation>);

    /// Opts a delegate into the [`AuthChallengeHandler`] capability.
    /// Returns `None` by default, meaning the transport performs default
    /// handling (continues with the challenged response as-is) rather than
    /// pausing for a disposition.
    fn as_auth_challenge_handler(&self) -> Option<&dyn AuthChallengeHandler> {
        None
    }
}

/// Opt-in capability for delegates that want to inspect or override
/// authentication challenges before the transport handles them.
///
/// A delegate implements this separately from [`DispatchDelegate`]
/// (rather than the dispatcher probing for it via runtime introspection),
/// matching how the rest of the crate favors typed capability traits
/// over dynamic dispatch.
pub trait AuthChallengeHandler: Send + Sync {
    fn will_send_request_for_authentication_challenge(
        &self,
        op: &Arc<DispatchOperation>,
        challenge: &AuthenticationChallenge,
        sender: AuthChallengeSender,
    );
}

/// A minimal description of a received authentication challenge: the
/// realm and scheme advertised by the endpoint.
#[derive(Debug, Clone)]
pub struct AuthenticationChallenge {
    pub realm: String,
    pub scheme: String,
}

impl AuthenticationChallenge {
    /// Builds a challenge from a `WWW-Authenticate`/`Proxy-Authenticate`
    /// header value such as `Basic realm="Restricted Area"`. Missing or
    /// unparseable headers yield empty fields rather than failing: the
    /// challenge is advisory, not load-bearing for the disposition.
    pub(crate) fn from_header(value: Option<&http::HeaderValue>) -> Self {
        let raw = value.and_then(|v| v.to_str().ok()).unwrap_or("");
        let scheme = raw.split_whitespace().next().unwrap_or("").to_string();
        let realm = extract_realm(raw);
        AuthenticationChallenge { realm, scheme }
    }
}

fn extract_realm(raw: &str) -> String {
    let Some((_, rest)) = raw.split_once("realm=") else {
        return String::new();
    };
    let rest = rest.trim_start();
    if let Some(quoted) = rest.strip_prefix('"') {
        quoted.split('"').next().unwrap_or("").to_string()
    } else {
        rest.split(|c: char| c == ',' || c.is_whitespace()).next().unwrap_or("").to_string()
    }
}

/// A credential supplied in response to an [`AuthenticationChallenge`].
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// What a delegate decided to do about a challenge.
#[derive(Debug)]
pub enum AuthChallengeDisposition {
    UseCredential(Credential),
    ContinueWithoutCredential,
    Cancel,
    PerformDefaultHandling,
    RejectProtectionSpace,
}

struct SenderState {
    disposition: Option<AuthChallengeDisposition>,
}

/// Accepts exactly one disposition for a challenge and forwards it back
/// to the transport; every call after the first is silently ignored.
#[derive(Clone)]
pub struct AuthChallengeSender {
    state: Arc<Mutex<SenderState>>,
    condvar: Arc<Condvar>,
}

impl AuthChallengeSender {
    pub(crate) fn new() -> Self {
        AuthChallengeSender {
            state: Arc::new(Mutex::new(SenderState { disposition: None })),
            condvar: Arc::new(Condvar::new()),
        }
    }

    fn record(&self, disposition: AuthChallengeDisposition) {
        let mut state = self.state.lock().unwrap();
        if state.disposition.is_none() {
            state.disposition = Some(disposition);
            self.condvar.notify_all();
        }
    }

    pub fn use_credential(&self, credential: Credential) {
        self.record(AuthChallengeDisposition::UseCredential(credential));
    }

    pub fn continue_without_credential(&self) {
        self.record(AuthChallengeDisposition::ContinueWithoutCredential);
    }

    pub fn cancel(&self) {
        self.record(AuthChallengeDisposition::Cancel);
    }

    pub fn perform_default_handling(&self) {
        self.record(AuthChallengeDisposition::PerformDefaultHandling);
    }

    pub fn reject_protection_space(&self) {
        self.record(AuthChallengeDisposition::RejectProtectionSpace);
    }

    /// The disposition recorded so far, if any call has been made.
    pub(crate) fn disposition(&self) -> Option<AuthChallengeDisposition> {
        self.state.lock().unwrap().disposition.clone()
    }

    /// Blocks the calling thread until a disposition has been recorded,
    /// then returns it. Used by the transport to pause a request on a
    /// background-runtime thread while the delegate decides.
    pub(crate) fn wait_for_disposition(&self) -> AuthChallengeDisposition {
        let mut state = self.state.lock().unwrap();
        while state.disposition.is_none() {
            state = self.condvar.wait(state).unwrap();
        }
        state.disposition.clone().unwrap()
    }
}

impl Clone for AuthChallengeDisposition {
    fn clone(&self) -> Self {
        match self {
            AuthChallengeDisposition::UseCredential(c) => AuthChallengeDisposition::UseCredential(c.clone()),
            AuthChallengeDisposition::ContinueWithoutCredential => AuthChallengeDisposition::ContinueWithoutCredential,
            AuthChallengeDisposition::Cancel => AuthChallengeDisposition::Cancel,
            AuthChallengeDisposition::PerformDefaultHandling => AuthChallengeDisposition::PerformDefaultHandling,
            AuthChallengeDisposition::RejectProtectionSpace => AuthChallengeDisposition::RejectProtectionSpace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_only_records_the_first_disposition() {
        let sender = AuthChallengeSender::new();
        sender.continue_without_credential();
        sender.cancel();

        assert!(matches!(
            sender.disposition(),
            Some(AuthChallengeDisposition::ContinueWithoutCredential)
        ));
    }

    #[test]
    fn sender_wakes_a_waiter_blocked_on_the_disposition() {
        let sender = AuthChallengeSender::new();
        let waiter = sender.clone();
        let handle = std::thread::spawn(move || waiter.wait_for_disposition());

        std::thread::sleep(std::time::Duration::from_millis(20));
        sender.use_credential(Credential {
            username: "alice".into(),
            password: "hunter2".into(),
        });

        assert!(matches!(handle.join().unwrap(), AuthChallengeDisposition::UseCredential(_)));
    }

    #[test]
    fn challenge_parses_scheme_and_quoted_realm() {
        let header = http::HeaderValue::from_static(r#"Basic realm="Restricted Area""#);
        let challenge = AuthenticationChallenge::from_header(Some(&header));
        assert_eq!(challenge.scheme, "Basic");
        assert_eq!(challenge.realm, "Restricted Area");
    }

    #[test]
    fn challenge_defaults_to_empty_fields_when_header_is_absent() {
        let challenge = AuthenticationChallenge::from_header(None);
        assert_eq!(challenge.scheme, "");
        assert_eq!(challenge.realm, "");
    }
}
