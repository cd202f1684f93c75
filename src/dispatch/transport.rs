//! Bridges the dispatcher's blocking callers to the external async HTTP
//! transport (`wreq`), via a private background Tokio runtime.
//!
//! Nothing here is reachable from outside the crate: callers only ever
//! see [`crate::dispatch::Dispatcher`], [`crate::dispatch::DispatchOperation`]
//! and the delegate protocol. This module owns the runtime, owns the
//! `wreq::Client`, and translates response/body-stream polling into the
//! five callback kinds the delegate protocol exposes.

use std::sync::Arc;

use futures_util::StreamExt;

use crate::dispatch::delegate::{AuthChallengeDisposition, AuthenticationChallenge, DispatchDelegate};
use crate::dispatch::operation::DispatchOperation;
use crate::error::{Error, Result};
use crate::log::{self, ls_log};

pub(crate) struct Transport {
    runtime: tokio::runtime::Runtime,
    client: wreq::Client,
}

impl Transport {
    pub(crate) fn new(max_per_endpoint: u32) -> Result<Transport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("ls-dispatcher-io")
            .enable_all()
            .build()
            .map_err(|e| Error::invalid_argument(format!("failed to start background runtime: {e}")))?;

        let client = wreq::Client::builder()
            .pool_max_idle_per_host(max_per_endpoint as usize)
            .build()
            .map_err(|e| Error::transport("<client-init>", e))?;

        Ok(Transport { runtime, client })
    }

    /// Spawns the request onto the background runtime. `on_terminal` runs
    /// once `run_request` has delivered the terminal delegate callback,
    /// never holding the dispatcher's monitor, so the dispatcher can
    /// release the endpoint's admission slot from it.
    pub(crate) fn spawn_request(
        &self,
        op: Arc<DispatchOperation>,
        delegate: Arc<dyn DispatchDelegate>,
        on_terminal: impl FnOnce(Arc<DispatchOperation>) + Send + 'static,
    ) {
        let client = self.client.clone();
        self.runtime.spawn(async move {
            let op_for_release = op.clone();
            run_request(client, op, delegate).await;
            on_terminal(op_for_release);
        });
    }
}

/// Builds the outbound request from whatever method/headers/body the
/// operation was submitted with (see [`crate::dispatch::Request`]).
fn build_request(client: &wreq::Client, op: &DispatchOperation) -> wreq::RequestBuilder {
    let mut builder = client.request(op.method().clone(), op.request_url()).headers(op.request_headers().clone());
    if let Some(body) = op.body() {
        builder = builder.body(body.clone());
    }
    builder
}

fn is_auth_challenge(status: http::StatusCode) -> bool {
    status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::PROXY_AUTHENTICATION_REQUIRED
}

/// Handles a 401/407 response per §4.3.3: if the delegate implements
/// [`crate::dispatch::AuthChallengeHandler`], forward the challenge and
/// block (via `block_in_place`, since this runs on a background-runtime
/// worker thread, not the caller's) until it decides; otherwise perform
/// default handling by passing the challenged response through unchanged.
async fn handle_auth_challenge(
    client: &wreq::Client,
    op: &Arc<DispatchOperation>,
    delegate: &Arc<dyn DispatchDelegate>,
    endpoint: &str,
    response: wreq::Response,
) -> Result<wreq::Response> {
    let Some(handler) = delegate.as_auth_challenge_handler() else {
        return Ok(response);
    };

    let header_name = if response.status() == http::StatusCode::PROXY_AUTHENTICATION_REQUIRED {
        http::header::PROXY_AUTHENTICATE
    } else {
        http::header::WWW_AUTHENTICATE
    };
    let challenge = AuthenticationChallenge::from_header(response.headers().get(header_name));

    let sender = crate::dispatch::delegate::AuthChallengeSender::new();
    handler.will_send_request_for_authentication_challenge(op, &challenge, sender.clone());

    let disposition = {
        let sender = sender.clone();
        tokio::task::block_in_place(move || sender.wait_for_disposition())
    };

    match disposition {
        AuthChallengeDisposition::UseCredential(credential) => build_request(client, op)
            .basic_auth(credential.username, Some(credential.password))
            .send()
            .await
            .map_err(|err| Error::transport(endpoint.to_string(), err)),
        AuthChallengeDisposition::ContinueWithoutCredential | AuthChallengeDisposition::PerformDefaultHandling => Ok(response),
        AuthChallengeDisposition::Cancel => Err(Error::cancelled(endpoint.to_string())),
        AuthChallengeDisposition::RejectProtectionSpace => Err(Error::authentication_rejected(endpoint.to_string())),
    }
}

async fn run_request(client: wreq::Client, op: Arc<DispatchOperation>, delegate: Arc<dyn DispatchDelegate>) {
    op.mark_running();

    let url = op.request_url().to_string();
    let endpoint = op.endpoint().to_string();

    let mut response = match build_request(&client, &op).send().await {
        Ok(response) => response,
        Err(err) => {
            let error = Error::transport(endpoint.clone(), err);
            ls_log!(log::URL_DISPATCHER, &endpoint, "request to {url} failed before a response: {error}");
            delegate.did_fail_with_error(&op, &error);
            op.fail(error);
            return;
        }
    };

    if is_auth_challenge(response.status()) {
        match handle_auth_challenge(&client, &op, &delegate, &endpoint, response).await {
            Ok(resumed) => response = resumed,
            Err(error) => {
                ls_log!(log::URL_DISPATCHER, &endpoint, "authentication challenge for {url} ended in: {error}");
                delegate.did_fail_with_error(&op, &error);
                op.fail(error);
                return;
            }
        }
    }

    let status = response.status();
    let headers = response.headers().clone();
    op.record_response(status, headers.clone());
    delegate.did_receive_response(&op, status, &headers);

    let mut stream = response.bytes_stream();
    loop {
        if op.is_cancel_requested() {
            let error = Error::cancelled(endpoint.clone());
            delegate.did_fail_with_error(&op, &error);
            op.fail(error);
            return;
        }

        match stream.next().await {
            Some(Ok(chunk)) => {
                op.append_data(&chunk);
                delegate.did_receive_data(&op, &chunk);
            }
            Some(Err(err)) => {
                let error = Error::transport(endpoint.clone(), err);
                delegate.did_fail_with_error(&op, &error);
                op.fail(error);
                return;
            }
            None => {
                op.finish();
                delegate.did_finish(&op);
                return;
            }
        }
    }
}
