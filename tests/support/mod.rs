//! A throwaway local HTTP server for dispatcher integration tests, built
//! on the same `hyper`/`hyper-util` stack the crate's own teacher lineage
//! uses for its test servers.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::Response;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::{Notify, Semaphore};

/// A running test server bound to `127.0.0.1` on an OS-assigned port.
///
/// Dropping it stops accepting new connections; already-accepted
/// connections are driven to completion by the handler tasks they were
/// spawned on.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

/// Starts a server that responds `200 OK` with an empty body to every
/// request, on the given runtime. Useful for S1/S3-style tests that only
/// care about admission and scheduling, not response content.
pub fn spawn_ok_server(runtime: &tokio::runtime::Runtime) -> TestServer {
    spawn_with_handler(runtime, |_req| async move { Ok(Response::new(Full::new(Bytes::new()))) })
}

/// Starts a server whose handler acquires one permit from `hold` before
/// responding, simulating a long-running or backpressure-inducing
/// endpoint (S4/S5/S6). A `Semaphore` (rather than a `Notify`) is used
/// deliberately: releasing permits must unblock connections that haven't
/// been accepted yet, not just whichever handlers are already waiting.
pub fn spawn_holding_server(runtime: &tokio::runtime::Runtime, hold: Arc<Semaphore>) -> TestServer {
    spawn_with_handler(runtime, move |_req| {
        let hold = hold.clone();
        async move {
            let permit = hold.acquire().await.expect("semaphore never closes");
            permit.forget();
            Ok(Response::new(Full::new(Bytes::new())))
        }
    })
}

fn spawn_with_handler<F, Fut>(runtime: &tokio::runtime::Runtime, handler: F) -> TestServer
where
    F: Fn(hyper::Request<hyper::body::Incoming>) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Result<Response<Full<Bytes>>, Infallible>> + Send + 'static,
{
    let listener = runtime
        .block_on(TcpListener::bind(("127.0.0.1", 0)))
        .expect("failed to bind test server");
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Notify::new());
    let accept_shutdown = shutdown.clone();

    runtime.spawn(async move {
        loop {
            let accept = listener.accept();
            tokio::select! {
                _ = accept_shutdown.notified() => return,
                result = accept => {
                    let Ok((stream, _)) = result else { continue };
                    let io = TokioIo::new(stream);
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let _ = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, service_fn(handler))
                            .await;
                    });
                }
            }
        }
    });

    TestServer { addr, shutdown }
}
