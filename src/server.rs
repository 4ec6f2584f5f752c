//! HTTP server and graceful shutdown.
//!
//! # Lifecycle
//!
//! [`Server::bind`] claims the listening socket; a bind failure is returned
//! immediately and never retried. [`Server::serve`] spawns the accept loop and
//! hands back a [`RunningServer`], the only handle that can stop it.
//!
//! When [`RunningServer`] is shut down the accept loop:
//! 1. Immediately stops `listener.accept()` and releases the socket.
//! 2. Asks every open connection to finish its in-flight request and close.
//! 3. Waits for every connection task to complete.
//!
//! A streamed response (an SSE body) keeps its connection busy until the
//! stream ends, so whoever produces those streams must end them first.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{BoxError, Error};
use crate::lifecycle::Lifecycle;
use crate::request::Request;
use crate::response::{Response, ResponseBody};
use crate::router::Router;

/// Largest request body read before answering `413 Payload Too Large`.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// A bound, not yet serving, HTTP server.
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
}

impl Server {
    /// Binds `addr` (`host:port`, resolved through DNS if needed).
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # async fn run() -> Result<(), mcp_link::Error> {
    /// use mcp_link::{Router, Server};
    ///
    /// let running = Server::bind("127.0.0.1:8080").await?.serve(Router::new());
    /// # Ok(()) }
    /// ```
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        let bind_err = |source| Error::Bind { addr: addr.to_owned(), source };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self { listener, addr })
    }

    /// The bound address. Useful when binding port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Starts accepting connections and dispatching them through `router`.
    pub fn serve(self, router: Router) -> RunningServer {
        info!(addr = %self.addr, "http server listening");

        let stop = CancellationToken::new();
        let task = tokio::spawn(accept_loop(self.listener, Arc::new(router), stop.clone()));
        RunningServer { addr: self.addr, stop, task }
    }
}

/// Lifecycle handle of a serving [`Server`].
pub struct RunningServer {
    addr: SocketAddr,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Lifecycle for RunningServer {
    fn name(&self) -> &'static str { "http server" }

    async fn shutdown(mut self, deadline: Instant) -> Result<(), Error> {
        self.stop.cancel();
        match timeout_at(deadline, &mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => Err(Error::Shutdown {
                component: self.name(),
                source: Box::new(join_err),
            }),
            Err(_) => {
                self.task.abort();
                Err(Error::ShutdownTimeout { component: self.name() })
            }
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, router: Arc<Router>, stop: CancellationToken) {
    // Every connection task, so shutdown can wait for all of them.
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Check the stop token first so no new connection is taken once
            // shutdown has begun, even if more are queued.
            biased;

            () = stop.cancelled() => {
                info!(in_flight = tasks.len(), "http server draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                tasks.spawn(serve_connection(stream, peer, Arc::clone(&router), stop.clone()));
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    while tasks.join_next().await.is_some() {}

    info!("http server stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    stop: CancellationToken,
) {
    // Called once per request on the connection, not once per connection.
    let svc = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { dispatch(router, req, peer).await }
    });

    // HTTP/1.1 or HTTP/2, whatever the client negotiates.
    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let finished = tokio::select! {
        res = conn.as_mut() => Some(res),
        () = stop.cancelled() => None,
    };
    let res = match finished {
        Some(res) => res,
        None => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = res {
        debug!(peer = %peer, "connection error: {e}");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response. All failures become
/// responses, so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<ResponseBody>, Infallible> {
    let started = StdInstant::now();
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_owned();

    let response = match read_body(&parts.headers, body).await {
        Ok(bytes) => router.handle(Request::new(parts, bytes)).await,
        Err(status) => {
            warn!(peer = %peer, %method, path, status = status.as_u16(), "request body rejected");
            Response::status(status)
        }
    };

    debug!(
        %method,
        path,
        status = response.status_code().as_u16(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "request",
    );
    Ok(response.into_inner())
}

/// Collects at most [`MAX_BODY_BYTES`]. A declared `content-length` over the
/// limit is refused before anything is read.
async fn read_body<B>(headers: &HeaderMap, body: B) -> Result<Bytes, StatusCode>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_BYTES as u64) {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(StatusCode::PAYLOAD_TOO_LARGE),
        Err(e) => {
            debug!("failed to read request body: {e}");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so the SIGTERM arm is disabled here.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => info!("received Ctrl-C"),
        () = sigterm => info!("received SIGTERM"),
    }
}
