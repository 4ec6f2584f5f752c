//! Minimal SSE message transport.
//!
//! A client opens `GET /sse` and keeps the response open. The first event
//! tells it where to post:
//!
//! ```text
//! event: endpoint
//! data: /message?sessionId=6f1c…
//! ```
//!
//! Every body later posted to that URL is relayed verbatim on the stream as an
//! `event: message`. The transport does not look inside the messages; the
//! protocol spoken over it belongs to whatever adapter sits on either end.
//!
//! [`SseTransport`] is the lifecycle half and is owned by the
//! [`Orchestrator`](crate::Orchestrator). [`SseEndpoint`] is the request
//! handler half, registered on both paths.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use http::header::CACHE_CONTROL;
use http::{HeaderValue, Method, StatusCode};
use hyper::body::Frame;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at, timeout_at};
use tokio_stream::wrappers::{IntervalStream, ReceiverStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, private};
use crate::lifecycle::Lifecycle;
use crate::request::Request;
use crate::response::{ContentType, Response};

pub const SSE_PATH: &str = "/sse";
pub const MESSAGE_PATH: &str = "/message";

/// Events buffered per stream. A post to a full stream is refused.
const STREAM_BUFFER: usize = 64;

/// Comment line sent on idle streams so dead peers are noticed.
const KEEP_ALIVE: Duration = Duration::from_secs(15);

struct Inner {
    sessions: Mutex<HashMap<Uuid, mpsc::Sender<Bytes>>>,
    open_streams: watch::Sender<usize>,
    closing: CancellationToken,
}

impl Inner {
    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, mpsc::Sender<Bytes>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lifecycle handle of the SSE transport.
pub struct SseTransport {
    inner: Arc<Inner>,
}

impl SseTransport {
    pub fn new() -> Self {
        let (open_streams, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                open_streams,
                closing: CancellationToken::new(),
            }),
        }
    }

    /// Request handler for [`SSE_PATH`] and [`MESSAGE_PATH`].
    pub fn endpoint(&self) -> SseEndpoint {
        SseEndpoint { inner: Arc::clone(&self.inner) }
    }

    /// Number of event streams whose response body is still alive.
    pub fn open_streams(&self) -> usize {
        *self.inner.open_streams.borrow()
    }
}

impl Default for SseTransport {
    fn default() -> Self { Self::new() }
}

impl Lifecycle for SseTransport {
    fn name(&self) -> &'static str { "sse transport" }

    /// Ends every open stream, then waits until hyper has dropped all of
    /// their bodies.
    async fn shutdown(self, deadline: Instant) -> Result<(), Error> {
        self.inner.closing.cancel();
        let mut open = self.inner.open_streams.subscribe();
        info!(open_streams = *open.borrow(), "closing sse streams");

        let drained = timeout_at(deadline, open.wait_for(|n| *n == 0)).await.is_ok();
        if drained {
            Ok(())
        } else {
            warn!(open_streams = self.open_streams(), "sse streams still open at deadline");
            Err(Error::ShutdownTimeout { component: self.name() })
        }
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

/// Request handler half of the transport. Cheap to clone.
#[derive(Clone)]
pub struct SseEndpoint {
    inner: Arc<Inner>,
}

impl SseEndpoint {
    pub async fn handle(&self, req: Request) -> Response {
        match req.path() {
            SSE_PATH => self.connect(&req),
            MESSAGE_PATH => self.relay(req).await,
            _ => Response::status(StatusCode::NOT_FOUND),
        }
    }

    fn connect(&self, req: &Request) -> Response {
        if req.method() != Method::GET {
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .text("Method not allowed");
        }
        if self.inner.closing.is_cancelled() {
            return Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .text("Server is shutting down");
        }

        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let announce = encode_event("endpoint", &format!("{MESSAGE_PATH}?sessionId={id}"));
        if tx.try_send(announce).is_err() {
            return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
        }
        let session = Session::open(Arc::clone(&self.inner), id, tx);
        debug!(session = %id, "sse stream opened");

        let keep_alive = IntervalStream::new(interval_at(Instant::now() + KEEP_ALIVE, KEEP_ALIVE))
            .map(|_| Bytes::from_static(b": keep-alive\n\n"));
        let events = stream::select(ReceiverStream::new(rx), keep_alive)
            .take_until(self.inner.closing.clone().cancelled_owned())
            .map(move |chunk| {
                // The session lives exactly as long as the response body.
                let _session = &session;
                Ok::<_, Infallible>(Frame::data(chunk))
            });

        Response::builder()
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .stream(ContentType::EventStream, events)
    }

    async fn relay(&self, req: Request) -> Response {
        if req.method() != Method::POST {
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .text("Method not allowed");
        }
        if self.inner.closing.is_cancelled() {
            return Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .text("Server is shutting down");
        }

        let Some(raw_id) = req.query_param("sessionId") else {
            return bad_request("Missing sessionId");
        };
        let Ok(id) = Uuid::parse_str(raw_id) else {
            return bad_request("Invalid sessionId");
        };

        let sender = self.inner.sessions().get(&id).cloned();
        let Some(sender) = sender else {
            return session_not_found();
        };

        let event = encode_event("message", &String::from_utf8_lossy(req.body()));
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(session = %id, "sse stream is not being read, message dropped");
                return Response::builder()
                    .status(StatusCode::SERVICE_UNAVAILABLE)
                    .text("Session is not reading events");
            }
            Err(TrySendError::Closed(_)) => return session_not_found(),
        }
        debug!(session = %id, bytes = req.body().len(), "message relayed");

        Response::builder().status(StatusCode::ACCEPTED).text("Accepted")
    }
}

impl ErasedHandler for SseEndpoint {
    fn call(&self, req: Request) -> BoxFuture {
        let endpoint = self.clone();
        Box::pin(async move { endpoint.handle(req).await })
    }
}

impl private::Sealed for SseEndpoint {}

impl Handler for SseEndpoint {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

fn bad_request(message: &'static str) -> Response {
    Response::builder().status(StatusCode::BAD_REQUEST).text(message)
}

fn session_not_found() -> Response {
    Response::builder().status(StatusCode::NOT_FOUND).text("Session not found")
}

// ── Sessions ──────────────────────────────────────────────────────────────────

/// Registration of one open stream. Dropping it unregisters the session and
/// releases the stream from the open count.
struct Session {
    inner: Arc<Inner>,
    id: Uuid,
}

impl Session {
    fn open(inner: Arc<Inner>, id: Uuid, tx: mpsc::Sender<Bytes>) -> Self {
        inner.sessions().insert(id, tx);
        inner.open_streams.send_modify(|n| *n += 1);
        Self { inner, id }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.sessions().remove(&self.id);
        self.inner.open_streams.send_modify(|n| *n = n.saturating_sub(1));
        debug!(session = %self.id, "sse stream closed");
    }
}

/// Formats one SSE event. Multi-line data becomes several `data:` lines.
fn encode_event(event: &str, data: &str) -> Bytes {
    let mut out = format!("event: {event}\n");
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line.strip_suffix('\r').unwrap_or(line));
        out.push('\n');
    }
    out.push('\n');
    Bytes::from(out)
}
