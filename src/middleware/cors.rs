//! Permissive CORS decorator.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::error;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, private};
use crate::request::Request;
use crate::response::Response;

/// Wraps `handler` so every response grants any origin, method and header.
///
/// `OPTIONS` requests are answered with an empty `200 OK` and never reach
/// `handler`.
///
/// The headers are written onto the response `handler` produces, replacing
/// any values it set, so no handler can opt out. A handler that panics is
/// answered with `500 Internal Server Error`, which carries the headers too.
///
/// ```rust,no_run
/// use mcp_link::{Request, Response, Router, middleware::cors};
///
/// async fn events(_req: Request) -> Response { Response::text("") }
///
/// let app = Router::new().route("/sse", cors(events));
/// ```
pub fn cors(handler: impl Handler) -> Cors {
    Cors { inner: handler.into_boxed_handler() }
}

/// Handler produced by [`cors`].
pub struct Cors {
    inner: BoxedHandler,
}

impl ErasedHandler for Cors {
    fn call(&self, req: Request) -> BoxFuture {
        if req.method() == Method::OPTIONS {
            return Box::pin(async {
                let mut res = Response::status(StatusCode::OK);
                allow_any(res.headers_mut());
                res
            });
        }

        let fut = AssertUnwindSafe(self.inner.call(req)).catch_unwind();
        Box::pin(async move {
            let mut res = fut.await.unwrap_or_else(|_| {
                error!("handler panicked behind cors");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            });
            allow_any(res.headers_mut());
            res
        })
    }
}

impl private::Sealed for Cors {}

impl Handler for Cors {
    fn into_boxed_handler(self) -> BoxedHandler {
        std::sync::Arc::new(self)
    }
}

/// Overwrites whatever the wrapped handler set.
fn allow_any(headers: &mut HeaderMap) {
    let any = HeaderValue::from_static("*");
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, any.clone());
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, any.clone());
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, any);
}
