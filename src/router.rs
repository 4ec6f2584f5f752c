//! Fixed-path request router.
//!
//! One radix tree, keyed on the request path only. Method handling belongs to
//! each handler: the calculator rejects non-POST itself, the CORS decorator
//! answers OPTIONS, and so on.

use std::sync::Arc;

use http::StatusCode;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each [`Router::route`] call returns `self` so registrations chain naturally.
pub struct Router {
    routes: MatchitRouter<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: MatchitRouter::new() }
    }

    /// Register a handler for an exact path. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics if the path is already registered or is not a valid route.
    pub fn route(mut self, path: &str, handler: impl Handler) -> Self {
        self.routes
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(&self, path: &str) -> Option<BoxedHandler> {
        let matched = self.routes.at(path).ok()?;
        Some(Arc::clone(matched.value))
    }

    /// Routes one request. Unmatched paths get an empty `404 Not Found`.
    pub async fn handle(&self, req: Request) -> Response {
        match self.lookup(req.path()) {
            Some(handler) => handler.call(req).await,
            None => Response::status(StatusCode::NOT_FOUND),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
