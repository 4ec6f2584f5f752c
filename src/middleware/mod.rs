//! Middleware layer.
//!
//! Middleware wraps a [`Handler`](crate::Handler) and produces another one,
//! so it can be registered on the [`Router`](crate::Router) like any route.
//!
//! Built-in middleware:
//! - [`cors`]: permissive cross-origin headers and preflight short-circuit

mod cors;

pub use cors::{Cors, cors};
