//! # mcp-link
//!
//! A small HTTP gateway that serves a calculator tool and its OpenAPI
//! documentation next to an SSE message transport, and shuts all of it down
//! in order when the process is told to stop.
//!
//! ## Routes
//!
//! | Path | Handler | CORS |
//! |---|---|---|
//! | `/sse`, `/message` | [`transport::SseEndpoint`] | [`middleware::cors`] |
//! | `/calculator` | [`calculator::handle`] | no |
//! | `/openapi.yaml` | [`docs::spec_file`] | `Allow-Origin` only |
//! | `/swagger`, `/` | [`docs::viewer`] | `Allow-Origin` only |
//!
//! ## Shutdown
//!
//! Two components outlive any single request: the HTTP server and the SSE
//! transport. Both implement [`Lifecycle`] and are owned by one
//! [`Orchestrator`], which on SIGINT / SIGTERM drains the transport, then the
//! server, under a single deadline. Any failure is fatal.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mcp_link::{ServeConfig, serve};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mcp_link::Error> {
//!     serve(ServeConfig { port: 3000, ..ServeConfig::default() }).await
//! }
//! ```

mod error;
mod gateway;
mod handler;
mod lifecycle;
mod request;
mod response;
mod router;
mod server;

pub mod calculator;
pub mod docs;
pub mod middleware;
pub mod transport;

pub use error::{BoxError, Error};
pub use gateway::{CALCULATOR_PATH, ServeConfig, router, serve, serve_until};
pub use handler::Handler;
pub use lifecycle::{Lifecycle, Orchestrator, SHUTDOWN_TIMEOUT, State};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{MAX_BODY_BYTES, RunningServer, Server, shutdown_signal};
