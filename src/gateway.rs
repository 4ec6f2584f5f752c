//! Gateway composition: the route table and the `serve` entry point.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::calculator;
use crate::docs;
use crate::error::Error;
use crate::lifecycle::{Orchestrator, SHUTDOWN_TIMEOUT, State};
use crate::middleware::cors;
use crate::router::Router;
use crate::server::{Server, shutdown_signal};
use crate::transport::{MESSAGE_PATH, SSE_PATH, SseTransport};

pub const CALCULATOR_PATH: &str = "/calculator";

/// Settings for one `serve` invocation.
#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// OpenAPI document served at `/openapi.yaml`.
    pub spec_file: PathBuf,
    /// Budget for draining both lifecycles after a shutdown signal.
    pub shutdown_timeout: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8080,
            spec_file: PathBuf::from("openapi.yaml"),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServeConfig {
    /// `host:port`, bracketing IPv6 literals.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// The gateway's route table.
///
/// The transport paths are CORS-wrapped. `/calculator` is not: it answers
/// with its own content type only.
pub fn router(config: &ServeConfig, transport: &SseTransport) -> Router {
    Router::new()
        .route(SSE_PATH, cors(transport.endpoint()))
        .route(MESSAGE_PATH, cors(transport.endpoint()))
        .route(CALCULATOR_PATH, calculator::handle)
        .route(docs::SPEC_PATH, docs::spec_file(config.spec_file.clone()))
        .route(docs::VIEWER_PATH, docs::viewer)
        .route("/", docs::viewer)
}

/// Runs the gateway until SIGINT / SIGTERM, then shuts it down.
pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    serve_until(config, shutdown_signal()).await
}

/// Like [`serve`], with a caller-provided shutdown trigger.
pub async fn serve_until(
    config: ServeConfig,
    signal: impl Future<Output = ()>,
) -> Result<(), Error> {
    let addr = config.addr();
    info!(state = %State::Starting, %addr, "starting gateway");

    let server = Server::bind(&addr).await?;
    let transport = SseTransport::new();
    let running = server.serve(router(&config, &transport));

    Orchestrator::new(transport, running)
        .with_timeout(config.shutdown_timeout)
        .run_until(signal)
        .await
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{Method, StatusCode};

    use super::*;
    use crate::request::Request;

    fn request(method: Method, uri: &str, body: &'static str) -> Request {
        Request::from_http(
            http::Request::builder()
                .method(method)
                .uri(uri)
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap(),
        )
    }

    #[test]
    fn default_config() {
        let config = ServeConfig::default();
        assert_eq!(config.addr(), "localhost:8080");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let config = ServeConfig { host: "::1".to_owned(), port: 9000, ..ServeConfig::default() };
        assert_eq!(config.addr(), "[::1]:9000");
    }

    #[tokio::test]
    async fn routes_every_path() {
        let app = router(&ServeConfig::default(), &SseTransport::new());

        let calc = app
            .handle(request(Method::POST, "/calculator", r#"{"operand1":2,"operand2":3,"operator":"*"}"#))
            .await;
        assert_eq!(calc.status_code(), StatusCode::OK);

        let root = app.handle(request(Method::GET, "/", "")).await;
        assert_eq!(root.status_code(), StatusCode::FOUND);

        let viewer = app.handle(request(Method::GET, "/swagger", "")).await;
        assert_eq!(viewer.status_code(), StatusCode::OK);

        let missing = app.handle(request(Method::GET, "/unknown", "")).await;
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn transport_paths_get_cors_and_calculator_does_not() {
        let app = router(&ServeConfig::default(), &SseTransport::new());

        for path in [SSE_PATH, MESSAGE_PATH] {
            let res = app.handle(request(Method::OPTIONS, path, "")).await;
            assert_eq!(res.status_code(), StatusCode::OK, "{path}");
            assert_eq!(res.header("access-control-allow-origin"), Some("*"), "{path}");
        }

        let res = app.handle(request(Method::POST, MESSAGE_PATH, "{}")).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.header("access-control-allow-headers"), Some("*"));

        let res = app.handle(request(Method::OPTIONS, CALCULATOR_PATH, "")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("access-control-allow-origin"), None);
    }
}
