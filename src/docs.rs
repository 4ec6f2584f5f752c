//! API documentation pages.
//!
//! | Path | Serves |
//! |---|---|
//! | `/openapi.yaml` | the OpenAPI document from disk, verbatim |
//! | `/swagger` | a Swagger UI page pointed at `?url=` |
//! | `/` | the same page, or a redirect to it when there is no query |
//!
//! Both set `Access-Control-Allow-Origin: *` themselves so browser tooling on
//! other origins can fetch the document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use http::{HeaderValue, StatusCode};
use tracing::debug;

use crate::handler::Handler;
use crate::request::Request;
use crate::response::{ContentType, Response};

pub const SPEC_PATH: &str = "/openapi.yaml";
pub const VIEWER_PATH: &str = "/swagger";

/// Where a bare `/` is sent.
pub const VIEWER_REDIRECT: &str = "/swagger?url=/openapi.yaml";

const VIEWER_HTML: &str = include_str!("../assets/swagger.html");

/// Handler serving the file at `path`. The file is read on every request, so
/// edits show up without a restart.
pub fn spec_file(path: impl Into<PathBuf>) -> impl Handler {
    let path: Arc<Path> = Arc::from(path.into());
    move |_req: Request| serve_spec(Arc::clone(&path))
}

async fn serve_spec(path: Arc<Path>) -> Response {
    match tokio::fs::read(&*path).await {
        Ok(content) => Response::builder()
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))
            .bytes(ContentType::Yaml, content),
        Err(e) => {
            debug!(path = %path.display(), "cannot read openapi spec: {e}");
            Response::builder()
                .status(StatusCode::NOT_FOUND)
                .text("OpenAPI specification file not found")
        }
    }
}

/// Swagger UI handler, mounted on both `/swagger` and `/`.
pub async fn viewer(req: Request) -> Response {
    if req.path() == "/" && req.query().is_none_or(str::is_empty) {
        return Response::redirect(VIEWER_REDIRECT);
    }

    Response::builder()
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))
        .bytes(ContentType::Html, VIEWER_HTML)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn get(uri: &str) -> Request {
        Request::from_http(http::Request::get(uri).body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn bare_root_redirects_to_viewer() {
        for uri in ["/", "/?"] {
            let res = viewer(get(uri)).await;
            assert_eq!(res.status_code(), StatusCode::FOUND, "{uri}");
            assert_eq!(res.header("location"), Some(VIEWER_REDIRECT));
        }
    }

    #[tokio::test]
    async fn root_with_query_serves_page() {
        let res = viewer(get("/?url=/other.yaml")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }

    #[tokio::test]
    async fn viewer_path_serves_page() {
        let res = viewer(get("/swagger")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let body = res.body_bytes().unwrap();
        assert!(std::str::from_utf8(body).unwrap().contains("SwaggerUIBundle"));
    }

    #[tokio::test]
    async fn spec_file_is_served_verbatim() {
        let path = std::env::temp_dir().join(format!("mcp-link-spec-{}.yaml", std::process::id()));
        let content = "openapi: 3.0.3\ninfo:\n  title: test\n";
        tokio::fs::write(&path, content).await.unwrap();

        let handler = spec_file(path.clone()).into_boxed_handler();
        let res = handler.call(get(SPEC_PATH)).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/yaml; charset=utf-8"));
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(res.body_bytes().map(|b| &b[..]), Some(content.as_bytes()));
    }

    #[tokio::test]
    async fn missing_spec_file_is_not_found() {
        let handler = spec_file("/definitely/not/here/openapi.yaml").into_boxed_handler();
        let res = handler.call(get(SPEC_PATH)).await;

        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            res.body_bytes().map(|b| &b[..]),
            Some(&b"OpenAPI specification file not found"[..]),
        );
    }
}
