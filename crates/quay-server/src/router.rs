//! Request pipeline for a server session.
//!
//! Dispatch order is part of the contract: proxy rules first, then static
//! assets, then the SPA fallback. API calls are never swallowed by the
//! fallback.

use crate::config::DevConfig;
use crate::proxy::{self, ProxyRule};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Immutable per-session routing state.
pub struct RouterState {
    rules: Vec<ProxyRule>,
    client: reqwest::Client,
    /// Bundler output directory (compiled assets + root document).
    out_dir: PathBuf,
    /// Raw static assets directory.
    static_dir: PathBuf,
    /// URL prefix for compiled output.
    public_path: String,
    /// URL prefix for the raw static mount.
    assets_base: String,
}

/// Build the session router from a merged configuration.
pub fn build_router(config: &DevConfig) -> Router {
    let state = Arc::new(RouterState {
        rules: proxy::normalize_rules(&config.proxy_table),
        client: reqwest::Client::new(),
        out_dir: config.out_dir.clone(),
        static_dir: PathBuf::from(&config.assets_sub_directory),
        public_path: config.assets_public_path.clone(),
        assets_base: config.assets_base(),
    });

    Router::new()
        .fallback(handle_request)
        // Allow everything: standard practice for a local dev server
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Ordered dispatch: proxy, static assets, SPA fallback, 404.
async fn handle_request(State(state): State<Arc<RouterState>>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();

    // 1. Proxy rules, declaration order.
    if let Some(rule) = proxy::match_rule(&state.rules, &path) {
        return proxy::forward(&state.client, rule, req).await;
    }

    // 2. Raw static assets mounted at the assets base.
    if let Some(rel) = strip_prefix_segment(&path, &state.assets_base) {
        if let Some(response) = serve_file(&state.static_dir, rel).await {
            return response;
        }
    }

    // 3. Compiled output under the public path.
    if let Some(rel) = strip_prefix_segment(&path, &state.public_path) {
        if let Some(response) = serve_file(&state.out_dir, rel).await {
            return response;
        }
    }

    // 4. SPA fallback: rewrite browser navigations to the root document.
    if is_navigation(req.method(), req.headers()) {
        if let Some(response) = serve_file(&state.out_dir, "index.html").await {
            return response;
        }
    }

    (StatusCode::NOT_FOUND, format!("File not found: {path}")).into_response()
}

/// Strip `prefix` from `path` on a whole-segment boundary.
fn strip_prefix_segment<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path.trim_start_matches('/'));
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

/// Whether a request looks like a browser navigation: a GET/HEAD whose
/// `Accept` admits HTML.
fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }
    headers
        .get(header::ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html") || accept.contains("*/*"))
}

/// Serve one file from `dir`, rejecting traversal outside it.
async fn serve_file(dir: &Path, rel: &str) -> Option<Response> {
    let rel = Path::new(rel.trim_start_matches('/'));
    if rel
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return None;
    }

    let file_path = dir.join(rel);
    if !file_path.is_file() {
        return None;
    }

    match tokio::fs::read(&file_path).await {
        Ok(content) => {
            let content_type = determine_content_type(&file_path);
            Some(
                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, content_type)
                    .header(header::CACHE_CONTROL, "no-cache")
                    .body(Body::from(content))
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
            )
        }
        Err(e) => {
            tracing::warn!("failed to read {}: {e}", file_path.display());
            None
        }
    }
}

/// Determine content type from file extension.
fn determine_content_type(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

    match extension {
        "html" => "text/html; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "css" => "text/css",
        "json" | "map" => "application/json",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyEntry;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn request(path: &str, accept: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn test_config(out_dir: &Path) -> DevConfig {
        DevConfig {
            out_dir: out_dir.to_path_buf(),
            ..DevConfig::default()
        }
    }

    #[tokio::test]
    async fn test_serves_compiled_assets_from_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bundle.js"), "console.log('hi')").unwrap();

        let router = build_router(&test_config(dir.path()));
        let response = router.oneshot(request("/bundle.js", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/javascript"
        );
        assert_eq!(body_string(response).await, "console.log('hi')");
    }

    #[tokio::test]
    async fn test_spa_fallback_serves_root_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>root</html>").unwrap();

        let router = build_router(&test_config(dir.path()));
        let response = router
            .oneshot(request(
                "/some/spa/route",
                Some("text/html,application/xhtml+xml"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("root"));
    }

    #[tokio::test]
    async fn test_non_html_accept_gets_404_not_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>root</html>").unwrap();

        let router = build_router(&test_config(dir.path()));
        let response = router
            .oneshot(request("/missing.json", Some("application/json")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_proxy_rule_wins_over_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>root</html>").unwrap();

        let mut config = test_config(dir.path());
        // Nothing listens here: a match must surface 502, not the root document.
        config.proxy_table.insert(
            "/api".to_string(),
            ProxyEntry::Target("http://127.0.0.1:9".to_string()),
        );

        let router = build_router(&config);
        let response = router
            .oneshot(request("/api/ping", Some("text/html")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>root</html>").unwrap();

        let router = build_router(&test_config(dir.path()));
        let response = router
            .oneshot(request("/../../etc/passwd", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_strip_prefix_segment() {
        assert_eq!(strip_prefix_segment("/a/b.js", "/"), Some("a/b.js"));
        assert_eq!(strip_prefix_segment("/app/b.js", "/app"), Some("b.js"));
        assert_eq!(strip_prefix_segment("/app", "/app"), Some(""));
        assert_eq!(strip_prefix_segment("/apple/b.js", "/app"), None);
        assert_eq!(strip_prefix_segment("/other", "/app"), None);
    }

    #[test]
    fn test_is_navigation() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, "text/html".parse().unwrap());
        assert!(is_navigation(&Method::GET, &headers));
        assert!(!is_navigation(&Method::POST, &headers));

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        assert!(!is_navigation(&Method::GET, &headers));

        assert!(!is_navigation(&Method::GET, &HeaderMap::new()));
    }

    #[test]
    fn test_determine_content_type() {
        assert_eq!(
            determine_content_type(Path::new("index.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            determine_content_type(Path::new("bundle.js")),
            "application/javascript"
        );
        assert_eq!(
            determine_content_type(Path::new("data.bin")),
            "application/octet-stream"
        );
    }
}
