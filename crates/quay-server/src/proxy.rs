//! API request forwarding for the dev-time proxy table.
//!
//! Rules are matched in declaration order against whole path segments, and
//! a matching request is forwarded with its method, headers and body
//! preserved; hop-by-hop headers are stripped in both directions.

use crate::config::ProxyEntry;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use indexmap::IndexMap;

/// Headers that must NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    // Recomputed by the client for the upstream request
    "host",
    "content-length",
];

/// A normalized, immutable proxy rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRule {
    /// Path prefix from the table key.
    pub prefix: String,
    /// Upstream target URL (no trailing slash).
    pub target: String,
    /// Explicit match filter overriding the prefix.
    pub filter: Option<String>,
}

impl ProxyRule {
    /// The prefix this rule actually matches: the filter when present,
    /// otherwise the table key.
    pub fn effective_prefix(&self) -> &str {
        self.filter.as_deref().unwrap_or(&self.prefix)
    }

    /// Whole-segment prefix match: `/api` matches `/api` and `/api/x`,
    /// never `/apix`.
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.effective_prefix();
        match path.strip_prefix(prefix) {
            Some(rest) => prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Flatten the ordered config table into rules, preserving declaration order.
pub fn normalize_rules(table: &IndexMap<String, ProxyEntry>) -> Vec<ProxyRule> {
    table
        .iter()
        .map(|(prefix, entry)| ProxyRule {
            prefix: prefix.clone(),
            target: entry.target().trim_end_matches('/').to_string(),
            filter: entry.filter().map(str::to_string),
        })
        .collect()
}

/// First rule matching `path`, in declaration order.
pub fn match_rule<'a>(rules: &'a [ProxyRule], path: &str) -> Option<&'a ProxyRule> {
    rules.iter().find(|rule| rule.matches(path))
}

fn should_forward_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !HOP_BY_HOP_HEADERS.contains(&lower.as_str())
}

/// Forward `req` to the rule's target.
///
/// The original path and query are appended to the target as-is, matching
/// prefix-proxy semantics (`/api/x` with target `http://backend` is
/// forwarded to `http://backend/api/x`). Upstream connection failure maps
/// to 502.
pub async fn forward(client: &reqwest::Client, rule: &ProxyRule, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());
    let url = format!("{}{}", rule.target, path_and_query);

    tracing::debug!("proxying {} {} -> {url}", parts.method, parts.uri.path());

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let mut upstream_req = client.request(method, &url);

    for (name, value) in parts.headers.iter() {
        if should_forward_header(name.as_str()) {
            upstream_req = upstream_req.header(name.as_str(), value.as_bytes());
        }
    }

    let upstream = match upstream_req
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("proxy to {url} failed: {e}");
            return (
                StatusCode::BAD_GATEWAY,
                format!("Bad gateway: upstream {} unreachable", rule.target),
            )
                .into_response();
        }
    };

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        if should_forward_header(name.as_str()) {
            response = response.header(name.as_str(), value.as_bytes());
        }
    }

    let stream = upstream.bytes_stream().map_err(std::io::Error::other);
    response
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(prefix: &str, target: &str) -> ProxyRule {
        ProxyRule {
            prefix: prefix.to_string(),
            target: target.to_string(),
            filter: None,
        }
    }

    #[test]
    fn test_matches_whole_segments() {
        let rule = rule("/api", "http://localhost:9000");
        assert!(rule.matches("/api"));
        assert!(rule.matches("/api/ping"));
        assert!(rule.matches("/api/v2/users"));
        assert!(!rule.matches("/apix"));
        assert!(!rule.matches("/app"));
        assert!(!rule.matches("/"));
    }

    #[test]
    fn test_filter_overrides_prefix() {
        let rule = ProxyRule {
            prefix: "/api".to_string(),
            target: "http://localhost:9000".to_string(),
            filter: Some("/internal".to_string()),
        };
        assert!(rule.matches("/internal/x"));
        assert!(!rule.matches("/api/x"));
    }

    #[test]
    fn test_match_rule_respects_declaration_order() {
        let rules = vec![
            rule("/api/v2", "http://localhost:9002"),
            rule("/api", "http://localhost:9000"),
        ];
        assert_eq!(
            match_rule(&rules, "/api/v2/thing").unwrap().target,
            "http://localhost:9002"
        );
        assert_eq!(
            match_rule(&rules, "/api/thing").unwrap().target,
            "http://localhost:9000"
        );
        assert!(match_rule(&rules, "/other").is_none());
    }

    #[test]
    fn test_normalize_preserves_order_and_trims_targets() {
        let mut table = IndexMap::new();
        table.insert(
            "/api".to_string(),
            ProxyEntry::Target("http://localhost:9000/".to_string()),
        );
        table.insert(
            "/ws".to_string(),
            ProxyEntry::Detailed {
                target: "http://localhost:9001".to_string(),
                filter: Some("/socket".to_string()),
            },
        );

        let rules = normalize_rules(&table);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].prefix, "/api");
        assert_eq!(rules[0].target, "http://localhost:9000");
        assert_eq!(rules[1].effective_prefix(), "/socket");
    }

    #[test]
    fn test_hop_by_hop_headers_are_dropped() {
        assert!(!should_forward_header("Connection"));
        assert!(!should_forward_header("transfer-encoding"));
        assert!(!should_forward_header("Host"));
        assert!(should_forward_header("Accept"));
        assert!(should_forward_header("X-Request-Id"));
        assert!(should_forward_header("Cookie"));
    }
}
