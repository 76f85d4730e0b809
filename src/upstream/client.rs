//! HTTP forwarder to the configured upstream.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, Uri, Version};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use crate::upstream::address::UpstreamAddr;
use crate::upstream::connector::UpstreamConnector;
use crate::upstream::error::UpstreamError;
use crate::upstream::Upstream;

/// Idle upstream connections kept for reuse.
const POOL_MAX_IDLE: usize = 32;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Connection-scoped headers that must not be relayed.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Pooled HTTP/1.1 client bound to a single upstream address.
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client<UpstreamConnector, Body>,
    addr: UpstreamAddr,
    request_timeout: Duration,
}

impl HttpUpstream {
    pub fn new(addr: UpstreamAddr, connect_timeout: Duration, request_timeout: Duration) -> Self {
        let connector = UpstreamConnector::new(addr.clone(), connect_timeout);
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE)
            .build(connector);

        Self {
            client,
            addr,
            request_timeout,
        }
    }

    pub fn addr(&self) -> &UpstreamAddr {
        &self.addr
    }

    /// Point the request at the upstream.
    ///
    /// The URI authority is always the upstream's own, so the pool holds one
    /// set of connections whatever `Host` callers send. The caller's `Host`
    /// is relayed as a header; HTTP/2 callers only carry it in the URI.
    fn rewrite(&self, request: Request<Body>) -> Result<Request<Body>, UpstreamError> {
        let (mut parts, body) = request.into_parts();

        if !parts.headers.contains_key(header::HOST) {
            if let Some(authority) = parts.uri.authority() {
                let host = HeaderValue::from_str(authority.as_str())
                    .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
                parts.headers.insert(header::HOST, host);
            }
        }

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        parts.uri = Uri::builder()
            .scheme("http")
            .authority(self.addr.authority().as_str())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);

        Ok(Request::from_parts(parts, body))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        let request = self.rewrite(request)?;

        tracing::debug!(uri = %request.uri(), upstream = %self.addr, "Forwarding request");

        let response = tokio::time::timeout(self.request_timeout, self.client.request(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.request_timeout))?
            .map_err(UpstreamError::Request)?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are connection-scoped as well.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> HttpUpstream {
        HttpUpstream::new(
            UpstreamAddr::parse("tcp://127.0.0.1:8000").unwrap(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn rewrite_targets_upstream_and_keeps_host() {
        let request = Request::builder()
            .uri("/a/b?c=d")
            .header(header::HOST, "service.internal")
            .body(Body::empty())
            .unwrap();

        let out = upstream().rewrite(request).unwrap();
        assert_eq!(out.uri().to_string(), "http://127.0.0.1:8000/a/b?c=d");
        assert_eq!(out.headers()[header::HOST], "service.internal");
        assert_eq!(out.version(), Version::HTTP_11);
    }

    #[tokio::test]
    async fn rewrite_moves_http2_authority_into_host() {
        let h2_style = Request::builder()
            .uri("https://front.example:8443/x")
            .version(Version::HTTP_2)
            .body(Body::empty())
            .unwrap();
        let out = upstream().rewrite(h2_style).unwrap();
        assert_eq!(out.uri().to_string(), "http://127.0.0.1:8000/x");
        assert_eq!(out.headers()[header::HOST], "front.example:8443");
        assert_eq!(out.version(), Version::HTTP_11);

        let bare = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let out = upstream().rewrite(bare).unwrap();
        assert_eq!(out.uri().to_string(), "http://127.0.0.1:8000/x");
        assert!(out.headers().get(header::HOST).is_none());
    }

    #[tokio::test]
    async fn distinct_hosts_share_one_upstream_uri() {
        let client = upstream();
        let uris: Vec<String> = ["a.example", "b.example", "bad host"]
            .into_iter()
            .map(|host| {
                let request = Request::builder()
                    .uri("/x")
                    .header(header::HOST, HeaderValue::from_static(host))
                    .body(Body::empty())
                    .unwrap();
                client.rewrite(request).unwrap().uri().to_string()
            })
            .collect();
        assert!(uris.iter().all(|uri| uri == "http://127.0.0.1:8000/x"));
    }

    #[test]
    fn hop_by_hop_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-session"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert(header::TE, HeaderValue::from_static("trailers"));
        headers.insert("x-kept", HeaderValue::from_static("1"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-session").is_none());
        assert!(headers.get(header::TE).is_none());
        assert_eq!(headers.get("x-kept").unwrap(), "1");
    }
}
