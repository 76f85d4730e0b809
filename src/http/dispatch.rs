//! Per-request authorization and forwarding.
//!
//! # Data Flow
//! ```text
//! request + PeerCertificates extension
//!     → extract_identity        ✗ → 400
//!     → Authorizer::authorize   ✗ → 403
//!     → set identity header
//!     → Upstream::forward       ✗ → 502 / 500
//!     → upstream status, headers and streamed body
//! ```
//!
//! Error responses carry no body; the reason is only logged.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;

use crate::authz::Authorizer;
use crate::identity::{extract_identity, IdentityExtractionError};
use crate::net::tls::PeerCertificates;
use crate::observability::metrics::{self, Outcome};
use crate::upstream::Upstream;

/// Header carrying the caller identity when no other name is configured.
pub const DEFAULT_IDENTITY_HEADER: &str = "spiffe-id";

/// Shared state injected into the dispatch handler.
#[derive(Clone)]
pub struct DispatchState {
    pub authorizer: Arc<Authorizer>,
    pub upstream: Arc<dyn Upstream>,
    pub identity_header: HeaderName,
}

impl DispatchState {
    pub fn new(authorizer: Arc<Authorizer>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            authorizer,
            upstream,
            identity_header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
        }
    }

    pub fn with_identity_header(mut self, name: HeaderName) -> Self {
        self.identity_header = name;
        self
    }
}

/// Authorize the caller and relay the request upstream.
pub async fn dispatch(State(state): State<DispatchState>, mut request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().as_str().to_owned();
    let path = request.uri().path().to_owned();

    let identity = match request
        .extensions()
        .get::<PeerCertificates>()
        .ok_or(IdentityExtractionError::NoCertificate)
        .and_then(|peer| extract_identity(peer.chain()))
    {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(method = %method, path = %path, error = %e, "Rejecting request without usable identity");
            return reject(StatusCode::BAD_REQUEST, Outcome::BadIdentity, start);
        }
    };

    if let Err(e) = state.authorizer.authorize(&identity, &method, &path) {
        tracing::info!(
            identity = %identity,
            method = %method,
            path = %path,
            reason = %e,
            "Request denied"
        );
        return reject(StatusCode::FORBIDDEN, Outcome::Denied, start);
    }

    // Replaces any value the caller sent.
    match HeaderValue::from_str(identity.as_str()) {
        Ok(value) => {
            request.headers_mut().insert(state.identity_header.clone(), value);
        }
        Err(e) => {
            tracing::error!(identity = %identity, error = %e, "Identity is not a valid header value");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, Outcome::UpstreamError, start);
        }
    }

    match state.upstream.forward(request).await {
        Ok(response) => {
            let status = response.status();
            tracing::debug!(identity = %identity, method = %method, path = %path, status = status.as_u16(), "Request forwarded");
            metrics::record_request(Outcome::Forwarded, status.as_u16(), start);
            relay(response, identity.to_string(), path)
        }
        Err(e) => {
            let status = e.status_code();
            tracing::error!(
                identity = %identity,
                method = %method,
                path = %path,
                error = %e,
                "Upstream request failed"
            );
            reject(status, Outcome::UpstreamError, start)
        }
    }
}

fn reject(status: StatusCode, outcome: Outcome, start: Instant) -> Response {
    metrics::record_request(outcome, status.as_u16(), start);
    status.into_response()
}

/// Stream the upstream body back, logging if it breaks off midway.
fn relay(response: Response<Body>, identity: String, path: String) -> Response {
    let (parts, body) = response.into_parts();
    let stream = body.into_data_stream().inspect_err(move |e| {
        tracing::warn!(identity = %identity, path = %path, error = %e, "Upstream response body truncated");
    });
    Response::from_parts(parts, Body::from_stream(stream))
}
