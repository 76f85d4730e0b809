//! Health and status side server.
//!
//! Plain HTTP, separate port, no authentication. Probes only answer whether
//! the process is up; `/status` reports what is loaded.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::authz::Authorizer;
use crate::lifecycle::Shutdown;

#[derive(Clone)]
pub struct MetaState {
    authorizer: Arc<Authorizer>,
    upstream: String,
    started: Instant,
}

impl MetaState {
    pub fn new(authorizer: Arc<Authorizer>, upstream: impl Into<String>) -> Self {
        Self {
            authorizer,
            upstream: upstream.into(),
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub identities: usize,
    pub upstream: String,
    pub uptime_secs: u64,
}

pub fn build_meta_router(state: MetaState) -> Router {
    Router::new()
        .route("/health/live", get(health_ok))
        .route("/health/ready", get(health_ok))
        .route("/health/startup", get(health_ok))
        .route("/status", get(status))
        .with_state(state)
}

async fn health_ok() -> StatusCode {
    StatusCode::OK
}

async fn status(State(state): State<MetaState>) -> Json<StatusReport> {
    Json(StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        identities: state.authorizer.count(),
        upstream: state.upstream.clone(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

/// Serve the meta router until shutdown.
pub async fn run_meta_server(listener: TcpListener, state: MetaState, shutdown: Shutdown) -> std::io::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(address = %addr, "Meta server starting");

    let mut stop = shutdown.subscribe();
    axum::serve(listener, build_meta_router(state))
        .with_graceful_shutdown(async move {
            let _ = stop.recv().await;
        })
        .await?;

    tracing::info!("Meta server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        build_meta_router(MetaState::new(Arc::new(Authorizer::default()), "tcp://127.0.0.1:8000"))
    }

    #[tokio::test]
    async fn health_endpoints_answer_ok() {
        for path in ["/health/live", "/health/ready", "/health/startup"] {
            let response = router()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn status_reports_identity_count() {
        let response = router()
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["identities"], 0);
        assert_eq!(report["upstream"], "tcp://127.0.0.1:8000");
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let response = router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
