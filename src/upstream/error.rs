use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Failure to obtain a response from the upstream.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The outbound request could not be built from the inbound one.
    #[error("could not build upstream request: {0}")]
    InvalidRequest(String),

    #[error("upstream request failed: {0}")]
    Request(#[source] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

impl UpstreamError {
    /// Status returned to the caller for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            UpstreamError::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UpstreamError::Request(_) | UpstreamError::Timeout(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether the failure happened while establishing the connection.
    pub fn is_connect(&self) -> bool {
        matches!(self, UpstreamError::Request(e) if e.is_connect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            UpstreamError::InvalidRequest("bad".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            UpstreamError::Timeout(Duration::from_secs(1)).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
