//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, paths and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: `&ProxyConfig → Result<(), Vec<ValidationError>>`
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::ProxyConfig;
use crate::upstream::UpstreamAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    let tls = &config.listener.tls;
    for (field, value) in [
        ("listener.tls.cert_path", &tls.cert_path),
        ("listener.tls.key_path", &tls.key_path),
        ("listener.tls.client_ca_path", &tls.client_ca_path),
        ("authz.path", &config.authz.path),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::new(field, "is required"));
        }
    }

    if let Err(e) = UpstreamAddr::parse(&config.upstream.address) {
        errors.push(ValidationError::new("upstream.address", e.to_string()));
    }
    if let Err(e) = HeaderName::try_from(config.upstream.identity_header.as_str()) {
        errors.push(ValidationError::new(
            "upstream.identity_header",
            format!("{:?} is not a valid header name: {e}", config.upstream.identity_header),
        ));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_secs", timeouts.connect_secs),
        ("timeouts.request_secs", timeouts.request_secs),
        ("timeouts.tls_handshake_secs", timeouts.tls_handshake_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.meta.enabled {
        check_socket_addr(&mut errors, "meta.bind_address", &config.meta.bind_address);
    }
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if let Err(e) = value.parse::<SocketAddr>() {
        errors.push(ValidationError::new(field, format!("{value:?} is not a socket address: {e}")));
    }
}
