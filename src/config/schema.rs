//! Configuration schema definitions.
//!
//! This module defines the complete process configuration for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so a minimal file (or none) is enough.

use serde::{Deserialize, Serialize};

/// Root configuration for the authorization proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, mTLS).
    pub listener: ListenerConfig,

    /// Where authorized requests are forwarded.
    pub upstream: UpstreamConfig,

    /// Authorization rules source.
    pub authz: AuthzConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Health/status side server.
    pub meta: MetaConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    pub tls: TlsConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            max_connections: 10_000,
            tls: TlsConfig::default(),
        }
    }
}

/// mTLS material for the listener. All paths are PEM files.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Server certificate chain.
    pub cert_path: String,

    /// Server private key.
    pub key_path: String,

    /// CA bundle client certificates must chain to.
    pub client_ca_path: String,
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// `tcp://host:port`, `tcp4://…`, `tcp6://…` or `unix:///path`.
    pub address: String,

    /// Header carrying the caller identity to the upstream.
    pub identity_header: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "tcp://127.0.0.1:8000".to_string(),
            identity_header: "spiffe-id".to_string(),
        }
    }
}

/// Authorization rules configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Rules file (`.hcl`, `.conf` or `.json`).
    pub path: String,

    /// Reload automatically when the file changes.
    pub watch: bool,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            watch: true,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Upstream request timeout (until response headers) in seconds.
    pub request_secs: u64,

    /// Client TLS handshake timeout in seconds.
    pub tls_handshake_secs: u64,

    /// Time allowed for open connections to drain on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            tls_handshake_secs: 10,
            shutdown_secs: 30,
        }
    }
}

/// Meta server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetaConfig {
    pub enabled: bool,

    /// Bind address for health checks and status.
    pub bind_address: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8081".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format {other:?} (expected json or pretty)")),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
