//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, including the first rules load
//! - Subsystems initialize in order: rules, upstream, TLS, listeners
//! - The proxy listener starts last, so traffic only arrives once rules are live

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::authz::{self, AuthzWatcher, Authorizer, Reloader};
use crate::config::ProxyConfig;
use crate::http::{build_router, run_meta_server, DispatchState, MetaState, ProxyServer};
use crate::lifecycle::signals::spawn_signal_handler;
use crate::lifecycle::Shutdown;
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::{build_server_config, TlsError};
use crate::observability::metrics;
use crate::upstream::{AddressError, HttpUpstream, UpstreamAddr};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("initial authorization rules: {0}")]
    Authz(#[from] authz::ConfigError),

    #[error(transparent)]
    Upstream(#[from] AddressError),

    #[error("invalid identity header name: {0}")]
    IdentityHeader(String),

    #[error("TLS: {0}")]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("meta server: {0}")]
    Meta(#[source] std::io::Error),

    #[error("rules watcher: {0}")]
    Watch(#[from] notify::Error),
}

/// Start every subsystem and run until shutdown.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    // 1. Rules: the first load must succeed.
    let table = authz::load_file(Path::new(&config.authz.path))?;
    metrics::record_identities(table.len());
    tracing::info!(path = %config.authz.path, identities = table.len(), "Authorization rules loaded");
    let authorizer = Arc::new(Authorizer::new(table));
    let reloader = Arc::new(Reloader::new(&config.authz.path, Arc::clone(&authorizer)));

    // 2. Upstream.
    let upstream_addr = UpstreamAddr::parse(&config.upstream.address)?;
    let identity_header = HeaderName::try_from(config.upstream.identity_header.as_str())
        .map_err(|e| StartupError::IdentityHeader(e.to_string()))?;
    let upstream = HttpUpstream::new(
        upstream_addr.clone(),
        Duration::from_secs(config.timeouts.connect_secs),
        Duration::from_secs(config.timeouts.request_secs),
    );
    tracing::info!(upstream = %upstream_addr, identity_header = %identity_header, "Upstream configured");

    // 3. TLS.
    let tls = &config.listener.tls;
    let tls_config = build_server_config(
        Path::new(&tls.cert_path),
        Path::new(&tls.key_path),
        Path::new(&tls.client_ca_path),
    )?;

    // 4. Reload triggers and shutdown.
    let shutdown = Shutdown::new();
    let signals = spawn_signal_handler(shutdown.clone(), Arc::clone(&reloader));
    let _watcher = if config.authz.watch {
        Some(AuthzWatcher::new(Arc::clone(&reloader)).run()?)
    } else {
        None
    };

    // 5. Meta server.
    let meta = if config.meta.enabled {
        let listener = TcpListener::bind(&config.meta.bind_address)
            .await
            .map_err(StartupError::Meta)?;
        let state = MetaState::new(Arc::clone(&authorizer), upstream_addr.to_string());
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = run_meta_server(listener, state, shutdown).await {
                tracing::error!(error = %e, "Meta server failed");
            }
        }))
    } else {
        None
    };

    // 6. Proxy listener, last.
    let listener = Listener::bind(&config.listener.bind_address, config.listener.max_connections).await?;
    let state = DispatchState::new(authorizer, Arc::new(upstream)).with_identity_header(identity_header);
    let server = ProxyServer::new(
        listener,
        tls_config,
        build_router(state),
        Duration::from_secs(config.timeouts.tls_handshake_secs),
    );

    let result = server
        .run(shutdown.clone(), Duration::from_secs(config.timeouts.shutdown_secs))
        .await;

    // The accept loop only returns on shutdown or a fatal listener error.
    shutdown.trigger();
    signals.abort();
    if let Some(meta) = meta {
        let _ = meta.await;
    }

    result.map_err(StartupError::from)
}
