//! authz-proxy
//!
//! Terminates mutual TLS, derives the caller's identity from its client
//! certificate, checks the request against the authorization rules and relays
//! allowed requests to a single upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────┐
//!                        │                   AUTHZ PROXY                      │
//!                        │                                                    │
//!   mTLS client          │  ┌─────────┐   ┌─────────┐   ┌──────────────┐      │
//!   ─────────────────────┼─▶│   net   │──▶│  http   │──▶│   identity   │      │
//!                        │  │listener │   │ server  │   │  extraction  │      │
//!                        │  │ + TLS   │   └─────────┘   └──────┬───────┘      │
//!                        │  └─────────┘                        ▼              │
//!                        │                              ┌──────────────┐      │
//!                        │        rules file ─────────▶ │    authz     │      │
//!                        │        (watch / SIGHUP)      │  authorizer  │      │
//!                        │                              └──────┬───────┘      │
//!                        │                                     ▼              │
//!   response             │                              ┌──────────────┐      │
//!   ◀────────────────────┼───────────────────────────── │   upstream   │◀─────┼──── Upstream
//!                        │                              │    client    │      │     (tcp/unix)
//!                        │                              └──────────────┘      │
//!                        │  config · lifecycle · observability · meta server  │
//!                        └───────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use authz_proxy::config::{resolve_config, Cli};
use authz_proxy::lifecycle;
use authz_proxy::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability.log_level, config.observability.log_format)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "authz-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        authz_path = %config.authz.path,
        max_connections = config.listener.max_connections,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
