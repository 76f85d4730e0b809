//! mTLS proxy server.
//!
//! # Responsibilities
//! - Build the Axum router around the dispatch handler
//! - Wire up middleware (request ID, tracing)
//! - Run the bounded accept loop and the TLS handshake
//! - Serve HTTP/1.1 and HTTP/2 on each connection
//! - Attach the verified peer chain to every request
//! - Drain open connections on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::ServerConfig;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::http::dispatch::{dispatch, DispatchState};
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::tls::PeerCertificates;

/// Build the proxy router with all middleware layers.
pub fn build_router(state: DispatchState) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Accepts mTLS connections and serves the proxy router on them.
pub struct ProxyServer {
    listener: Listener,
    acceptor: TlsAcceptor,
    app: Router,
    handshake_timeout: Duration,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    pub fn new(listener: Listener, tls: Arc<ServerConfig>, app: Router, handshake_timeout: Duration) -> Self {
        Self {
            listener,
            acceptor: TlsAcceptor::from(tls),
            app,
            handshake_timeout,
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accept until shutdown, then give open connections `drain_timeout` to finish.
    pub async fn run(self, shutdown: Shutdown, drain_timeout: Duration) -> Result<(), ListenerError> {
        let addr = self.listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(address = %addr, "Proxy server starting");

        let mut stop = shutdown.subscribe();
        loop {
            let accepted = tokio::select! {
                _ = stop.recv() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr, permit) = match accepted {
                Ok(conn) => conn,
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let conn = Connection {
                acceptor: self.acceptor.clone(),
                app: self.app.clone(),
                handshake_timeout: self.handshake_timeout,
                peer_addr,
                guard: self.tracker.track(),
                _permit: permit,
            };
            tokio::spawn(conn.serve(stream, shutdown.subscribe()));
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Proxy server stopped accepting, draining connections"
        );
        if !self.tracker.drain(drain_timeout).await {
            tracing::warn!(
                active_connections = self.tracker.active_count(),
                "Drain timeout elapsed, closing remaining connections"
            );
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

struct Connection {
    acceptor: TlsAcceptor,
    app: Router,
    handshake_timeout: Duration,
    peer_addr: SocketAddr,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
}

impl Connection {
    async fn serve(self, stream: TcpStream, mut stop: broadcast::Receiver<()>) {
        let connection_id = self.guard.id();
        let peer_addr = self.peer_addr;

        let tls = match tokio::time::timeout(self.handshake_timeout, self.acceptor.accept(stream)).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %connection_id, peer_addr = %peer_addr, error = %e, "TLS handshake failed");
                return;
            }
            Err(_) => {
                tracing::debug!(connection_id = %connection_id, peer_addr = %peer_addr, "TLS handshake timed out");
                return;
            }
        };

        let peer = tls
            .get_ref()
            .1
            .peer_certificates()
            .map(|chain| PeerCertificates::new(chain.to_vec()));

        let app = self.app;
        let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
            if let Some(peer) = &peer {
                request.extensions_mut().insert(peer.clone());
            }
            request.extensions_mut().insert(ConnectInfo(peer_addr));
            app.clone().oneshot(request)
        });

        let builder = auto::Builder::new(TokioExecutor::new());
        let conn = builder.serve_connection_with_upgrades(TokioIo::new(tls), service);
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            _ = stop.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };

        if let Err(e) = result {
            tracing::debug!(connection_id = %connection_id, peer_addr = %peer_addr, error = %e, "Connection closed with error");
        }
    }
}
