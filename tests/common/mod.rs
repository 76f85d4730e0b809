//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authz_proxy::upstream::{Upstream, UpstreamError};
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::net::TcpListener;

/// Identity header the proxy sets by default.
pub const IDENTITY_HEADER: &str = "spiffe-id";

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

/// A throwaway CA that issues server and workload certificates.
pub struct Pki {
    ca_cert: Certificate,
    ca_key: KeyPair,
}

/// A certificate plus its private key.
pub struct Issued {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issued {
    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.serialize_der()))
    }

    /// Key and certificate in one PEM bundle, as reqwest wants it.
    pub fn identity_pem(&self) -> String {
        format!("{}{}", self.key.serialize_pem(), self.cert.pem())
    }
}

impl Pki {
    pub fn new(name: &str) -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = params.self_signed(&ca_key).unwrap();
        Self { ca_cert, ca_key }
    }

    pub fn ca_der(&self) -> CertificateDer<'static> {
        self.ca_cert.der().clone()
    }

    pub fn ca_pem(&self) -> String {
        self.ca_cert.pem()
    }

    /// Server certificate for `localhost`.
    pub fn server(&self) -> Issued {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params
            .subject_alt_names
            .push(SanType::IpAddress(std::net::Ipv4Addr::LOCALHOST.into()));
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        self.issue(params)
    }

    /// Client certificate carrying each of `uris` as a URI SAN.
    pub fn workload(&self, uris: &[&str]) -> Issued {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "workload");
        params.subject_alt_names = uris
            .iter()
            .map(|uri| SanType::URI(Ia5String::try_from(*uri).unwrap()))
            .collect();
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        self.issue(params)
    }

    fn issue(&self, params: CertificateParams) -> Issued {
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();
        Issued { cert, key }
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// What an echo backend has seen so far.
#[derive(Clone, Default)]
pub struct Seen {
    calls: Arc<AtomicUsize>,
    peers: Arc<Mutex<HashSet<SocketAddr>>>,
}

impl Seen {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Distinct TCP connections requests arrived on.
    pub fn connections(&self) -> usize {
        self.peers.lock().len()
    }
}

/// A running mock upstream.
pub struct Backend {
    pub addr: SocketAddr,
    pub seen: Seen,
}

impl Backend {
    pub fn calls(&self) -> usize {
        self.seen.calls()
    }

    pub fn connections(&self) -> usize {
        self.seen.connections()
    }

    pub fn upstream_url(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// Echo router used by every backend.
///
/// - `/slow/...` waits two seconds before answering
/// - `/teapot` answers 418
/// - anything else answers 200 and echoes the body
///
/// What the proxy sent is reported in `x-seen-*` response headers.
pub fn echo_router(seen: Seen) -> Router {
    Router::new().fallback(echo).with_state(seen)
}

async fn echo(State(seen): State<Seen>, request: Request<Body>) -> Response<Body> {
    seen.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(ConnectInfo(peer)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        seen.peers.lock().insert(*peer);
    }

    let (parts, body) = request.into_parts();
    if parts.uri.path().starts_with("/slow") {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned()
    };
    let identity_values = parts.headers.get_all(IDENTITY_HEADER).iter().count();

    let status = if parts.uri.path() == "/teapot" {
        StatusCode::IM_A_TEAPOT
    } else {
        StatusCode::OK
    };
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    Response::builder()
        .status(status)
        .header("x-seen-identity", header(IDENTITY_HEADER))
        .header("x-seen-identity-count", identity_values.to_string())
        .header("x-seen-host", header("host"))
        .header("x-seen-uri", parts.uri.to_string())
        .header("x-seen-method", parts.method.as_str())
        .header("x-seen-request-id", header("x-request-id"))
        .body(Body::from(body))
        .unwrap()
}

/// Start an echo backend on an ephemeral loopback port.
pub async fn start_backend() -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Seen::default();

    let app = echo_router(seen.clone()).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Backend { addr, seen }
}

/// Start an echo backend on a unix socket.
#[cfg(unix)]
pub async fn start_unix_backend(path: &std::path::Path) -> Seen {
    let listener = tokio::net::UnixListener::bind(path).unwrap();
    let seen = Seen::default();

    let app = echo_router(seen.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    seen
}

/// A port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

// ---------------------------------------------------------------------------
// In-process upstream
// ---------------------------------------------------------------------------

/// What the mock upstream does with a request.
#[derive(Clone, Copy)]
pub enum Reply {
    Status(u16),
    /// 200 whose body breaks off after one chunk.
    Truncated,
    /// Never answers.
    Hang,
    Timeout,
    InvalidRequest,
}

/// Upstream that records requests instead of sending them anywhere.
pub struct MockUpstream {
    reply: Reply,
    calls: AtomicUsize,
    last_headers: Mutex<Option<HeaderMap>>,
    forward_dropped: Arc<AtomicBool>,
}

/// Raises its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl MockUpstream {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            last_headers: Mutex::new(None),
            forward_dropped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.last_headers.lock().clone()
    }

    /// Whether a `forward` call was dropped before it finished.
    pub fn forward_dropped(&self) -> bool {
        self.forward_dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_headers.lock() = Some(request.headers().clone());

        match self.reply {
            Reply::Status(status) => {
                let body = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap_or_default();
                Ok(Response::builder()
                    .status(status)
                    .header("x-upstream", "mock")
                    .body(Body::from(body))
                    .unwrap())
            }
            Reply::Truncated => {
                let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                    Ok(Bytes::from_static(b"partial")),
                    Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "upstream reset")),
                ];
                Ok(Response::builder()
                    .status(200)
                    .body(Body::from_stream(futures_util::stream::iter(chunks)))
                    .unwrap())
            }
            Reply::Hang => {
                let _flag = DropFlag(Arc::clone(&self.forward_dropped));
                std::future::pending().await
            }
            Reply::Timeout => Err(UpstreamError::Timeout(Duration::from_secs(30))),
            Reply::InvalidRequest => Err(UpstreamError::InvalidRequest("bad authority".into())),
        }
    }
}
