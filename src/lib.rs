//! Identity-aware mTLS authorization proxy library.

pub mod authz;
pub mod config;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod upstream;

pub use authz::{AuthorizationError, AuthorizationTable, Authorizer, Route};
pub use config::schema::ProxyConfig;
pub use http::{build_router, DispatchState, ProxyServer};
pub use identity::{extract_identity, Identity};
pub use lifecycle::Shutdown;
pub use upstream::{HttpUpstream, Upstream, UpstreamError};
