//! Upstream forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! authorized request (identity header already set)
//!     → client.rs (rewrite URI, HTTP/1.1, deadline)
//!     → connector.rs (dial address.rs target, connect timeout)
//!     → upstream response streamed back to the dispatcher
//! ```
//!
//! # Design Decisions
//! - One upstream per process; the address never comes from the request
//! - Bodies are streamed in both directions
//! - Dropping the returned future cancels the upstream call

pub mod address;
pub mod client;
pub mod connector;
pub mod error;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

pub use address::{AddrFamily, AddressError, UpstreamAddr};
pub use client::HttpUpstream;
pub use connector::UpstreamConnector;
pub use error::UpstreamError;

/// Something that can answer an authorized request.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError>;
}
