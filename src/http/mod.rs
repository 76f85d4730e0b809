//! HTTP layer subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection (net)
//!     → server.rs (hyper auto builder, peer chain → request extension)
//!     → request ID + trace middleware
//!     → dispatch.rs (identity → authorize → forward)
//!     → upstream response streamed back
//!
//! meta.rs serves health checks and status on a separate plain listener.
//! ```

pub mod dispatch;
pub mod meta;
pub mod server;

pub use dispatch::{dispatch, DispatchState, DEFAULT_IDENTITY_HEADER};
pub use meta::{build_meta_router, run_meta_server, MetaState};
pub use server::{build_router, ProxyServer};
