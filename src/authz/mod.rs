//! Authorization subsystem.
//!
//! # Data Flow
//! ```text
//! rules file (.hcl / .json)
//!     → loader.rs (parse, validate every identity and route)
//!     → AuthorizationTable (immutable snapshot)
//!     → authorizer.rs (atomic swap into the live slot)
//!
//! Per request:
//!     identity + method + path
//!     → Authorizer::authorize (one snapshot)
//!     → table.rs lookup → route.rs match
//!
//! On change:
//!     watcher.rs / SIGHUP → reload.rs → loader.rs → Authorizer::update
//! ```
//!
//! # Design Decisions
//! - Default deny: unknown identities and unmatched routes are refused
//! - A failed reload never replaces a working table
//! - Readers never block on reloads

pub mod authorizer;
pub mod loader;
pub mod reload;
pub mod route;
pub mod table;
pub mod watcher;

pub use authorizer::Authorizer;
pub use loader::{load_file, parse, ConfigError, DocumentFormat};
pub use reload::Reloader;
pub use route::{Route, RouteError};
pub use table::{AuthorizationError, AuthorizationTable};
pub use watcher::AuthzWatcher;
