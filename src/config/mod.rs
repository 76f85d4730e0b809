//! Process configuration subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (flags and environment variables override the file)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ProxyConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Authorization rules are a separate document (see `authz`) and reload on
//!   their own; this configuration is read once at startup

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{load_config, resolve_config, ConfigError};
pub use schema::{
    AuthzConfig, ListenerConfig, LogFormat, MetaConfig, ObservabilityConfig, ProxyConfig, TimeoutConfig, TlsConfig,
    UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
