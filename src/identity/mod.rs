//! Caller identity subsystem.
//!
//! # Data Flow
//! ```text
//! verified peer chain (DER)
//!     → extract.rs (leaf certificate, exactly one URI SAN)
//!     → Identity::parse (SPIFFE ID grammar)
//!     → Identity (canonical, comparable, immutable)
//! ```
//!
//! # Grammar
//! `Identity::parse` follows the SPIFFE ID standard
//! (<https://github.com/spiffe/spiffe/blob/main/standards/SPIFFE-ID.md>):
//! - §2.1 trust domain: lowercase letters, digits, `.`, `-`, `_`; no port or userinfo
//! - §2.2 path: `/`-separated segments of letters, digits, `.`, `-`, `_`;
//!   no empty, `.` or `..` segments, no trailing slash
//! - §2 scheme is exactly `spiffe`; query and fragment are not allowed
//!
//! # Design Decisions
//! - The canonical form is the parsed string itself; the grammar admits no
//!   alternative spellings, so string equality is identity equality
//! - Zero or several URI SANs is an error, never a silent pick
//! - No fallback to subject CN or DNS SANs

pub mod extract;

pub use extract::{extract_identity, IdentityExtractionError};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// URI scheme every identity must carry.
pub const SCHEME: &str = "spiffe";

/// Errors produced when a string does not follow the identity URI grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity is empty")]
    Empty,

    #[error("scheme must be \"spiffe\"")]
    WrongScheme,

    #[error("trust domain is missing")]
    MissingTrustDomain,

    #[error("trust domain contains invalid character {0:?}")]
    BadTrustDomainChar(char),

    #[error("path contains an empty segment")]
    EmptySegment,

    #[error("path contains a dot segment")]
    DotSegment,

    #[error("path contains invalid character {0:?}")]
    BadPathChar(char),

    #[error("path cannot have a trailing slash")]
    TrailingSlash,
}

/// A caller identity such as `spiffe://example.org/ns/default/sa/web`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    uri: String,
    /// Byte offset where the path starts (equals `uri.len()` when there is none).
    path_start: usize,
}

impl Identity {
    /// Parse and validate an identity URI.
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        if input.is_empty() {
            return Err(IdentityError::Empty);
        }

        let rest = input
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or(IdentityError::WrongScheme)?;

        let td_len = rest.find('/').unwrap_or(rest.len());
        let (trust_domain, path) = rest.split_at(td_len);

        if trust_domain.is_empty() {
            return Err(IdentityError::MissingTrustDomain);
        }
        if let Some(c) = trust_domain.chars().find(|c| !is_trust_domain_char(*c)) {
            return Err(IdentityError::BadTrustDomainChar(c));
        }

        validate_path(path)?;

        Ok(Self {
            uri: input.to_owned(),
            path_start: input.len() - path.len(),
        })
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Trust domain name, e.g. `example.org`.
    pub fn trust_domain(&self) -> &str {
        let start = SCHEME.len() + "://".len();
        &self.uri[start..self.path_start]
    }

    /// Path component including the leading slash; empty when absent.
    pub fn path(&self) -> &str {
        &self.uri[self.path_start..]
    }
}

fn is_trust_domain_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_')
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

fn validate_path(path: &str) -> Result<(), IdentityError> {
    if path.is_empty() {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(IdentityError::TrailingSlash);
    }

    // `path` starts with '/', so the first split item is always empty.
    for segment in path.split('/').skip(1) {
        match segment {
            "" => return Err(IdentityError::EmptySegment),
            "." | ".." => return Err(IdentityError::DotSegment),
            _ => {
                if let Some(c) = segment.chars().find(|c| !is_path_char(*c)) {
                    return Err(IdentityError::BadPathChar(c));
                }
            }
        }
    }
    Ok(())
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_workload_identity() {
        let id = Identity::parse("spiffe://example.org/ns/default/sa/web").unwrap();
        assert_eq!(id.as_str(), "spiffe://example.org/ns/default/sa/web");
        assert_eq!(id.trust_domain(), "example.org");
        assert_eq!(id.path(), "/ns/default/sa/web");
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn trust_domain_only_is_valid() {
        let id = Identity::parse("spiffe://example.org").unwrap();
        assert_eq!(id.trust_domain(), "example.org");
        assert_eq!(id.path(), "");
    }

    #[test]
    fn equality_follows_string_form() {
        let a: Identity = "spiffe://example.org/a".parse().unwrap();
        let b: Identity = "spiffe://example.org/a".parse().unwrap();
        let c: Identity = "spiffe://example.org/b".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_bad_scheme() {
        assert_eq!(Identity::parse("https://example.org/a"), Err(IdentityError::WrongScheme));
        assert_eq!(Identity::parse("SPIFFE://example.org/a"), Err(IdentityError::WrongScheme));
        assert_eq!(Identity::parse("spiffe:/example.org"), Err(IdentityError::WrongScheme));
        assert_eq!(Identity::parse(""), Err(IdentityError::Empty));
    }

    #[test]
    fn rejects_missing_trust_domain() {
        assert_eq!(Identity::parse("spiffe://"), Err(IdentityError::MissingTrustDomain));
        assert_eq!(Identity::parse("spiffe:///path"), Err(IdentityError::MissingTrustDomain));
    }

    #[test]
    fn rejects_bad_trust_domain() {
        assert_eq!(
            Identity::parse("spiffe://Example.org/a"),
            Err(IdentityError::BadTrustDomainChar('E'))
        );
        assert_eq!(
            Identity::parse("spiffe://example.org:8443/a"),
            Err(IdentityError::BadTrustDomainChar(':'))
        );
        assert_eq!(
            Identity::parse("spiffe://user@example.org"),
            Err(IdentityError::BadTrustDomainChar('@'))
        );
    }

    #[test]
    fn rejects_bad_paths() {
        assert_eq!(Identity::parse("spiffe://example.org/"), Err(IdentityError::TrailingSlash));
        assert_eq!(Identity::parse("spiffe://example.org//a"), Err(IdentityError::EmptySegment));
        assert_eq!(Identity::parse("spiffe://example.org/a/../b"), Err(IdentityError::DotSegment));
        assert_eq!(Identity::parse("spiffe://example.org/a?x=1"), Err(IdentityError::BadPathChar('?')));
        assert_eq!(Identity::parse("spiffe://example.org/a#frag"), Err(IdentityError::BadPathChar('#')));
        assert_eq!(Identity::parse("spiffe://example.org/a b"), Err(IdentityError::BadPathChar(' ')));
    }

    #[test]
    fn character_classes_match_the_spiffe_id_standard() {
        // Path segments may mix case; trust domains may not.
        assert!(Identity::parse("spiffe://trust_domain-1.example/Ns/Web_App-2.v1").is_ok());
        assert_eq!(
            Identity::parse("spiffe://example.org/a%20b"),
            Err(IdentityError::BadPathChar('%'))
        );
        assert_eq!(
            Identity::parse("spiffe://exa%6dple.org/a"),
            Err(IdentityError::BadTrustDomainChar('%'))
        );
        assert_eq!(Identity::parse("spiffe://example.org/é"), Err(IdentityError::BadPathChar('é')));
    }
}
