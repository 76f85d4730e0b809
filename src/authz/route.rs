//! Route pattern matching.
//!
//! # Responsibilities
//! - Hold one authorization rule: a path pattern plus its allowed methods
//! - Decide whether a (method, path) pair is covered by the rule
//!
//! # Design Decisions
//! - Patterns are split into segments once, at construction
//! - Method tokens compare byte-for-byte; `*` is the only wildcard token
//! - Literal segments are case-sensitive
//! - No regex, matching is a single left-to-right walk
//!
//! # Matching quirk
//! A path with fewer segments than its pattern matches as long as every
//! segment it does have agrees with the pattern: `/bucket/foo` matches the
//! pattern `/bucket/foo/bar`. Deployed rule sets depend on this, so it is
//! reproduced as-is.

use std::fmt;

use thiserror::Error;

/// Method token that allows every method.
pub const WILDCARD_METHOD: &str = "*";
/// Segment that matches exactly one path segment.
pub const WILDCARD_SEGMENT: &str = "*";
/// Segment that matches all remaining path segments.
pub const WILDCARD_SEGMENTS: &str = "**";

/// Reasons a rule cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("pattern is empty")]
    EmptyPattern,

    #[error("pattern {0:?} uses \"**\" before its final segment")]
    MisplacedMultiWildcard(String),

    #[error("method list is empty")]
    NoMethods,

    #[error("method {0:?} is not an uppercase HTTP method token or \"*\"")]
    InvalidMethod(String),
}

/// One segment of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`
    One,
    /// `**`
    Rest,
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw {
            WILDCARD_SEGMENT => Segment::One,
            WILDCARD_SEGMENTS => Segment::Rest,
            literal => Segment::Literal(literal.to_owned()),
        }
    }
}

/// An authorization rule: path pattern plus allowed method set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pattern: String,
    segments: Vec<Segment>,
    methods: Vec<String>,
}

impl Route {
    /// Compile a rule from its pattern and method list.
    pub fn new<I, S>(pattern: impl Into<String>, methods: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(RouteError::EmptyPattern);
        }

        let methods: Vec<String> = methods.into_iter().map(Into::into).collect();
        if methods.is_empty() {
            return Err(RouteError::NoMethods);
        }
        if let Some(bad) = methods.iter().find(|m| !is_method_token(m)) {
            return Err(RouteError::InvalidMethod(bad.clone()));
        }

        let trimmed = pattern.strip_suffix('/').unwrap_or(&pattern);
        let segments: Vec<Segment> = trimmed.split('/').map(Segment::parse).collect();

        let last = segments.len() - 1;
        if segments[..last].contains(&Segment::Rest) {
            return Err(RouteError::MisplacedMultiWildcard(pattern));
        }

        Ok(Self {
            pattern,
            segments,
            methods,
        })
    }

    /// The pattern as written in the rules document.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Allowed method tokens, `*` included if present.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Whether this rule allows `method` on `path`.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if !self.allows_method(method) {
            return false;
        }

        if self.segments.len() == 1 && self.segments[0] == Segment::Rest {
            return true;
        }

        let last = self.segments.len() - 1;
        for (i, part) in path.split('/').enumerate() {
            if i > last {
                return self.segments[last] == Segment::Rest;
            }
            match &self.segments[i] {
                Segment::Rest => return true,
                Segment::One => {}
                Segment::Literal(literal) => {
                    if literal != part {
                        return false;
                    }
                }
            }
        }

        // Path exhausted; unconsumed pattern segments are not checked.
        true
    }

    fn allows_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method || m == WILDCARD_METHOD)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.pattern, self.methods.join(","))
    }
}

/// `*`, or an RFC 9110 token made of uppercase letters, digits and tchar symbols.
fn is_method_token(method: &str) -> bool {
    if method == WILDCARD_METHOD {
        return true;
    }
    !method.is_empty()
        && method.bytes().all(|b| {
            b.is_ascii_uppercase()
                || b.is_ascii_digit()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
                )
        })
}
