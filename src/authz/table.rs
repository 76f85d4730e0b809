//! Authorization table snapshot.
//!
//! # Responsibilities
//! - Map each identity to its ordered rule list
//! - Evaluate one request against that mapping
//!
//! # Design Decisions
//! - Built once (by the loader or a test), then frozen behind an `Arc`
//! - Never mutated after it is installed; reloads build a new table
//! - O(1) identity lookup, O(n) scan of that identity's rules

use std::collections::HashMap;

use thiserror::Error;

use crate::authz::route::Route;
use crate::identity::Identity;

/// Policy denials. The messages are for server-side logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("unknown identity {identity}")]
    UnknownIdentity { identity: Identity },

    #[error("identity {identity} is not authorized for method {method} on path {path}")]
    RouteDenied {
        identity: Identity,
        method: String,
        path: String,
    },
}

/// Identity → ordered rules.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationTable {
    routes: HashMap<Identity, Vec<Route>>,
}

impl AuthorizationTable {
    /// Create an empty table (denies everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rules for an identity, keeping any it already has first.
    pub fn extend_routes(&mut self, identity: Identity, routes: impl IntoIterator<Item = Route>) {
        self.routes.entry(identity).or_default().extend(routes);
    }

    /// Builder-style variant of [`extend_routes`](Self::extend_routes).
    pub fn with_routes(mut self, identity: Identity, routes: impl IntoIterator<Item = Route>) -> Self {
        self.extend_routes(identity, routes);
        self
    }

    /// Rules declared for `identity`, in declaration order.
    pub fn routes_for(&self, identity: &Identity) -> Option<&[Route]> {
        self.routes.get(identity).map(Vec::as_slice)
    }

    /// Number of distinct identities.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.routes.keys()
    }

    /// Check whether `identity` may call `method` on `path`. First matching rule wins.
    pub fn authorize(&self, identity: &Identity, method: &str, path: &str) -> Result<(), AuthorizationError> {
        let routes = self
            .routes
            .get(identity)
            .ok_or_else(|| AuthorizationError::UnknownIdentity {
                identity: identity.clone(),
            })?;

        if routes.iter().any(|route| route.matches(method, path)) {
            return Ok(());
        }

        Err(AuthorizationError::RouteDenied {
            identity: identity.clone(),
            method: method.to_owned(),
            path: path.to_owned(),
        })
    }
}

impl FromIterator<(Identity, Vec<Route>)> for AuthorizationTable {
    fn from_iter<T: IntoIterator<Item = (Identity, Vec<Route>)>>(iter: T) -> Self {
        let mut table = Self::new();
        for (identity, routes) in iter {
            table.extend_routes(identity, routes);
        }
        table
    }
}
