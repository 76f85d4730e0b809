//! Live authorization slot with atomic hot swap.
//!
//! # Concurrency
//! ```text
//! reload (single writer)          requests (many readers)
//!     build new table                 load() → snapshot Arc
//!     store(Arc::new(table))   ───▶   match entirely against snapshot
//!                                     drop snapshot
//! ```
//! A request keeps the table it loaded for its whole evaluation, so it sees
//! either the old or the new rules, never a mix. Superseded tables are freed
//! when the last in-flight snapshot is dropped.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::authz::table::{AuthorizationError, AuthorizationTable};
use crate::identity::Identity;

/// Shared authorization service. Clone the surrounding `Arc` to share it.
#[derive(Debug)]
pub struct Authorizer {
    table: ArcSwap<AuthorizationTable>,
}

impl Authorizer {
    /// Create a service with `table` installed as the live snapshot.
    pub fn new(table: AuthorizationTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Evaluate a request against the current snapshot.
    pub fn authorize(&self, identity: &Identity, method: &str, path: &str) -> Result<(), AuthorizationError> {
        let table = self.table.load();
        table.authorize(identity, method, path)
    }

    /// Replace the live snapshot.
    pub fn update(&self, table: AuthorizationTable) {
        self.table.store(Arc::new(table));
    }

    /// Number of distinct identities in the current snapshot.
    pub fn count(&self) -> usize {
        self.table.load().len()
    }

    /// Current snapshot, for callers that need several lookups against one version.
    pub fn snapshot(&self) -> Arc<AuthorizationTable> {
        self.table.load_full()
    }
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new(AuthorizationTable::new())
    }
}
