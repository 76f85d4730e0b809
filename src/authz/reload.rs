//! Reload coordination for the authorization table.
//!
//! Watcher events and SIGHUP both land here. Reloads run one at a time so two
//! triggers racing on the same file cannot install tables out of order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::authz::authorizer::Authorizer;
use crate::authz::loader::{self, ConfigError};
use crate::observability::metrics;

/// Reloads the rules file into a live [`Authorizer`].
#[derive(Debug)]
pub struct Reloader {
    path: PathBuf,
    authorizer: Arc<Authorizer>,
    lock: Mutex<()>,
}

impl Reloader {
    pub fn new(path: impl Into<PathBuf>, authorizer: Arc<Authorizer>) -> Self {
        Self {
            path: path.into(),
            authorizer,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn authorizer(&self) -> &Arc<Authorizer> {
        &self.authorizer
    }

    /// Parse the rules file and install it.
    ///
    /// On failure the live table is left untouched and the error is returned.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        let _guard = self.lock.lock();

        match loader::load_file(&self.path) {
            Ok(table) => {
                let count = table.len();
                self.authorizer.update(table);
                metrics::record_reload(true);
                metrics::record_identities(count);
                tracing::info!(path = %self.path.display(), identities = count, "Authorization rules loaded");
                Ok(count)
            }
            Err(e) => {
                metrics::record_reload(false);
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to reload authorization rules, keeping current rules"
                );
                Err(e)
            }
        }
    }
}
