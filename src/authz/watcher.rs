//! Rules file watcher for hot reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::authz::reload::Reloader;

/// Watches the rules file and reloads it on change.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by rename are still seen. A mounted config map never touches
/// the rules file: it swaps the `..data` symlink the file resolves through.
/// Those swaps are caught by comparing the resolved path after every event.
pub struct AuthzWatcher {
    reloader: Arc<Reloader>,
}

impl AuthzWatcher {
    pub fn new(reloader: Arc<Reloader>) -> Self {
        Self { reloader }
    }

    /// Start watching. The returned handle stops the watch when dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.reloader.path().to_path_buf();
        let dir = watch_dir(&path);
        let target = RulesTarget::new(&path);
        let reloader = self.reloader;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if target.changed_by(&event) {
                        tracing::info!("Authorization rules change detected, reloading...");
                        // Failures are logged by the reloader.
                        let _ = reloader.reload();
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Authorization rules watcher started");
        Ok(watcher)
    }
}

/// The rules path plus the file it resolved to when last seen.
struct RulesTarget {
    path: PathBuf,
    file_name: Option<OsString>,
    resolved: Mutex<Option<PathBuf>>,
}

impl RulesTarget {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file_name: path.file_name().map(|n| n.to_os_string()),
            resolved: Mutex::new(std::fs::canonicalize(path).ok()),
        }
    }

    /// Whether `event` may have changed the rules the path points at.
    fn changed_by(&self, event: &Event) -> bool {
        let kind = &event.kind;
        if !(kind.is_modify() || kind.is_create() || kind.is_remove()) {
            return false;
        }

        let named = event
            .paths
            .iter()
            .any(|p| p.file_name() == self.file_name.as_deref());

        let resolved = std::fs::canonicalize(&self.path).ok();
        let mut last = self.resolved.lock();
        let retargeted = resolved.is_some() && *last != resolved;
        *last = resolved;

        (named && !kind.is_remove()) || retargeted
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
