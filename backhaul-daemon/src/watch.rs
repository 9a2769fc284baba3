//! Single-directory watch registration.
//!
//! The daemon watches exactly one directory — the configured source — and
//! re-arms onto a new directory whenever the source changes. Re-arming is
//! remove-all-then-add, never an incremental patch, and callers serialize
//! through the mutex that owns the registration; the lock covers only the
//! remove+add sequence, never event delivery or a running copy.

use std::path::{Path, PathBuf};

use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::DaemonError;

pub(crate) struct WatchRegistration {
    watcher: RecommendedWatcher,
    armed: Option<PathBuf>,
}

impl WatchRegistration {
    /// Construct the underlying watcher, delivering events and watcher
    /// errors into `event_tx`. Construction failure is fatal to the daemon.
    pub fn new(
        event_tx: mpsc::UnboundedSender<notify::Result<Event>>,
    ) -> Result<Self, DaemonError> {
        let watcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        Ok(Self {
            watcher,
            armed: None,
        })
    }

    /// Drop every existing watch, then arm `path` (top-level only).
    ///
    /// On failure the old watch is already gone — the registration is empty
    /// rather than pointing at a stale directory.
    pub fn rearm(&mut self, path: &Path) -> Result<(), DaemonError> {
        if let Some(previous) = self.armed.take() {
            // A stale watch on a since-deleted directory fails to unwatch;
            // it is gone either way.
            let _ = self.watcher.unwatch(&previous);
        }
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.armed = Some(path.to_path_buf());
        Ok(())
    }

    pub fn armed(&self) -> Option<&Path> {
        self.armed.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_registration() -> (
        WatchRegistration,
        mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WatchRegistration::new(tx).expect("watcher"), rx)
    }

    #[test]
    fn starts_unarmed() {
        let (registration, _rx) = make_registration();
        assert!(registration.armed().is_none());
    }

    #[test]
    fn rearm_replaces_the_armed_path() {
        let (mut registration, _rx) = make_registration();
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();

        registration.rearm(a.path()).expect("arm a");
        assert_eq!(registration.armed(), Some(a.path()));

        registration.rearm(b.path()).expect("arm b");
        assert_eq!(
            registration.armed(),
            Some(b.path()),
            "only the most recent path stays armed"
        );
    }

    #[test]
    fn rearm_on_missing_directory_errors_and_leaves_nothing_armed() {
        let (mut registration, _rx) = make_registration();
        let a = TempDir::new().unwrap();
        registration.rearm(a.path()).expect("arm a");

        let err = registration.rearm(Path::new("/nonexistent/watch/dir"));
        assert!(err.is_err());
        assert!(
            registration.armed().is_none(),
            "failed rearm must not keep the old registration"
        );
    }
}
