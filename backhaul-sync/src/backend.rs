//! The backend seam: one trait, two implementations.

use std::path::Path;

use backhaul_core::DestinationKind;

use crate::error::SyncError;
use crate::local::LocalBackend;
use crate::webdav::WebDavBackend;

/// A sync backend copies whole trees between the watched source directory
/// and a destination. `dest` stays a string because its interpretation is
/// backend-specific: a directory path for [`LocalBackend`], a URI for
/// [`WebDavBackend`].
///
/// Both directions copy the full tree unconditionally — no diffing, no
/// rollback. The first failure aborts and is returned as-is.
pub trait SyncBackend: Send + Sync {
    /// Copy `source` into `dest`, creating destination directories as needed
    /// and overwriting existing files.
    fn push(&self, source: &Path, dest: &str) -> Result<(), SyncError>;

    /// Copy `dest` back into `source` (the reverse direction). Callers are
    /// expected to have taken a safety copy of `source` first — see
    /// [`crate::pipeline::pull`].
    fn pull(&self, dest: &str, source: &Path) -> Result<(), SyncError>;
}

/// Select the backend for a destination kind.
pub fn backend_for(kind: DestinationKind) -> Box<dyn SyncBackend> {
    match kind {
        DestinationKind::Filesystem => Box::new(LocalBackend),
        DestinationKind::WebDav => Box::new(WebDavBackend),
    }
}
