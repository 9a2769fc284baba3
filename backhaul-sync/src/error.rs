//! Error types for backhaul-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from push/pull operations.
///
/// The first error aborts the whole operation; files already copied stay in
/// place. Nothing here is retried.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local filesystem failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failure.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// An entry resolved outside the tree being copied.
    #[error("path {path} is outside the copy root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// The destination string does not parse as a URI at all.
    #[error("invalid destination URI {dest:?}: {source}")]
    InvalidUrl {
        dest: String,
        #[source]
        source: url::ParseError,
    },

    /// The destination parsed but is not a usable WebDAV endpoint
    /// (no host, or a non-HTTP scheme).
    #[error("destination {dest:?} is not a usable WebDAV endpoint")]
    BadEndpoint { dest: String },

    /// Transport-level HTTP failure (connect, TLS, mid-stream).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with an unexpected status.
    #[error("remote {method} {path} failed with status {status}")]
    RemoteStatus {
        method: &'static str,
        path: String,
        status: reqwest::StatusCode,
    },

    /// The remote's directory listing was not parseable multistatus XML.
    #[error("malformed PROPFIND response: {0}")]
    Multistatus(#[from] quick_xml::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
