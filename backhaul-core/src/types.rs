//! Domain types for the backup configuration.
//!
//! The source directory is a `PathBuf`; the destination stays a `String`
//! because its meaning depends on [`DestinationKind`] — a directory path for
//! filesystem backups, a URI for WebDAV backups.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Destination kind
// ---------------------------------------------------------------------------

/// Which sync backend the destination string is interpreted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// `dest` is a local directory path.
    #[default]
    Filesystem,
    /// `dest` is a WebDAV URI, optionally embedding `user:pass@` credentials.
    WebDav,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::Filesystem => write!(f, "filesystem"),
            DestinationKind::WebDav => write!(f, "webdav"),
        }
    }
}

// ---------------------------------------------------------------------------
// Backup configuration
// ---------------------------------------------------------------------------

/// The process-wide backup configuration.
///
/// Wire format is the `{Src, DestType, Dest}` JSON object; `DestType` is
/// optional on disk and defaults to a filesystem destination so two-field
/// config files from older installs keep parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackupConfig {
    /// Directory being watched and backed up.
    #[serde(rename = "Src")]
    pub source: PathBuf,

    /// How to interpret `dest`.
    #[serde(rename = "DestType", default)]
    pub dest_kind: DestinationKind,

    /// Backup target — a directory path or a WebDAV URI, per `dest_kind`.
    #[serde(rename = "Dest")]
    pub dest: String,
}

impl BackupConfig {
    /// True when no source has been configured yet (first run).
    pub fn is_unconfigured(&self) -> bool {
        self.source.as_os_str().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
