//! Error types for backhaul-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from config persistence.
///
/// Note that [`crate::config::load_at`] never returns these — a load failure
/// falls back to the zero-value config. Only `save` surfaces errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the path that failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error on save.
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `dirs::home_dir()` returned `None` — cannot locate the config directory.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
