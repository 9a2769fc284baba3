//! Backhaul core library — backup configuration model, persistence, errors.
//!
//! Public API surface:
//! - [`types`] — [`BackupConfig`] and [`DestinationKind`]
//! - [`error`] — [`ConfigError`]
//! - [`config`] — load / save / path helpers

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{BackupConfig, DestinationKind};
