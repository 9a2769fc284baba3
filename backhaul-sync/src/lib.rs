//! Backhaul sync engine — full-tree copy to a local directory or a WebDAV
//! remote.
//!
//! Public API surface:
//! - [`backend`] — the [`SyncBackend`] trait and [`backend_for`] selection
//! - [`local`] — [`LocalBackend`]
//! - [`webdav`] — [`WebDavBackend`]
//! - [`pipeline`] — [`pipeline::push`] / [`pipeline::pull`] operation entry
//!   points working from a [`backhaul_core::BackupConfig`] snapshot
//! - [`error`] — [`SyncError`]

pub mod backend;
pub mod error;
pub mod local;
pub mod pipeline;
pub mod webdav;

pub use backend::{backend_for, SyncBackend};
pub use error::SyncError;
pub use local::LocalBackend;
pub use webdav::WebDavBackend;
