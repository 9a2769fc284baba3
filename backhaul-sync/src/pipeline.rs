//! Operation entry points: one full backup (push) or restore (pull) from a
//! configuration snapshot.
//!
//! Callers pass a snapshot of the config captured at invocation time; a
//! concurrent reconfiguration does not affect a copy already underway.

use backhaul_core::BackupConfig;

use crate::backend::backend_for;
use crate::error::SyncError;
use crate::local::safety_copy;

/// Copy the source tree to the configured destination.
pub fn push(config: &BackupConfig) -> Result<(), SyncError> {
    tracing::info!(
        source = %config.source.display(),
        kind = %config.dest_kind,
        dest = %config.dest,
        "start copy"
    );
    let result = backend_for(config.dest_kind).push(&config.source, &config.dest);
    tracing::info!("end copy");
    result
}

/// Restore the source tree from the configured destination.
///
/// A safety copy of the current source is written to its `-backup` sibling
/// first; if the restore then fails partway, the pre-pull state can be
/// recovered by hand.
pub fn pull(config: &BackupConfig) -> Result<(), SyncError> {
    let copy = safety_copy(&config.source)?;
    tracing::info!(
        safety_copy = %copy.display(),
        kind = %config.dest_kind,
        dest = %config.dest,
        "start pull"
    );
    let result = backend_for(config.dest_kind).pull(&config.dest, &config.source);
    tracing::info!("end pull");
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use backhaul_core::DestinationKind;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn filesystem_config(source: PathBuf, dest: &std::path::Path) -> BackupConfig {
        BackupConfig {
            source,
            dest_kind: DestinationKind::Filesystem,
            dest: dest.to_string_lossy().into_owned(),
        }
    }

    #[test]
    fn push_copies_source_to_destination() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), "alpha").unwrap();

        push(&filesystem_config(src.path().to_path_buf(), dst.path())).expect("push");

        assert_eq!(
            fs::read_to_string(dst.path().join("a.txt")).unwrap(),
            "alpha"
        );
    }

    #[test]
    fn pull_takes_safety_copy_before_overwriting() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("live");
        let dest = root.path().join("backup-store");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(source.join("doc.txt"), "current").unwrap();
        fs::write(dest.join("doc.txt"), "restored").unwrap();

        pull(&filesystem_config(source.clone(), &dest)).expect("pull");

        // Source now holds the restored content; the safety copy holds what
        // was there before the pull.
        assert_eq!(fs::read_to_string(source.join("doc.txt")).unwrap(), "restored");
        assert_eq!(
            fs::read_to_string(root.path().join("live-backup/doc.txt")).unwrap(),
            "current"
        );
    }

    #[test]
    fn pull_round_trips_when_source_unchanged() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("live");
        let dest = root.path().join("store");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("doc.txt"), "v1").unwrap();

        let config = filesystem_config(source.clone(), &dest);
        push(&config).expect("push");
        pull(&config).expect("pull");
        push(&config).expect("push again");

        assert_eq!(fs::read_to_string(dest.join("doc.txt")).unwrap(), "v1");
    }

    #[test]
    fn webdav_push_with_malformed_uri_errors() {
        let src = TempDir::new().unwrap();
        let config = BackupConfig {
            source: src.path().to_path_buf(),
            dest_kind: DestinationKind::WebDav,
            dest: "not a uri".to_string(),
        };
        let err = push(&config).unwrap_err();
        assert!(matches!(err, SyncError::InvalidUrl { .. }));
    }
}
