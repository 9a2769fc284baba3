//! Config file persistence.
//!
//! # Storage layout
//!
//! ```text
//! <home>/.config/AutoBackup.json   (mode 0600, overwritten wholesale on save)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.
//!
//! Loading is best-effort by design: a missing home directory, an unreadable
//! file, or malformed JSON all yield the zero-value config so a first run
//! starts cleanly with nothing configured. Only `save` surfaces errors.

use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::BackupConfig;

pub const CONFIG_FILE_NAME: &str = "AutoBackup.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.config/` — pure, no I/O.
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".config")
}

/// `<home>/.config/AutoBackup.json` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join(CONFIG_FILE_NAME)
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load the config from `<home>/.config/AutoBackup.json`.
///
/// Never fails: any read or parse problem falls back to `BackupConfig::default()`.
pub fn load_at(home: &Path) -> BackupConfig {
    let path = config_path_at(home);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(_) => return BackupConfig::default(),
    };
    serde_json::from_str(&contents).unwrap_or_default()
}

/// `load_at` convenience wrapper. A missing home directory also falls back
/// to the zero-value config.
pub fn load() -> BackupConfig {
    match dirs::home_dir() {
        Some(home) => load_at(&home),
        None => BackupConfig::default(),
    }
}

// ---------------------------------------------------------------------------
// Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config to `<home>/.config/AutoBackup.json`.
///
/// Creates the config directory if absent. Write flow: serialize →
/// `.json.tmp` sibling → `chmod 0600` → `rename`. The previous file is
/// replaced entirely — no merge.
pub fn save_at(home: &Path, config: &BackupConfig) -> Result<(), ConfigError> {
    let dir = config_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    let path = config_path_at(home);
    let tmp = path.with_file_name(format!("{CONFIG_FILE_NAME}.tmp"));

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &BackupConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DestinationKind;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    fn sample() -> BackupConfig {
        BackupConfig {
            source: PathBuf::from("/data"),
            dest_kind: DestinationKind::Filesystem,
            dest: "/backup".to_string(),
        }
    }

    #[test]
    fn config_path_is_correct() {
        let home = make_home();
        let path = config_path_at(home.path());
        assert!(path.ends_with(".config/AutoBackup.json"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let home = make_home();
        save_at(home.path(), &sample()).expect("save");
        let loaded = load_at(home.path());
        assert_eq!(loaded, sample());
    }

    #[test]
    fn load_missing_file_yields_default() {
        let home = make_home();
        assert_eq!(load_at(home.path()), BackupConfig::default());
    }

    #[test]
    fn load_malformed_file_yields_default() {
        let home = make_home();
        let dir = config_dir_at(home.path());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(config_path_at(home.path()), "{not json").unwrap();
        assert_eq!(load_at(home.path()), BackupConfig::default());
    }

    #[test]
    fn save_creates_config_dir() {
        let home = make_home();
        assert!(!config_dir_at(home.path()).exists());
        save_at(home.path(), &sample()).expect("save");
        assert!(config_path_at(home.path()).exists());
    }

    #[test]
    fn save_overwrites_previous_file() {
        let home = make_home();
        save_at(home.path(), &sample()).expect("first save");

        let updated = BackupConfig {
            source: PathBuf::from("/other"),
            dest_kind: DestinationKind::WebDav,
            dest: "https://dav.example.com/b".to_string(),
        };
        save_at(home.path(), &updated).expect("second save");
        assert_eq!(load_at(home.path()), updated);
    }

    #[test]
    fn atomic_save_cleans_up_tmp() {
        let home = make_home();
        save_at(home.path(), &sample()).expect("save");
        let tmp = config_path_at(home.path()).with_file_name("AutoBackup.json.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    #[cfg(unix)]
    fn saved_file_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let home = make_home();
        save_at(home.path(), &sample()).expect("save");
        let mode = std::fs::metadata(config_path_at(home.path()))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }
}
