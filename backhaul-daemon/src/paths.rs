use std::path::{Path, PathBuf};
use std::time::Duration;

/// Window of the leading-edge backup throttle: at most one backup body is
/// admitted per window, measured from the last admission.
pub const THROTTLE_WINDOW: Duration = Duration::from_secs(1);

/// How long an admitted backup waits before copying, so a burst of
/// filesystem writes can finish landing first.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// `<home>/.config/backhaul/` — runtime state (socket), not the config file.
pub fn runtime_dir(home: &Path) -> PathBuf {
    home.join(".config").join("backhaul")
}

pub fn socket_path(home: &Path) -> PathBuf {
    runtime_dir(home).join(DAEMON_SOCKET)
}
