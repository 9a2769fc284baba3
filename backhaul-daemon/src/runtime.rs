use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use backhaul_core::{config, BackupConfig};
use backhaul_sync::pipeline;

use crate::error::{io_err, DaemonError};
use crate::paths::{runtime_dir, socket_path, SETTLE_DELAY, THROTTLE_WINDOW};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::throttle::Throttle;
use crate::watch::WatchRegistration;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything the daemon's tasks share.
///
/// The config is swapped wholesale on reconfiguration; backup bodies operate
/// on a snapshot cloned at job start. The watch registration has its own
/// mutex, held only across the remove+add of a re-arm — never across a copy.
pub(crate) struct DaemonState {
    home: PathBuf,
    config: RwLock<BackupConfig>,
    watch: StdMutex<WatchRegistration>,
    throttle: Throttle,
    /// Unix seconds of the last completed backup attempt (success or
    /// failure); 0 when no backup has run yet. Drives status display only.
    last_backup_unix: AtomicU64,
    last_error: StdMutex<Option<String>>,
}

impl DaemonState {
    fn record_error(&self, message: String) {
        let mut last = match self.last_error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last = Some(message);
    }

    fn last_error(&self) -> Option<String> {
        match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Push,
    Pull,
}

struct BackupJob {
    kind: JobKind,
    source: &'static str,
    respond_to: oneshot::Sender<Result<(), String>>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
///
/// Watcher construction failure is the one fatal startup error; everything
/// after that (arm failures, copy failures, watcher delivery errors) is
/// surfaced through status/responses and the daemon keeps running.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let loaded = config::load_at(&home);

    let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();
    let registration = WatchRegistration::new(event_tx)?;

    let state = Arc::new(DaemonState {
        home: home.clone(),
        config: RwLock::new(loaded.clone()),
        watch: StdMutex::new(registration),
        throttle: Throttle::new(THROTTLE_WINDOW),
        last_backup_unix: AtomicU64::new(0),
        last_error: StdMutex::new(None),
    });

    if !loaded.is_unconfigured() {
        if let Err(err) = rearm_watch(&state, &loaded.source) {
            tracing::warn!(error = %err, "failed to arm watcher on startup");
            state.record_error(format!("watch error: {err}"));
        }
    }

    let (backup_tx, backup_rx) = mpsc::channel::<BackupJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        let backup_tx = backup_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(state, backup_tx, event_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = backup_processor_task(state, backup_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        let backup_tx = backup_tx.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(state, backup_tx, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, processor_result, socket_result, signal_result) =
        tokio::join!(watcher_handle, processor_handle, socket_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("backup_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Watcher task
// ---------------------------------------------------------------------------

async fn watcher_task(
    state: Arc<DaemonState>,
    backup_tx: mpsc::Sender<BackupJob>,
    mut event_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    Ok(event) => {
                        tracing::debug!(kind = ?event.kind, "filesystem event");
                        // Every delivered event is one backup request — no
                        // filtering by kind or path.
                        request_backup(&state, &backup_tx, "watcher").await?;
                    }
                    Err(err) => {
                        // Delivery errors are surfaced but never fatal.
                        tracing::warn!(error = %err, "watcher error");
                        state.record_error(format!("watch error: {err}"));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Ask the throttle for admission and, if admitted, run one push job to
/// completion. Returns whether the request was admitted.
async fn request_backup(
    state: &DaemonState,
    backup_tx: &mpsc::Sender<BackupJob>,
    source: &'static str,
) -> Result<bool, DaemonError> {
    if !state.throttle.try_admit(Instant::now()) {
        tracing::debug!(source, "backup request dropped by throttle");
        return Ok(false);
    }

    match enqueue_job(backup_tx, JobKind::Push, source).await? {
        Ok(()) => tracing::info!(source, "backup completed"),
        Err(message) => tracing::error!(source, error = %message, "backup failed"),
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Backup processor task
// ---------------------------------------------------------------------------

async fn backup_processor_task(
    state: Arc<DaemonState>,
    mut backup_rx: mpsc::Receiver<BackupJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = backup_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let outcome = execute_job(&state, job.kind).await;
                if let Err(message) = &outcome {
                    tracing::error!(source = job.source, error = %message, "job failed");
                }
                let _ = job.respond_to.send(outcome);
            }
        }
    }
    Ok(())
}

/// Run one push or pull against a config snapshot taken now.
///
/// Push bodies wait the settle delay first so the triggering burst of
/// filesystem writes can finish. The last-backup timestamp is stamped after
/// every push attempt, success or failure.
async fn execute_job(state: &DaemonState, kind: JobKind) -> Result<(), String> {
    let config = state.config.read().await.clone();
    if config.is_unconfigured() {
        let message = "no source directory configured".to_string();
        state.record_error(message.clone());
        return Err(message);
    }

    if kind == JobKind::Push {
        tokio::time::sleep(SETTLE_DELAY).await;
    }

    let result = tokio::task::spawn_blocking(move || match kind {
        JobKind::Push => pipeline::push(&config),
        JobKind::Pull => pipeline::pull(&config),
    })
    .await
    .map_err(|err| format!("backup task join error: {err}"))?;

    if kind == JobKind::Push {
        state
            .last_backup_unix
            .store(unix_seconds_now(), Ordering::Relaxed);
    }

    result.map_err(|err| {
        let message = err.to_string();
        state.record_error(message.clone());
        message
    })
}

async fn enqueue_job(
    backup_tx: &mpsc::Sender<BackupJob>,
    kind: JobKind,
    source: &'static str,
) -> Result<Result<(), String>, DaemonError> {
    let (tx, rx) = oneshot::channel();
    backup_tx
        .send(BackupJob {
            kind,
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("backup queue"))?;

    rx.await
        .map_err(|_| DaemonError::ChannelClosed("backup response"))
}

// ---------------------------------------------------------------------------
// Reconfiguration
// ---------------------------------------------------------------------------

/// Re-arm the watcher onto `source`. The registration mutex is held only for
/// the remove+add sequence.
fn rearm_watch(state: &DaemonState, source: &Path) -> Result<(), DaemonError> {
    let mut watch = match state.watch.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    watch.rearm(source)
}

/// Apply a `set-paths` request: persist the new config, swap it in, re-arm
/// the watcher. Persisting comes first — a config that failed to save never
/// becomes live.
async fn apply_set_paths(
    state: &DaemonState,
    request: &DaemonRequest,
) -> Result<Value, DaemonError> {
    let (Some(source), Some(dest)) = (request.src.clone(), request.dest.clone()) else {
        return Err(DaemonError::Protocol(
            "set-paths requires src and dest".to_string(),
        ));
    };
    let new_config = BackupConfig {
        source,
        dest_kind: request.dest_kind.unwrap_or_default(),
        dest,
    };

    config::save_at(&state.home, &new_config)?;
    *state.config.write().await = new_config.clone();

    if let Err(err) = rearm_watch(state, &new_config.source) {
        state.record_error(format!("watch error: {err}"));
        return Err(err);
    }

    Ok(json!({
        "source": new_config.source.display().to_string(),
        "dest_kind": new_config.dest_kind.to_string(),
        "dest": new_config.dest,
    }))
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    state: Arc<DaemonState>,
    backup_tx: mpsc::Sender<BackupJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let run = runtime_dir(&state.home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let backup_tx = backup_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, backup_tx, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    state: Arc<DaemonState>,
    backup_tx: mpsc::Sender<BackupJob>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        let response = match cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&state).await),
            "set-paths" => match apply_set_paths(&state, &request).await {
                Ok(data) => DaemonResponse::ok(data),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "push" => {
                if !state.throttle.try_admit(Instant::now()) {
                    DaemonResponse::ok(json!({ "admitted": false }))
                } else {
                    match enqueue_job(&backup_tx, JobKind::Push, "socket").await {
                        Ok(Ok(())) => DaemonResponse::ok(json!({ "admitted": true })),
                        Ok(Err(message)) => DaemonResponse::error(message),
                        Err(err) => DaemonResponse::error(err.to_string()),
                    }
                }
            }
            "pull" => match enqueue_job(&backup_tx, JobKind::Pull, "socket").await {
                Ok(Ok(())) => DaemonResponse::ok(json!({ "restored": true })),
                Ok(Err(message)) => DaemonResponse::error(message),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(state: &DaemonState) -> Value {
    let config = state.config.read().await.clone();
    json!({
        "running": true,
        "source": config.source.display().to_string(),
        "dest_kind": config.dest_kind.to_string(),
        "dest": config.dest,
        "last_backup_at_unix": state.last_backup_unix.load(Ordering::Relaxed),
        "last_error": state.last_error(),
        "socket": socket_path(&state.home).display().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Plumbing
// ---------------------------------------------------------------------------

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use backhaul_core::DestinationKind;
    use tempfile::TempDir;

    fn make_state(home: &Path, initial: BackupConfig) -> Arc<DaemonState> {
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let registration = WatchRegistration::new(event_tx).expect("watcher");
        Arc::new(DaemonState {
            home: home.to_path_buf(),
            config: RwLock::new(initial),
            watch: StdMutex::new(registration),
            throttle: Throttle::new(THROTTLE_WINDOW),
            last_backup_unix: AtomicU64::new(0),
            last_error: StdMutex::new(None),
        })
    }

    fn filesystem_config(source: &Path, dest: &Path) -> BackupConfig {
        BackupConfig {
            source: source.to_path_buf(),
            dest_kind: DestinationKind::Filesystem,
            dest: dest.to_string_lossy().into_owned(),
        }
    }

    #[tokio::test]
    async fn status_payload_before_any_backup() {
        let home = TempDir::new().expect("home");
        let state = make_state(home.path(), BackupConfig::default());

        let payload = build_status_payload(&state).await;

        assert_eq!(payload["running"], json!(true));
        assert_eq!(
            payload["last_backup_at_unix"],
            json!(0u64),
            "should be 0 before any backup"
        );
        assert_eq!(payload["last_error"], Value::Null);
        assert_eq!(payload["dest_kind"], json!("filesystem"));
    }

    #[tokio::test]
    async fn set_paths_persists_swaps_and_arms() {
        let home = TempDir::new().expect("home");
        let source = TempDir::new().expect("source");
        let dest = TempDir::new().expect("dest");
        let state = make_state(home.path(), BackupConfig::default());

        let request = DaemonRequest {
            cmd: "set-paths".to_string(),
            src: Some(source.path().to_path_buf()),
            dest_kind: Some(DestinationKind::Filesystem),
            dest: Some(dest.path().to_string_lossy().into_owned()),
        };
        apply_set_paths(&state, &request).await.expect("set-paths");

        // Persisted to disk.
        let on_disk = config::load_at(home.path());
        assert_eq!(on_disk.source, source.path());
        // Swapped in memory.
        assert_eq!(state.config.read().await.source, source.path());
        // Watcher armed on the new source.
        let watch = state.watch.lock().expect("watch lock");
        assert_eq!(watch.armed(), Some(source.path()));
    }

    #[tokio::test]
    async fn set_paths_without_fields_is_a_protocol_error() {
        let home = TempDir::new().expect("home");
        let state = make_state(home.path(), BackupConfig::default());

        let err = apply_set_paths(&state, &DaemonRequest::bare("set-paths"))
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(_)));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn push_job_copies_and_stamps_timestamp() {
        let home = TempDir::new().expect("home");
        let source = TempDir::new().expect("source");
        let dest = TempDir::new().expect("dest");
        fs::write(source.path().join("a.txt"), "alpha").expect("write");

        let state = make_state(home.path(), filesystem_config(source.path(), dest.path()));
        execute_job(&state, JobKind::Push).await.expect("push job");

        assert_eq!(
            fs::read_to_string(dest.path().join("a.txt")).expect("read"),
            "alpha"
        );
        assert!(
            state.last_backup_unix.load(Ordering::Relaxed) > 0,
            "completed push must stamp the last-backup timestamp"
        );
        assert_eq!(state.last_error(), None);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn failed_push_stamps_timestamp_and_records_error() {
        let home = TempDir::new().expect("home");
        let dest = TempDir::new().expect("dest");
        let missing = home.path().join("does-not-exist");

        let state = make_state(home.path(), filesystem_config(&missing, dest.path()));
        let err = execute_job(&state, JobKind::Push).await.unwrap_err();

        assert!(!err.is_empty());
        assert!(
            state.last_backup_unix.load(Ordering::Relaxed) > 0,
            "a failed attempt still counts as the last backup attempt"
        );
        assert!(state.last_error().is_some());
    }

    #[tokio::test]
    async fn unconfigured_job_is_rejected() {
        let home = TempDir::new().expect("home");
        let state = make_state(home.path(), BackupConfig::default());

        let err = execute_job(&state, JobKind::Push).await.unwrap_err();
        assert!(err.contains("no source"));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn pull_job_takes_safety_copy_and_restores() {
        let home = TempDir::new().expect("home");
        let root = TempDir::new().expect("root");
        let source = root.path().join("live");
        let dest = root.path().join("store");
        fs::create_dir_all(&source).expect("mkdir");
        fs::create_dir_all(&dest).expect("mkdir");
        fs::write(source.join("doc.txt"), "current").expect("write");
        fs::write(dest.join("doc.txt"), "restored").expect("write");

        let state = make_state(home.path(), filesystem_config(&source, &dest));
        execute_job(&state, JobKind::Pull).await.expect("pull job");

        assert_eq!(
            fs::read_to_string(source.join("doc.txt")).expect("read"),
            "restored"
        );
        assert_eq!(
            fs::read_to_string(root.path().join("live-backup/doc.txt")).expect("read"),
            "current"
        );
        assert_eq!(
            state.last_backup_unix.load(Ordering::Relaxed),
            0,
            "pull is a restore, not a backup — it must not stamp the timestamp"
        );
    }
}
