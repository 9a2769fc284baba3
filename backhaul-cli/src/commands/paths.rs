//! `backhaul paths` — view or change the backup source and destination.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use backhaul_core::{config, BackupConfig, DestinationKind};
use backhaul_daemon::{request_set_paths, request_status, DaemonError};

#[derive(Subcommand, Debug)]
pub enum PathsCommand {
    /// Print the configured source and destination.
    Show,
    /// Set the source directory and backup destination.
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Directory to watch and back up.
    pub src: PathBuf,

    /// Backup destination: a directory path, or a WebDAV URI with `--webdav`.
    pub dest: String,

    /// Treat the destination as a WebDAV URI instead of a directory path.
    #[arg(long)]
    pub webdav: bool,
}

pub fn run(command: PathsCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        PathsCommand::Show => {
            // Prefer the daemon's view, which includes the last backup time.
            match request_status(&home) {
                Ok(status) => {
                    println!("source:      {}", status["source"].as_str().unwrap_or(""));
                    println!(
                        "destination: {} ({})",
                        status["dest"].as_str().unwrap_or(""),
                        status["dest_kind"].as_str().unwrap_or("")
                    );
                    let last = status["last_backup_at_unix"].as_u64().unwrap_or(0);
                    if last == 0 {
                        println!("last backup: never");
                    } else {
                        println!("last backup: {last} (unix)");
                    }
                    if let Some(error) = status["last_error"].as_str() {
                        println!("last error:  {error}");
                    }
                }
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    let loaded = config::load_at(&home);
                    if loaded.is_unconfigured() {
                        println!("no backup paths configured");
                    } else {
                        println!("source:      {}", loaded.source.display());
                        println!("destination: {} ({})", loaded.dest, loaded.dest_kind);
                    }
                }
                Err(err) => return Err(err).context("failed to query daemon status"),
            }
        }
        PathsCommand::Set(args) => {
            let dest_kind = if args.webdav {
                DestinationKind::WebDav
            } else {
                DestinationKind::Filesystem
            };

            // A running daemon persists the config itself and re-arms its
            // watcher; without one, write the config file directly.
            match request_set_paths(&home, args.src.clone(), dest_kind, args.dest.clone()) {
                Ok(_) => {
                    println!("paths updated; daemon re-armed on {}", args.src.display());
                }
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    let new_config = BackupConfig {
                        source: args.src.clone(),
                        dest_kind,
                        dest: args.dest.clone(),
                    };
                    config::save_at(&home, &new_config).context("failed to save config")?;
                    println!("paths saved (daemon not running)");
                }
                Err(err) => return Err(err).context("failed to update paths"),
            }
        }
    }

    Ok(())
}
