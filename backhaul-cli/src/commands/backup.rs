//! `backhaul push` / `backhaul pull` — one-shot backup and restore.
//!
//! Both prefer a running daemon so its last-backup bookkeeping stays
//! accurate; without one they invoke the sync engine in-process on the
//! config file's current contents.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use clap::Args;

use backhaul_core::config;
use backhaul_daemon::{request_pull, request_push, DaemonError};
use backhaul_sync::pipeline;

pub fn push() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match request_push(&home) {
        Ok(data) => {
            if data["admitted"] == serde_json::json!(false) {
                println!("a backup just ran; this request was dropped by the throttle");
            } else {
                println!("backup completed");
            }
            Ok(())
        }
        Err(DaemonError::DaemonNotRunning { .. }) => {
            let loaded = config::load_at(&home);
            if loaded.is_unconfigured() {
                bail!("no backup paths configured; run `backhaul paths set` first");
            }
            pipeline::push(&loaded).context("backup failed")?;
            println!("backup completed");
            Ok(())
        }
        Err(err) => Err(err).context("backup failed"),
    }
}

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Skip the confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

pub fn pull(args: PullArgs) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    if !args.yes && !confirm("Overwrite the source from the backup destination?")? {
        println!("aborted");
        return Ok(());
    }

    match request_pull(&home) {
        Ok(_) => {
            println!("restore completed (safety copy of the source kept alongside it)");
            Ok(())
        }
        Err(DaemonError::DaemonNotRunning { .. }) => {
            let loaded = config::load_at(&home);
            if loaded.is_unconfigured() {
                bail!("no backup paths configured; run `backhaul paths set` first");
            }
            pipeline::pull(&loaded).context("restore failed")?;
            println!("restore completed (safety copy of the source kept alongside it)");
            Ok(())
        }
        Err(err) => Err(err).context("restore failed"),
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush().context("flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
