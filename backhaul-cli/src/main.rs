//! Backhaul — watch a directory and mirror it to a backup destination.
//!
//! # Usage
//!
//! ```text
//! backhaul paths show
//! backhaul paths set <src> <dest> [--webdav]
//! backhaul push
//! backhaul pull [--yes]
//! backhaul daemon start|stop|status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{backup::PullArgs, daemon::DaemonCommand, paths::PathsCommand};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "backhaul",
    version,
    about = "Watch a directory and mirror it to a local or WebDAV backup destination",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// View or change the backup source and destination.
    Paths {
        #[command(subcommand)]
        command: PathsCommand,
    },

    /// Run one backup of the source to the destination now.
    Push,

    /// Restore the source from the destination (a safety copy of the source
    /// is taken first).
    Pull(PullArgs),

    /// Manage the background watch daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Paths { command } => commands::paths::run(command),
        Commands::Push => commands::backup::push(),
        Commands::Pull(args) => commands::backup::pull(args),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
