use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "screensweep",
    about = "Sweep screenshots off your desktop, on demand or every day",
    version
)]
pub struct Cli {
    /// Settings file (default: <config dir>/screensweep/settings.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for the matching part of the settings.
#[derive(Args, Clone, Default)]
pub struct MatchArgs {
    /// Directory to sweep instead of the configured one
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// File name prefix to match
    #[arg(long)]
    pub prefix: Option<String>,

    /// Match the prefix regardless of case
    #[arg(long)]
    pub ignore_case: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the files a cleanup would move (never moves anything)
    Preview {
        #[command(flatten)]
        matching: MatchArgs,
    },

    /// Move matching files now (requires --confirm to actually move)
    Clean {
        #[command(flatten)]
        matching: MatchArgs,

        /// Move files into this folder instead of the configured destination
        #[arg(long, conflicts_with = "trash")]
        to_folder: Option<PathBuf>,

        /// Send files to the trash regardless of the configured destination
        #[arg(long)]
        trash: bool,

        /// Actually move files. Without this flag, behaves like preview.
        #[arg(long)]
        confirm: bool,
    },

    /// Show when the next scheduled cleanup happens
    NextRun {
        /// Time of day to compute for, as HH:MM (default: the configured time)
        #[arg(long)]
        at: Option<String>,
    },

    /// Show settings, totals and the schedule
    Status,

    /// Change the schedule and save it
    Set {
        /// Daily cleanup time, as HH:MM
        #[arg(long)]
        at: Option<String>,

        /// Turn the daily cleanup on or off
        #[arg(long)]
        enabled: Option<bool>,

        /// File name prefix to match
        #[arg(long)]
        prefix: Option<String>,

        /// Whether the prefix match is case-sensitive
        #[arg(long)]
        case_sensitive: Option<bool>,

        /// Destination folder; use "trash" to go back to the trash
        #[arg(long)]
        destination: Option<String>,
    },

    /// Stay in the foreground and clean at the scheduled time every day
    Watch,
}
