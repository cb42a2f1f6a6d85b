use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use journal_core::models::Resolution;

#[derive(Parser)]
#[command(name = "journal")]
#[command(about = "Offline-first journal with multi-device sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the remote sync config (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a new entry
    #[command(alias = "new")]
    Add {
        /// Entry text
        text: Vec<String>,
        /// Where the entry was written
        #[arg(long)]
        location: Option<String>,
        /// Image reference to attach (repeatable)
        #[arg(long = "image", value_name = "REF")]
        images: Vec<String>,
        /// Mark the entry
        #[arg(long)]
        marked: bool,
    },
    /// List recent entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the text of an entry
    Edit {
        /// Entry ID or unique ID prefix
        id: String,
        /// New entry text
        text: Vec<String>,
    },
    /// Mark or unmark an entry
    Mark {
        /// Entry ID or unique ID prefix
        id: String,
        /// Clear the mark instead of setting it
        #[arg(long)]
        unmark: bool,
    },
    /// Delete an entry
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Sync with the remote service (one pass when no subcommand is given)
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Show or change the sync policy
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show last sync time, device id and pending changes
    Status,
    /// List entries waiting for a conflict decision
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pick a side for a conflicted entry
    Resolve {
        /// Entry ID or unique ID prefix
        id: String,
        /// Which version to keep
        #[arg(long, value_enum)]
        keep: KeepSide,
    },
    /// Run the background scheduler until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the sync policy and remote config
    Show,
    /// Update the sync policy
    Set {
        /// Enable or disable sync
        #[arg(long)]
        enabled: Option<bool>,
        /// Minutes between scheduled passes
        #[arg(long)]
        interval_minutes: Option<u32>,
        /// Only sync on Wi-Fi
        #[arg(long)]
        wifi_only: Option<bool>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KeepSide {
    Local,
    Remote,
}

impl From<KeepSide> for Resolution {
    fn from(side: KeepSide) -> Self {
        match side {
            KeepSide::Local => Self::KeepLocal,
            KeepSide::Remote => Self::KeepRemote,
        }
    }
}
