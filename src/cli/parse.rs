//! CLI parse: clap types for dbafs. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dbafs CLI - Database-backed filesystem synchronization
#[derive(Parser)]
#[command(name = "dbafs")]
#[command(about = "Track a directory tree in a record store and synchronize it with change sets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory to track
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Record store directory (overrides storage.store_path)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the change set between the record store and the directory
    Diff {
        /// Limit the comparison to these paths
        scope: Vec<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Compute and apply the change set
    Sync {
        /// Limit the synchronization to these paths
        scope: Vec<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List a directory
    Ls {
        /// Directory to list
        #[arg(default_value = "")]
        path: String,
        /// Include everything below the directory
        #[arg(long)]
        deep: bool,
        /// Read metadata from storage only
        #[arg(long)]
        bypass_records: bool,
    },
    /// Print the current path of a tracked uuid
    Resolve {
        uuid: String,
    },
    /// Show the metadata of one path
    Stat {
        path: String,
        /// Synchronize the path before reading its record
        #[arg(long)]
        sync: bool,
    },
}
