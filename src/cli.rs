/// CLI argument parsing and command handling

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::utils::{DEFAULT_DUMP_JOBS, DEFAULT_POOL_SIZE};

// Build timestamp injected at compile time
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "pgbulk-cli")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Path to the server list file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub servers_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage stored server connections
    Servers {
        #[command(subcommand)]
        command: ServerCommands,
    },

    /// List databases on a server
    Databases {
        /// Server name from the server list
        server: String,
    },

    /// Back up selected databases into a folder
    Backup {
        /// Server name from the server list
        server: String,

        /// Database to back up (repeat for several)
        #[arg(short = 'd', long = "db", value_name = "NAME")]
        databases: Vec<String>,

        /// Back up every non-template database on the server
        #[arg(long, conflicts_with = "databases")]
        all: bool,

        /// Destination folder for the backup artifacts
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Dump format
        #[arg(long, value_enum, default_value = "custom")]
        format: DumpFormat,

        /// Parallel dump workers (directory format only)
        #[arg(long, default_value_t = DEFAULT_DUMP_JOBS, value_name = "N")]
        dump_jobs: usize,

        /// Concurrent backup processes
        #[arg(short, long, default_value_t = DEFAULT_POOL_SIZE, value_name = "N")]
        jobs: usize,
    },

    /// Restore backup files onto a server
    Restore {
        /// Server name from the server list
        server: String,

        /// Backup artifacts to restore
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Existing database to restore a single file into
        #[arg(short, long, value_name = "NAME")]
        target: Option<String>,

        /// Create the target database with createdb before restoring
        #[arg(long, requires = "target")]
        create_target: bool,

        /// Concurrent restore processes
        #[arg(short, long, default_value_t = DEFAULT_POOL_SIZE, value_name = "N")]
        jobs: usize,
    },
}

#[derive(Subcommand)]
pub enum ServerCommands {
    /// List configured servers
    List,

    /// Add or replace a server entry
    Add {
        /// Name to store the server under
        name: String,

        #[arg(long)]
        host: String,

        #[arg(long, default_value_t = 5432)]
        port: u16,

        #[arg(long)]
        user: String,

        #[arg(long)]
        password: String,
    },

    /// Remove a server entry
    Remove {
        /// Name of the server to remove
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DumpFormat {
    /// Single compressed archive per database
    Custom,
    /// Directory-format dump, dumped with parallel workers
    Dir,
}
