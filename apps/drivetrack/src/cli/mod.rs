//! # drivetrack CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - List drives, or show one drive's stats and stage readiness
//! - `init` - Initialize a new database
//! - `seed` - Import a snapshot (JSON or binary)
//! - `export` - Export every record to a snapshot file
//! - `allot` - Run bulk mentor allotment for a drive
//! - `assign` / `unassign` - Manual mentor assignment
//! - `progress` / `regress` - Move a drive one stage
//! - `remaining` - Students of a drive in no group
//! - `auto-group` - Group the remaining students of a drive

mod commands;

use crate::config::{Backend, Config};
use clap::{Parser, Subcommand};
use drivetrack_core::TrackError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// drivetrack - academic project drive tracker
///
/// Mentor allotment and stage progression for project drives.
#[derive(Parser, Debug)]
#[command(name = "drivetrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a drivetrack.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database (overrides [storage] database)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend (overrides [storage] backend)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides [server] host)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List drives, or show one drive in detail
    Status {
        /// Drive ID
        #[arg(short, long)]
        drive: Option<String>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Import drives, groups, synopses and submissions from a snapshot
    Seed {
        /// Snapshot file (JSON or binary)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Export every record to a snapshot file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (json, binary)
        #[arg(short = 't', long, default_value = "json")]
        format: String,
    },

    /// Allot mentors to every unassigned group of a drive
    Allot {
        /// Drive ID
        #[arg(short, long)]
        drive: String,

        /// Admin recorded as the assigner
        #[arg(short, long, default_value = "admin")]
        admin: String,
    },

    /// Assign a mentor to a group by hand
    Assign {
        /// Group ID
        #[arg(short, long)]
        group: String,

        /// Mentor ID
        #[arg(short, long)]
        mentor: String,

        /// Admin recorded as the assigner
        #[arg(short, long, default_value = "admin")]
        admin: String,
    },

    /// Remove the mentor of a group
    Unassign {
        /// Group ID
        #[arg(short, long)]
        group: String,
    },

    /// Advance a drive one stage
    Progress {
        /// Drive ID
        #[arg(short, long)]
        drive: String,

        /// Skip the readiness check
        #[arg(short, long)]
        force: bool,
    },

    /// Move a drive one stage back
    Regress {
        /// Drive ID
        #[arg(short, long)]
        drive: String,
    },

    /// List students of a drive that are in no group
    Remaining {
        /// Drive ID
        #[arg(short, long)]
        drive: String,
    },

    /// Put every remaining student of a drive into auto-groups
    AutoGroup {
        /// Drive ID
        #[arg(short, long)]
        drive: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TrackError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.storage.database = database;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    if cli.verbose {
        tracing::info!(
            backend = config.storage.backend.as_str(),
            database = ?config.storage.database,
            "Resolved storage"
        );
    }

    let store = StoreLocation {
        database: config.storage.database.clone(),
        backend: config.storage.backend,
    };
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&store, &config).await
        }
        Some(Commands::Status { drive }) => cmd_status(&store, json_mode, drive.as_deref()),
        Some(Commands::Init { force }) => cmd_init(&store, force),
        Some(Commands::Seed { input }) => cmd_seed(&store, json_mode, &input),
        Some(Commands::Export { output, format }) => cmd_export(&store, &output, &format),
        Some(Commands::Allot { drive, admin }) => cmd_allot(&store, json_mode, &drive, &admin),
        Some(Commands::Assign {
            group,
            mentor,
            admin,
        }) => cmd_assign(&store, json_mode, &group, &mentor, &admin),
        Some(Commands::Unassign { group }) => cmd_unassign(&store, json_mode, &group),
        Some(Commands::Progress { drive, force }) => cmd_progress(&store, json_mode, &drive, force),
        Some(Commands::Regress { drive }) => cmd_regress(&store, json_mode, &drive),
        Some(Commands::Remaining { drive }) => cmd_remaining(&store, json_mode, &drive),
        Some(Commands::AutoGroup { drive }) => cmd_auto_group(&store, json_mode, &drive),
        // No subcommand - list drives by default
        None => cmd_status(&store, json_mode, None),
    }
}
