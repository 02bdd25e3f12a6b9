//! CLI command definitions and dispatch for the `roompurged` binary.
//!
//! `serve` runs the long-lived process; the other commands are one-shot
//! operator tools against the same data directory or a running server.

pub mod forget;
pub mod purge;
pub mod serve;
pub mod status;

use clap::{Parser, Subcommand};

/// Room forget and purge coordination service.
#[derive(Parser)]
#[command(name = "roompurged", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the internal API, the purge consumer and the missed-purge sweep.
    Serve {
        /// Listen address (overrides `internal_api.listen`).
        #[arg(long)]
        listen: Option<String>,
    },

    /// Forget a room on behalf of a user through a running server.
    Forget {
        /// Full user ID, e.g. `@alice:example.org`.
        #[arg(long)]
        user: String,

        /// Full room ID, e.g. `!abc:example.org`.
        #[arg(long)]
        room: String,
    },

    /// Publish a room-scoped purge without checking membership (durable bus only).
    Purge {
        /// Full room ID, e.g. `!abc:example.org`.
        #[arg(long)]
        room: String,
    },

    /// Show rooms awaiting a purge and the purge consumer backlog.
    Status,
}

/// Log filter directive for the given flags, or `None` to use the config.
pub fn verbosity_directive(quiet: bool, verbose: u8) -> Option<&'static str> {
    match verbose {
        0 if quiet => Some("error"),
        0 => None,
        1 => Some("info,roompurged=debug,roompurge_core=debug,roompurge_infra=debug"),
        _ => Some("trace"),
    }
}
