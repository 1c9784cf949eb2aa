// Gazette — CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands: init, list, show, delete, purge, serve.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{duration_arg, interval_arg, StoreArgs};

pub use commands::execute;

/// Gazette: dead-man's-switch escrow for encrypted data-encryption keys.
#[derive(Parser, Debug)]
#[command(name = "gazette")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the encrypted store (or verify an existing one opens).
    Init,

    /// List escrowed entries (identifiers and timestamps only).
    List,

    /// Show one entry's version, timestamps and metadata. Key material stays redacted.
    Show {
        /// The password hash identifying the entry.
        password_hash: String,
    },

    /// Securely erase one entry.
    Delete {
        /// The password hash identifying the entry.
        password_hash: String,
    },

    /// Erase every entry not updated within the given age (e.g. "30d", "12h").
    Purge {
        #[arg(long, value_parser = duration_arg)]
        max_age: Duration,
    },

    /// Serve the JSON-RPC gateway on a Unix domain socket.
    Serve {
        /// Socket path (default: $XDG_RUNTIME_DIR/gazette/gazette.sock).
        #[arg(long, env = "GAZETTE_SOCKET")]
        socket: Option<PathBuf>,

        /// Run a background purge of entries older than this age.
        #[arg(long, env = "PURGE_MAX_AGE", value_parser = duration_arg)]
        purge_max_age: Option<Duration>,

        /// How often the background purge runs.
        #[arg(long, env = "PURGE_INTERVAL", value_parser = interval_arg, default_value = "1h")]
        purge_interval: Duration,
    },
}
