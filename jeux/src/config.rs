//! Command-line configuration.
//!
//! The teacher hardcodes its listen port; this crate's CLI surface is
//! grounded instead on the `#[derive(Parser)]` / `#[arg(...)]` style used
//! by the packet inspector in the broader example pack.

use clap::Parser;

/// Jeux: a concurrent, turn-based tic-tac-toe game server.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// TCP port to listen on.
    #[arg(short, long)]
    pub port: u16,

    /// Maximum number of simultaneous connections.
    #[arg(long, default_value_t = 1024)]
    pub max_connections: usize,

    /// Overrides `RUST_LOG` for this process, in `tracing_subscriber`
    /// `EnvFilter` syntax (e.g. `jeux=debug`).
    #[arg(long)]
    pub log_filter: Option<String>,
}
