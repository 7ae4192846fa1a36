//! CLI / environment configuration (spec §6).

use std::path::PathBuf;

use clap::Parser;

const DEFAULT_BUFFER_CAPACITY: usize = 10_000;
const DEFAULT_MAX_CLIENTS: usize = 100;
const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
const DEFAULT_MAX_COMPLETED: usize = 50;

/// Ralphex Dashboard: watches directories of progress files and serves them
/// live over SSE.
#[derive(Debug, Parser)]
#[command(name = "ralphex-dashboard", version, about)]
pub struct Config {
    /// HTTP listen port.
    #[arg(long, env = "RALPHEX_PORT", default_value_t = 4173)]
    pub port: u16,

    /// Directory to watch for progress files. Repeat to watch multiple
    /// directories; multi-session mode is enabled whenever this is non-empty.
    #[arg(long = "watch", env = "RALPHEX_WATCH")]
    pub watch_dirs: Vec<PathBuf>,

    /// Per-session replay buffer capacity (events).
    #[arg(long, env = "RALPHEX_BUFFER_CAPACITY", default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,

    /// Maximum concurrent SSE subscribers per session.
    #[arg(long, env = "RALPHEX_MAX_CLIENTS", default_value_t = DEFAULT_MAX_CLIENTS)]
    pub max_clients: usize,

    /// Per-subscriber SSE send buffer (events held before dropping).
    #[arg(long, env = "RALPHEX_CLIENT_BUFFER", default_value_t = 256)]
    pub client_buffer: usize,

    /// Tailer poll interval in milliseconds (fallback when no filesystem
    /// notification arrives first).
    #[arg(long, env = "RALPHEX_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Maximum number of completed sessions retained per watch directory.
    #[arg(long, env = "RALPHEX_MAX_COMPLETED", default_value_t = DEFAULT_MAX_COMPLETED)]
    pub max_completed: usize,

    /// Disable ANSI color in the wrapped file logger's console mirror.
    /// Affects only the reference `FileLogger`, never the core pipeline.
    #[arg(long, env = "RALPHEX_NO_COLOR")]
    pub no_color: bool,
}

impl Config {
    pub fn multi_session(&self) -> bool {
        !self.watch_dirs.is_empty()
    }
}
