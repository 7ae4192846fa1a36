use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ralphex_dashboard::config::Config;
use ralphex_dashboard::http::{build_router, AppState};
use ralphex_dashboard::manager::{ManagerConfig, SessionManager};
use ralphex_dashboard::watcher::DirectoryWatcher;
use tokio::net::TcpListener;

const GRACEFUL_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);
const STATE_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(Config::parse()).await {
        tracing::error!(%err, "FATAL");
        std::process::exit(1);
    }
}

/// Everything that can fail lives behind this boundary; library modules
/// return their own `thiserror` types, and only here do errors collapse
/// into one reportable chain (spec §7).
async fn run(config: Config) -> anyhow::Result<()> {
    let manager = Arc::new(SessionManager::new(ManagerConfig {
        buffer_capacity: config.buffer_capacity,
        max_clients: config.max_clients,
        client_buffer: config.client_buffer,
        max_completed: config.max_completed,
        poll_interval: Duration::from_millis(config.poll_interval_ms),
    }));

    let mut watchers = Vec::new();
    for dir in &config.watch_dirs {
        let watcher = DirectoryWatcher::start(dir.clone(), Arc::clone(&manager))
            .with_context(|| format!("failed to start directory watcher for {}", dir.display()))?;
        watchers.push(watcher);
    }

    spawn_state_refresh_loop(Arc::clone(&manager));

    let port = config.port;
    let state = Arc::new(AppState { manager, config });
    let router = build_router(state);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind HTTP listener on port {port}"))?;

    tracing::info!(port, "ralphex-dashboard listening");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited with error");

    drop(watchers);
    result
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!(deadline_secs = GRACEFUL_SHUTDOWN_DEADLINE.as_secs(), "shutdown requested");
}

fn spawn_state_refresh_loop(manager: Arc<SessionManager>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATE_REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            manager.refresh_states().await;
        }
    });
}
