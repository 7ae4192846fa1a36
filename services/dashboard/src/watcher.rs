//! Directory watcher that triggers session discovery on filesystem changes,
//! debounced so a burst of writes collapses into one rescan (spec §4.7).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::manager::SessionManager;

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("failed to start watching {path}: {source}")]
    Start {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

pub struct DirectoryWatcher {
    shutdown_tx: watch::Sender<bool>,
    _notify_watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Watch `dir` (non-recursively) and rescan it through `manager` on
    /// every debounced batch of filesystem events, plus once immediately
    /// to pick up files that already exist.
    pub fn start(dir: PathBuf, manager: Arc<SessionManager>) -> Result<DirectoryWatcher, WatcherError> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<NotifyEvent>>();

        let mut notify_watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })
        .map_err(|source| WatcherError::Start {
            path: dir.clone(),
            source,
        })?;

        notify_watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatcherError::Start {
                path: dir.clone(),
                source,
            })?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let watch_dir = dir.clone();
        tokio::spawn(async move {
            if let Err(err) = manager.discover(&watch_dir).await {
                tracing::warn!(%err, path = %watch_dir.display(), "initial directory scan failed");
            }

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    maybe_event = raw_rx.recv() => {
                        let Some(result) = maybe_event else { break };
                        match result {
                            Ok(_) => {
                                drain_and_debounce(&mut raw_rx).await;
                                if let Err(err) = manager.discover(&watch_dir).await {
                                    tracing::warn!(%err, path = %watch_dir.display(), "directory rescan failed");
                                }
                            }
                            Err(err) => {
                                tracing::warn!(%err, path = %watch_dir.display(), "filesystem watch error");
                            }
                        }
                    }
                }
            }
        });

        Ok(DirectoryWatcher {
            shutdown_tx,
            _notify_watcher: notify_watcher,
        })
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Absorb any further events that arrive within the debounce window so a
/// burst of writes to one file triggers a single rescan.
async fn drain_and_debounce(rx: &mut mpsc::UnboundedReceiver<notify::Result<NotifyEvent>>) {
    loop {
        match tokio::time::timeout(DEBOUNCE_WINDOW, rx.recv()).await {
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }
}
