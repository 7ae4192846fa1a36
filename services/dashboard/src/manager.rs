//! Registry of all known sessions: discovery from a watched directory,
//! lifecycle transitions, and eviction of old completed runs (spec §4.6).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::lock::is_file_active;
use crate::session::{parse_header, Session, SessionState};
use crate::session_id::SessionId;

const PROGRESS_FILE_PREFIX: &str = "progress-";
const PROGRESS_FILE_SUFFIX: &str = ".txt";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct ManagerConfig {
    pub buffer_capacity: usize,
    pub max_clients: usize,
    pub client_buffer: usize,
    pub max_completed: usize,
    pub poll_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> ManagerConfig {
        ManagerConfig {
            buffer_capacity: 10_000,
            max_clients: 100,
            client_buffer: 256,
            max_completed: 50,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Owns every known [`Session`], keyed by its derived id.
pub struct SessionManager {
    config: ManagerConfig,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(config: ManagerConfig) -> SessionManager {
        SessionManager {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn remove(&self, id: &SessionId) {
        let session = self.sessions.write().await.remove(id);
        if let Some(session) = session {
            session.close();
        }
    }

    pub async fn close_all(&self) {
        let mut sessions = self.sessions.write().await;
        for session in sessions.values() {
            session.close();
        }
        sessions.clear();
    }

    /// Scan `dir` for progress files, creating sessions for any new ones and
    /// kicking off their one-shot cold replay + live tail. Also removes
    /// sessions whose backing file has disappeared (supplemental to spec
    /// §4.6, which only specifies the creation path).
    pub async fn discover(&self, dir: &Path) -> std::io::Result<Vec<SessionId>> {
        let mut found_paths = Vec::new();
        let entries = std::fs::read_dir(dir)?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if is_progress_file(&path) {
                found_paths.push(path);
            }
        }

        let mut discovered = Vec::new();
        for path in &found_paths {
            let id = self.ensure_session(path).await;
            discovered.push(id);
        }

        self.prune_missing(&found_paths).await;
        self.refresh_states().await;
        self.evict_excess_completed().await;

        Ok(discovered)
    }

    async fn ensure_session(&self, path: &Path) -> SessionId {
        let id = SessionId::from_path(path);
        let existing = self.sessions.read().await.get(&id).cloned();
        let session = match existing {
            Some(session) => session,
            None => {
                let session = Arc::new(Session::new(
                    path.to_path_buf(),
                    self.config.buffer_capacity,
                    self.config.max_clients,
                    self.config.client_buffer,
                    self.config.poll_interval,
                ));
                self.sessions.write().await.insert(id.clone(), Arc::clone(&session));
                session
            }
        };

        if session.mark_loaded_if_not() {
            if let Ok(metadata) = parse_header(path) {
                session.set_metadata(metadata);
            }
            let _ = session.start_tailing(true);
        }

        id
    }

    async fn prune_missing(&self, found_paths: &[PathBuf]) {
        let stale: Vec<SessionId> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| !s.path.exists() || !found_paths.iter().any(|p| p == &s.path))
                .map(|s| s.id.clone())
                .collect()
        };
        for id in stale {
            self.remove(&id).await;
        }
    }

    /// Re-probe each session's file lock state, transitioning active
    /// sessions whose writer has exited to completed and stopping their
    /// tail (spec §4.6).
    pub async fn refresh_states(&self) {
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            let active = is_file_active(&session.path);
            match (session.state(), active) {
                (SessionState::Active, false) => {
                    session.set_state(SessionState::Completed);
                    session.stop_tailing();
                }
                (SessionState::Completed, true) => {
                    // A file can be reopened by a new run; resume tailing.
                    session.set_state(SessionState::Active);
                    let _ = session.start_tailing(false);
                }
                _ => {}
            }
        }
    }

    /// Keep at most `max_completed` completed sessions, evicting the ones
    /// with the oldest `StartTime` first (spec §4.6, §8 scenario 6: eviction
    /// is by age of the run, not by id ordering). A session whose header
    /// never parsed a `Started:` line sorts as oldest, so it is evicted
    /// before any session with a known start time.
    async fn evict_excess_completed(&self) {
        let mut sessions = self.sessions.write().await;
        let mut completed: Vec<(SessionId, Option<chrono::DateTime<chrono::Utc>>)> = sessions
            .values()
            .filter(|s| s.state() == SessionState::Completed)
            .map(|s| (s.id.clone(), s.metadata().start_time))
            .collect();
        if completed.len() <= self.config.max_completed {
            return;
        }
        completed.sort_by_key(|(_, start_time)| *start_time);
        let excess = completed.len() - self.config.max_completed;
        for (id, _) in completed.into_iter().take(excess) {
            if let Some(session) = sessions.remove(&id) {
                session.close();
            }
        }
    }
}

fn is_progress_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.starts_with(PROGRESS_FILE_PREFIX) && name.ends_with(PROGRESS_FILE_SUFFIX),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn small_config() -> ManagerConfig {
        ManagerConfig {
            buffer_capacity: 100,
            max_clients: 10,
            client_buffer: 16,
            max_completed: 2,
            poll_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn discover_finds_only_progress_files() {
        let dir = tempdir().unwrap();
        std::fs::File::create(dir.path().join("progress-a.txt")).unwrap();
        std::fs::File::create(dir.path().join("notes.txt")).unwrap();
        std::fs::File::create(dir.path().join("progress-b.txt")).unwrap();

        let manager = SessionManager::new(small_config());
        let ids = manager.discover(dir.path()).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(manager.all().await.len(), 2);
    }

    #[tokio::test]
    async fn rediscovering_the_same_file_does_not_duplicate_the_session() {
        let dir = tempdir().unwrap();
        std::fs::File::create(dir.path().join("progress-a.txt")).unwrap();

        let manager = SessionManager::new(small_config());
        manager.discover(dir.path()).await.unwrap();
        manager.discover(dir.path()).await.unwrap();
        assert_eq!(manager.all().await.len(), 1);
    }

    #[tokio::test]
    async fn removing_the_backing_file_removes_the_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress-a.txt");
        std::fs::File::create(&path).unwrap();

        let manager = SessionManager::new(small_config());
        manager.discover(dir.path()).await.unwrap();
        assert_eq!(manager.all().await.len(), 1);

        std::fs::remove_file(&path).unwrap();
        manager.discover(dir.path()).await.unwrap();
        assert_eq!(manager.all().await.len(), 0);
    }

    #[tokio::test]
    async fn eviction_keeps_the_most_recently_started_completed_sessions() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(small_config()); // max_completed: 2

        let mut paths = Vec::new();
        for (name, started) in [
            ("progress-a.txt", "2026-01-22 10:00:00"),
            ("progress-b.txt", "2026-01-22 10:00:20"),
            ("progress-c.txt", "2026-01-22 10:00:30"),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("Plan: p\nStarted: {started}\n---\n")).unwrap();
            paths.push(path);
        }

        manager.discover(dir.path()).await.unwrap();
        manager.refresh_states().await;
        for session in manager.all().await {
            session.set_state(SessionState::Completed);
        }

        manager.evict_excess_completed().await;
        let remaining: Vec<PathBuf> = manager.all().await.into_iter().map(|s| s.path.clone()).collect();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(&paths[0]), "oldest StartTime should be evicted");
        assert!(remaining.contains(&paths[1]));
        assert!(remaining.contains(&paths[2]));
    }

    #[tokio::test]
    async fn header_metadata_is_parsed_on_first_discovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress-a.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Plan: docs/plan.md\nBranch: main\nMode: full\n---").unwrap();

        let manager = SessionManager::new(small_config());
        let ids = manager.discover(dir.path()).await.unwrap();
        let session = manager.get(&ids[0]).await.unwrap();
        assert_eq!(session.metadata().plan_path.as_deref(), Some("docs/plan.md"));
    }
}
