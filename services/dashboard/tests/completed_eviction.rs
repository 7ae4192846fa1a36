//! With more completed runs than `max_completed`, the oldest (by header
//! `StartTime`) are evicted first and the rest remain queryable (spec §8:
//! completed-run eviction).

use std::path::PathBuf;
use std::time::Duration;

use ralphex_dashboard::manager::{ManagerConfig, SessionManager};
use tempfile::tempdir;

#[tokio::test]
async fn only_the_most_recently_started_completed_sessions_survive() {
    let dir = tempdir().unwrap();
    let manager = SessionManager::new(ManagerConfig {
        buffer_capacity: 100,
        max_clients: 10,
        client_buffer: 16,
        max_completed: 3,
        poll_interval: Duration::from_millis(20),
    });

    // Staggered `Started:` timestamps, oldest first: progress-1 is the
    // oldest run, progress-5 is the newest.
    let runs = [
        ("progress-1.txt", "2026-01-22 09:00:00"),
        ("progress-2.txt", "2026-01-22 09:10:00"),
        ("progress-3.txt", "2026-01-22 09:20:00"),
        ("progress-4.txt", "2026-01-22 09:30:00"),
        ("progress-5.txt", "2026-01-22 09:40:00"),
    ];
    let mut paths = Vec::new();
    for (name, started) in runs {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("Plan: p\nStarted: {started}\n---\n")).unwrap();
        paths.push(path);
    }

    // Files are unlocked, so the very first scan already observes them as
    // completed and evicts down to `max_completed`.
    manager.discover(dir.path()).await.unwrap();

    let remaining: Vec<PathBuf> = manager.all().await.into_iter().map(|s| s.path.clone()).collect();
    assert_eq!(remaining.len(), 3);
    assert!(!remaining.contains(&paths[0]), "oldest run should be evicted");
    assert!(!remaining.contains(&paths[1]), "second-oldest run should be evicted");
    assert!(remaining.contains(&paths[2]));
    assert!(remaining.contains(&paths[3]));
    assert!(remaining.contains(&paths[4]), "newest run should survive");
}
