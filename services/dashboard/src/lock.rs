//! Active/completed detection via advisory exclusive file locking (spec
//! §4.6, §5). A progress-writing process is expected to hold an exclusive
//! lock on its file for as long as it runs; once it exits (or never locked
//! the file), the lock is acquirable.

use std::fs::OpenOptions;
use std::path::Path;

use fs2::FileExt;

/// `true` if some other process currently holds an exclusive lock on
/// `path` — i.e. the run that owns this file is still in progress.
///
/// Probing is itself lock-free from this process's point of view: we try
/// to take the lock non-blockingly and immediately release it on success,
/// so a concurrent `refresh_states` sweep never contends with a writer.
pub fn is_file_active(path: &Path) -> bool {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(_) => return false,
    };

    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = file.unlock();
            false
        }
        Err(_) => true,
    }
}
