//! Stable, collision-resistant session identifiers derived from a progress
//! file's absolute path (spec §6: "a valid scheme is
//! `<base-without-prefix-or-extension>-<16-hex-digest-of-absolute-path>`").

use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A session identifier, safe to use as a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Derive an id from a progress file's absolute path. Same path always
    /// yields the same id; distinct paths yield distinct ids with
    /// overwhelming probability.
    pub fn from_path(path: &Path) -> SessionId {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("session");
        let slug = stem.strip_prefix("progress-").unwrap_or(stem);
        let digest = fnv1a_64(path.to_string_lossy().as_bytes());
        SessionId(format!("{slug}-{digest:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SessionId(s.to_string()))
    }
}

/// A small, dependency-free 64-bit FNV-1a hash. Not cryptographic; used only
/// to distinguish distinct filesystem paths in a URL-safe id. Inline rather
/// than pulled from the `fnv` crate: nothing in this workspace's dependency
/// tree needs a `Hasher` impl for a `HashMap`, only a one-shot digest, so
/// there is no real use for the crate's `FnvHasher` surface here.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_yields_same_id() {
        let p = Path::new("/tmp/progress-foo.txt");
        assert_eq!(SessionId::from_path(p), SessionId::from_path(p));
    }

    #[test]
    fn different_paths_yield_different_ids() {
        let a = SessionId::from_path(Path::new("/tmp/progress-foo.txt"));
        let b = SessionId::from_path(Path::new("/tmp/progress-bar.txt"));
        assert_ne!(a, b);
    }

    #[test]
    fn id_strips_progress_prefix_and_extension() {
        let id = SessionId::from_path(Path::new("/tmp/progress-my-run.txt"));
        assert!(id.as_str().starts_with("my-run-"));
    }

    #[test]
    fn id_contains_no_path_separators() {
        let id = SessionId::from_path(Path::new("/a/b/c/progress-x.txt"));
        assert!(!id.as_str().contains('/'));
    }
}
