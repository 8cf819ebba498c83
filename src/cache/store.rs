//! Flat-directory cache file store.
//!
//! One regular file per cached artifact, named by its cache key, directly
//! under the cache root. In-flight downloads live under a `.tmp` suffix
//! and are renamed into place once complete.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::Result;

/// Suffix for provisional files while a download is in flight.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Filesystem store for cached artifacts.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the cache root if it does not exist.
    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Final path for a cache key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Provisional path used while downloading.
    pub fn temp_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}{TEMP_SUFFIX}"))
    }

    /// Liveness probe for the fast path: the entry counts as cached only if
    /// it exists, is non-empty, and can actually be opened for reading.
    /// A zero-length or unreadable entry is unlinked and treated as a miss.
    pub async fn probe(&self, key: &str) -> Option<u64> {
        let path = self.path_for(key);
        let meta = fs::metadata(&path).await.ok()?;
        if !meta.is_file() {
            return None;
        }
        if meta.len() == 0 {
            tracing::warn!(key, "zero-length cache entry, removing");
            let _ = fs::remove_file(&path).await;
            return None;
        }
        match fs::File::open(&path).await {
            Ok(_) => Some(meta.len()),
            Err(e) => {
                tracing::warn!(key, error = %e, "unreadable cache entry, removing");
                let _ = fs::remove_file(&path).await;
                None
            }
        }
    }

    /// List `(file_name, size)` for every regular file under the root.
    /// The layout is flat, so no recursion is needed. `.tmp` leftovers
    /// count toward directory size.
    pub async fn list_files(&self) -> Result<Vec<(String, u64)>> {
        let mut out = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                out.push((name, meta.len()));
            }
        }
        Ok(out)
    }

    /// Delete every file whose name matches `pattern` (shell-style `*`/`?`
    /// wildcards, rooted at the cache directory). Returns the deleted
    /// file names.
    pub async fn purge_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !wildcard_match(pattern, &name) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => {
                    tracing::info!(file = %name, "purged cache file");
                    deleted.push(name);
                }
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "failed to purge cache file");
                }
            }
        }
        Ok(deleted)
    }
}

/// Shell-style wildcard match: `*` matches any run of characters, `?`
/// matches exactly one. Everything else is literal.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    // Iterative backtracking over the last `*` seen.
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((spi, sni)) = star {
            pi = spi + 1;
            ni = sni + 1;
            star = Some((spi, sni + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_file(name: &str, content: &[u8]) -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        std::fs::write(store.path_for(name), content).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_probe_hit() {
        let (_dir, store) = store_with_file("foo-1.0.tgz", b"payload");
        assert_eq!(store.probe("foo-1.0.tgz").await, Some(7));
    }

    #[tokio::test]
    async fn test_probe_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        assert_eq!(store.probe("absent.tgz").await, None);
    }

    #[tokio::test]
    async fn test_probe_removes_zero_length_entry() {
        let (_dir, store) = store_with_file("empty.gem", b"");
        assert_eq!(store.probe("empty.gem").await, None);
        assert!(!store.path_for("empty.gem").exists());
    }

    #[tokio::test]
    async fn test_list_files() {
        let (_dir, store) = store_with_file("a.tgz", b"aa");
        std::fs::write(store.path_for("b.tgz"), b"bbbb").unwrap();

        let mut files = store.list_files().await.unwrap();
        files.sort();
        assert_eq!(files, vec![("a.tgz".into(), 2), ("b.tgz".into(), 4)]);
    }

    #[tokio::test]
    async fn test_purge_matching_exact_name() {
        let (_dir, store) = store_with_file("foo-1.0.tgz", b"x");
        let deleted = store.purge_matching("foo-1.0.tgz").await.unwrap();
        assert_eq!(deleted, vec!["foo-1.0.tgz".to_string()]);
        assert!(!store.path_for("foo-1.0.tgz").exists());
    }

    #[tokio::test]
    async fn test_purge_matching_wildcard() {
        let (_dir, store) = store_with_file("foo-1.0.tgz", b"x");
        std::fs::write(store.path_for("foo-2.0.tgz"), b"y").unwrap();
        std::fs::write(store.path_for("bar-1.0.tgz"), b"z").unwrap();

        let mut deleted = store.purge_matching("foo-*.tgz").await.unwrap();
        deleted.sort();
        assert_eq!(
            deleted,
            vec!["foo-1.0.tgz".to_string(), "foo-2.0.tgz".to_string()]
        );
        assert!(store.path_for("bar-1.0.tgz").exists());
    }

    #[test]
    fn test_wildcard_match_literals() {
        assert!(wildcard_match("rails-7.1.0.gem", "rails-7.1.0.gem"));
        assert!(!wildcard_match("rails-7.1.0.gem", "rails-7.1.1.gem"));
    }

    #[test]
    fn test_wildcard_match_star() {
        assert!(wildcard_match("rails-*.gem", "rails-7.1.0.gem"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*.tgz", "lodash-4.17.21.tgz"));
        assert!(!wildcard_match("*.tgz", "rails-7.1.0.gem"));
    }

    #[test]
    fn test_wildcard_match_question_mark() {
        assert!(wildcard_match("foo-?.0.tgz", "foo-1.0.tgz"));
        assert!(!wildcard_match("foo-?.0.tgz", "foo-10.0.tgz"));
    }

    #[test]
    fn test_wildcard_match_empty() {
        assert!(wildcard_match("", ""));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("?", ""));
    }
}
