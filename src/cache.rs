//! Content-addressed cache of raw model responses.
//!
//! One JSON file per key, named by the SHA-256 of the canonical diff content.
//! Reads past the TTL delete the record. Failures never abort a run: an
//! unusable directory disables the cache and broken records count as misses.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Separator placed between diffs in the canonical content.
const DIFF_SEPARATOR: &str = "\n---\n";

/// On-disk record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub created_at: DateTime<Utc>,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    directory: PathBuf,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    /// Open a cache in `directory` (a leading `~/` is expanded).
    ///
    /// The cache is disabled when `enabled` is false, the TTL is not positive,
    /// or the directory cannot be created.
    pub fn new(directory: &str, ttl_secs: i64, enabled: bool) -> Self {
        let directory = expand_home(directory);
        let mut usable = enabled && ttl_secs > 0;

        if usable {
            if let Err(e) = fs::create_dir_all(&directory) {
                warn!(
                    "Cache directory {} is unusable, caching disabled: {}",
                    directory.display(),
                    e
                );
                usable = false;
            }
        }

        Self {
            directory,
            ttl: Duration::try_seconds(ttl_secs.max(0)).unwrap_or(Duration::MAX),
            enabled: usable,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            directory: PathBuf::new(),
            ttl: Duration::zero(),
            enabled: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Lowercase hex SHA-256 of `content`.
    pub fn key_for(content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        format!("{:x}", digest)
    }

    pub fn entry_path(&self, content: &str) -> PathBuf {
        self.directory.join(format!("{}.json", Self::key_for(content)))
    }

    /// Cached value for `content`, if present and younger than the TTL.
    pub fn get(&self, content: &str) -> Option<String> {
        self.get_at(content, Utc::now())
    }

    fn get_at(&self, content: &str, now: DateTime<Utc>) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(content);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", path.display(), e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
                return None;
            }
        };

        if now.signed_duration_since(entry.created_at) > self.ttl {
            debug!(path = %path.display(), "Cache entry expired");
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove expired cache entry {}: {}", path.display(), e);
            }
            return None;
        }

        if entry.value.trim().is_empty() {
            debug!(path = %path.display(), "Ignoring empty cache entry");
            return None;
        }

        Some(entry.value)
    }

    /// Store `value` for `content`, replacing any existing record.
    ///
    /// Blank values are not stored. Write failures are logged and otherwise
    /// ignored.
    pub fn set(&self, content: &str, value: &str) {
        self.set_at(content, value, Utc::now());
    }

    fn set_at(&self, content: &str, value: &str, created_at: DateTime<Utc>) {
        if !self.enabled || value.trim().is_empty() {
            return;
        }

        let path = self.entry_path(content);
        let entry = CacheEntry {
            created_at,
            value: value.to_string(),
        };
        if let Err(e) = self.write_atomic(&path, &entry) {
            warn!("Failed to write cache entry {}: {}", path.display(), e);
        }
    }

    fn write_atomic(&self, path: &Path, entry: &CacheEntry) -> std::io::Result<()> {
        let json = serde_json::to_string(entry)?;
        let mut tmp = NamedTempFile::new_in(&self.directory)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Order-independent cache content for a set of diffs.
pub fn canonical_diff_content<S: AsRef<str>>(diffs: &[S]) -> String {
    let mut sorted: Vec<&str> = diffs.iter().map(|d| d.as_ref()).collect();
    sorted.sort_unstable();
    sorted.join(DIFF_SEPARATOR)
}

fn expand_home(directory: &str) -> PathBuf {
    if directory == "~" || directory.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
            let rest = directory.trim_start_matches('~').trim_start_matches('/');
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cache_in(dir: &tempfile::TempDir, ttl: i64) -> ResponseCache {
        ResponseCache::new(dir.path().to_str().unwrap(), ttl, true)
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 3600);
        assert!(cache.enabled());

        cache.set("diff content", "feat: cached");
        assert_eq!(cache.get("diff content").as_deref(), Some("feat: cached"));
        assert_eq!(cache.get("other content"), None);
    }

    #[test]
    fn test_set_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 3600);
        cache.set("k", "first");
        cache.set("k", "second");
        assert_eq!(cache.get("k").as_deref(), Some("second"));
    }

    #[test]
    fn test_expired_entry_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 60);
        let created = Utc::now() - Duration::seconds(120);
        cache.set_at("stale", "old", created);

        let path = cache.entry_path("stale");
        assert!(path.exists());
        assert_eq!(cache.get("stale"), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_entry_at_ttl_boundary_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 60);
        let now = Utc::now();
        cache.set_at("edge", "value", now - Duration::seconds(60));
        assert_eq!(cache.get_at("edge", now).as_deref(), Some("value"));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 60);
        std::fs::write(cache.entry_path("broken"), "{not json").unwrap();
        assert_eq!(cache.get("broken"), None);
    }

    #[test]
    fn test_blank_values_are_never_served() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 3600);

        cache.set("k", "  \n");
        assert!(!cache.entry_path("k").exists());

        let entry = CacheEntry {
            created_at: Utc::now(),
            value: String::new(),
        };
        std::fs::write(cache.entry_path("k"), serde_json::to_string(&entry).unwrap()).unwrap();
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, i64::MAX);
        assert!(cache.enabled());

        cache.set_at("old", "value", Utc::now() - Duration::days(365 * 100));
        assert_eq!(cache.get("old").as_deref(), Some("value"));
    }

    #[test]
    fn test_non_positive_ttl_disables() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 0);
        assert!(!cache.enabled());
        cache.set("k", "v");
        assert_eq!(cache.get("k"), None);
        assert!(!cache.entry_path("k").exists());
    }

    #[test]
    fn test_unusable_directory_disables() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let cache = ResponseCache::new(blocker.join("sub").to_str().unwrap(), 60, true);
        assert!(!cache.enabled());
    }

    #[test]
    fn test_key_is_sha256_hex() {
        assert_eq!(
            ResponseCache::key_for(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_canonical_content_is_order_independent() {
        let a = canonical_diff_content(&["+b", "+a", "+c"]);
        let b = canonical_diff_content(&["+c", "+b", "+a"]);
        assert_eq!(a, b);
        assert_eq!(a, "+a\n---\n+b\n---\n+c");
        assert_eq!(ResponseCache::key_for(&a), ResponseCache::key_for(&b));
    }

    #[test]
    #[serial]
    fn test_home_expansion() {
        temp_env::with_var("HOME", Some("/home/tester"), || {
            assert_eq!(
                expand_home("~/.cache/aicommit"),
                PathBuf::from("/home/tester/.cache/aicommit")
            );
            assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        });
    }
}
