//! Read-through page cache.
//!
//! Past months of the archive never change, so a page that was fetched once
//! is stored under a hash of its URL and served from disk afterwards. The
//! cache is append-only: an existing entry is never rewritten.

use std::io::Write;
use std::path::PathBuf;

use crate::identity::sha256_hex;

/// Filesystem-safe, fixed-length key for a URL.
pub fn cache_key(url: &str) -> String {
    sha256_hex(url.as_bytes())
}

/// Storage for fetched pages, keyed by [`cache_key`].
pub trait PageCache: Send + Sync {
    fn get(&self, key: &str) -> std::io::Result<Option<String>>;
    fn put(&self, key: &str, content: &str) -> std::io::Result<()>;
}

/// One file per page under a directory.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl PageCache for FileCache {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put(&self, key: &str, content: &str) -> std::io::Result<()> {
        let target = self.path_for(key);
        if target.exists() {
            return Ok(());
        }

        // Write beside the target and rename so readers never see a partial file.
        let tmp = self
            .dir
            .join(format!(".{}.{}.partial", key, std::process::id()));
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &target)
    }
}

/// Cache that stores nothing; every fetch goes to the network.
pub struct NoCache;

impl PageCache for NoCache {
    fn get(&self, _key: &str) -> std::io::Result<Option<String>> {
        Ok(None)
    }

    fn put(&self, _key: &str, _content: &str) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn key_is_stable_and_fixed_length() {
        let a = cache_key("https://example.org/questions-2020-01.html");
        assert_eq!(a, cache_key("https://example.org/questions-2020-01.html"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, cache_key("https://example.org/questions-2020-02.html"));
        // Same digest as record identities, over the URL bytes.
        assert_eq!(a, crate::identity::identify("https://example.org/questions-2020-01.html"));
    }

    #[test]
    fn miss_then_hit() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path().join("pages")).unwrap();
        let key = cache_key("https://example.org/a");

        assert_eq!(cache.get(&key).unwrap(), None);
        cache.put(&key, "<html>a</html>").unwrap();
        assert_eq!(cache.get(&key).unwrap().as_deref(), Some("<html>a</html>"));
    }

    #[test]
    fn existing_entry_is_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path()).unwrap();
        cache.put("k", "first").unwrap();
        cache.put("k", "second").unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn no_partial_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path()).unwrap();
        cache.put("k", "body").unwrap();
        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["k".to_string()]);
    }

    #[test]
    fn no_cache_never_hits() {
        let cache = NoCache;
        cache.put("k", "body").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }
}
