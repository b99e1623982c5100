//! Filesystem cache store.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sluice_core::{CacheKey, CacheStore, CachedResponse};
use tempfile::NamedTempFile;

/// Directory name under the user cache directory.
const CACHE_DIR_NAME: &str = "sluice";

/// [`CacheStore`] keeping one JSON file per key in a directory.
///
/// Writes go to a temporary file renamed into place, so readers never see a
/// partial entry. Concurrent writers of the same key race, the last rename
/// wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsCacheStore {
    dir: PathBuf,
}

impl FsCacheStore {
    /// A store rooted at `dir`, created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$XDG_CACHE_HOME/sluice`, else `~/.cache/sluice`.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_CACHE_HOME")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| home::home_dir().map(|home| home.join(".cache")))
            .map(|dir| dir.join(CACHE_DIR_NAME))
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CacheStore for FsCacheStore {
    fn get(&self, key: &CacheKey) -> io::Result<Option<CachedResponse>> {
        let bytes = match fs::read(self.path(key)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let entry = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(entry))
    }

    fn put(&self, key: &CacheKey, entry: &CachedResponse) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec(entry)?;

        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(&json)?;
        file.persist(self.path(key)).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use sluice_core::{Headers, Method, ResponseContext};

    use super::*;

    fn key(path: &str) -> CacheKey {
        let url = url::Url::parse(&format!("https://example.com{path}")).expect("url");
        CacheKey::new(Method::Get, &url, &Headers::new())
    }

    fn entry(body: &'static str) -> CachedResponse {
        let headers: Headers = [("etag", "\"1\"")].into_iter().collect();
        CachedResponse::new(&ResponseContext::new(200, headers, body), SystemTime::now())
    }

    #[test]
    fn put_then_get() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FsCacheStore::new(dir.path().join("nested"));
        let stored = entry("hello");

        store.put(&key("/a"), &stored).expect("put");

        assert_eq!(store.get(&key("/a")).expect("get"), Some(stored));
        assert_eq!(store.get(&key("/b")).expect("get"), None);
    }

    #[test]
    fn put_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FsCacheStore::new(dir.path());

        store.put(&key("/a"), &entry("one")).expect("put");
        store.put(&key("/a"), &entry("two")).expect("put");

        let cached = store.get(&key("/a")).expect("get").expect("entry");
        let response = cached.to_response().expect("response");
        assert_eq!(response.text().expect("text"), "two");
        assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 1);
    }

    #[test]
    fn corrupt_entry_is_invalid_data() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FsCacheStore::new(dir.path());
        fs::write(store.path(&key("/a")), b"not json").expect("write");

        let err = store.get(&key("/a")).expect_err("corrupt");

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
