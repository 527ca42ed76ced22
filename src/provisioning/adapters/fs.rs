//! Filesystem-backed artifact cache.

use crate::provisioning::ports::{ArtifactCache, ProvisioningError, ProvisioningResult};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, Url, header::LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::{Arc, LazyLock, Mutex, PoisonError, Weak};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

const INDEX_FILE: &str = "index.json";

static OPEN_CACHES: LazyLock<Mutex<HashMap<Utf8PathBuf, Weak<CacheInner>>>> =
    LazyLock::new(Mutex::default);

/// Artifact cache storing one file per url under a root directory.
///
/// Opening the same root twice yields the same instance, so every
/// concurrent fetch of a url in this process goes through one lock. The
/// url to file mapping is persisted as `index.json` in the root.
#[derive(Debug, Clone)]
pub struct FsArtifactCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    root: Utf8PathBuf,
    dir: Dir,
    client: Client,
    index: Mutex<CacheIndex>,
    fetches: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: BTreeMap<String, String>,
}

impl FsArtifactCache {
    /// Opens the cache rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Storage`] when the directory cannot be
    /// created or opened, or the HTTP client cannot be initialised.
    pub fn open(root: impl AsRef<Utf8Path>) -> ProvisioningResult<Self> {
        Dir::create_ambient_dir_all(root.as_ref(), ambient_authority())
            .map_err(ProvisioningError::storage)?;
        let canonical = root
            .as_ref()
            .canonicalize_utf8()
            .map_err(ProvisioningError::storage)?;

        let mut open_caches = OPEN_CACHES.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(inner) = open_caches.get(&canonical).and_then(Weak::upgrade) {
            return Ok(Self { inner });
        }

        let dir = Dir::open_ambient_dir(&canonical, ambient_authority())
            .map_err(ProvisioningError::storage)?;
        let index = load_index(&dir, &canonical);
        let client = Client::builder()
            .user_agent(concat!("stagehand/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ProvisioningError::storage(io::Error::other(err)))?;

        let inner = Arc::new(CacheInner {
            root: canonical.clone(),
            dir,
            client,
            index: Mutex::new(index),
            fetches: Mutex::default(),
        });
        open_caches.insert(canonical, Arc::downgrade(&inner));
        Ok(Self { inner })
    }

    /// Returns the canonical cache root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.inner.root
    }

    /// Returns whether `other` shares this instance's state.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[async_trait]
impl ArtifactCache for FsArtifactCache {
    async fn fetch_or_reuse(&self, url: &str) -> ProvisioningResult<Utf8PathBuf> {
        let parsed = parse_url(url)?;
        let slot = self.inner.fetch_slot(url);
        let _fetching = slot.lock.lock().await;

        let file_name = file_name_for(url);
        let path = self.inner.root.join(&file_name);
        let local = self.inner.local_modified(&file_name)?;
        if let Some(modified) = local
            && !self.inner.is_outdated(&parsed, modified).await
        {
            debug!(url, path = %path, "reusing cached artifact");
            self.inner.record(url, &file_name)?;
            return Ok(path);
        }

        match self.inner.download(&parsed, &file_name).await {
            Ok(()) => {
                info!(url, path = %path, "downloaded artifact");
                self.inner.record(url, &file_name)?;
                Ok(path)
            }
            Err(reason) if local.is_some() => {
                warn!(url, reason, "download failed, keeping previous copy");
                Ok(path)
            }
            Err(reason) => Err(ProvisioningError::Download {
                url: url.to_owned(),
                reason,
            }),
        }
    }

    fn cached_path(&self, url: &str) -> Option<Utf8PathBuf> {
        let index = self
            .inner
            .index
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let file_name = index.entries.get(url)?;
        self.inner
            .dir
            .is_file(file_name)
            .then(|| self.inner.root.join(file_name))
    }
}

/// Shares the per-url fetch lock; the last holder removes it from the map.
struct FetchSlot<'a> {
    inner: &'a CacheInner,
    url: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for FetchSlot<'_> {
    fn drop(&mut self) {
        let mut fetches = self
            .inner
            .fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let last = Arc::strong_count(&self.lock) == 2
            && fetches
                .get(&self.url)
                .is_some_and(|shared| Arc::ptr_eq(shared, &self.lock));
        if last {
            fetches.remove(&self.url);
        }
    }
}

impl CacheInner {
    fn fetch_slot(&self, url: &str) -> FetchSlot<'_> {
        let mut fetches = self.fetches.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(fetches.entry(url.to_owned()).or_default());
        FetchSlot {
            inner: self,
            url: url.to_owned(),
            lock,
        }
    }

    fn local_modified(&self, file_name: &str) -> ProvisioningResult<Option<SystemTime>> {
        match self.dir.metadata(file_name) {
            Ok(metadata) => metadata
                .modified()
                .map(|modified| Some(modified.into_std()))
                .map_err(ProvisioningError::storage),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ProvisioningError::storage(err)),
        }
    }

    /// A failed HEAD keeps the local copy; a remote without
    /// `Last-Modified` is always refetched.
    async fn is_outdated(&self, url: &Url, local: SystemTime) -> bool {
        let response = match self
            .client
            .head(url.clone())
            .send()
            .await
            .and_then(Response::error_for_status)
        {
            Ok(response) => response,
            Err(err) => {
                debug!(url = %url, error = %err, "freshness check failed");
                return false;
            }
        };

        let remote = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok());
        remote.is_none_or(|modified| modified.with_timezone(&Utc) > DateTime::<Utc>::from(local))
    }

    async fn download(&self, url: &Url, file_name: &str) -> Result<(), String> {
        let bytes = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|err| err.to_string())?
            .bytes()
            .await
            .map_err(|err| err.to_string())?;

        let partial = format!("{file_name}.{}.part", Uuid::new_v4());
        self.dir
            .write(&partial, &bytes)
            .map_err(|err| err.to_string())?;
        if let Err(err) = self.dir.rename(&partial, &self.dir, file_name) {
            if let Err(cleanup) = self.dir.remove_file(&partial) {
                debug!(file = partial, error = %cleanup, "failed to remove partial download");
            }
            return Err(err.to_string());
        }
        Ok(())
    }

    fn record(&self, url: &str, file_name: &str) -> ProvisioningResult<()> {
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        if index.entries.get(url).map(String::as_str) == Some(file_name) {
            return Ok(());
        }
        index.entries.insert(url.to_owned(), file_name.to_owned());

        let contents = serde_json::to_vec_pretty(&*index)
            .map_err(|err| ProvisioningError::storage(io::Error::other(err)))?;
        let partial = format!("{INDEX_FILE}.{}.part", Uuid::new_v4());
        self.dir
            .write(&partial, contents)
            .and_then(|()| self.dir.rename(&partial, &self.dir, INDEX_FILE))
            .map_err(ProvisioningError::storage)
    }
}

fn load_index(dir: &Dir, root: &Utf8Path) -> CacheIndex {
    match dir.read_to_string(INDEX_FILE) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!(root = %root, error = %err, "discarding unreadable artifact index");
            CacheIndex::default()
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => CacheIndex::default(),
        Err(err) => {
            warn!(root = %root, error = %err, "failed to read artifact index");
            CacheIndex::default()
        }
    }
}

fn parse_url(url: &str) -> ProvisioningResult<Url> {
    let parsed = Url::parse(url).map_err(|err| ProvisioningError::InvalidUrl {
        url: url.to_owned(),
        reason: err.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ProvisioningError::InvalidUrl {
            url: url.to_owned(),
            reason: format!("unsupported scheme {scheme}"),
        }),
    }
}

fn file_name_for(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn file_names_are_stable_hex_digests() {
        let name = file_name_for("https://example.com/agent.jar");

        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(name, file_name_for("https://example.com/agent.jar"));
        assert_ne!(name, file_name_for("https://example.com/other.jar"));
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://example.com/agent.jar")]
    fn unsupported_urls_are_rejected(#[case] url: &str) {
        assert!(matches!(
            parse_url(url),
            Err(ProvisioningError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_locks_are_dropped_once_idle() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).expect("utf8 path");
        let cache = FsArtifactCache::open(&root).expect("open cache");

        let result = cache.fetch_or_reuse("http://127.0.0.1:1/agent.jar").await;

        assert!(matches!(result, Err(ProvisioningError::Download { .. })));
        assert!(
            cache
                .inner
                .fetches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
        );
    }

    #[test]
    fn opening_a_root_twice_shares_the_instance() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).expect("utf8 path");

        let first = FsArtifactCache::open(&root).expect("open cache");
        let second = FsArtifactCache::open(&root).expect("open cache");

        assert!(first.same_instance(&second));
        assert!(root.is_dir());
    }

    #[test]
    fn cached_path_reads_persisted_index() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path");
        let url = "https://example.com/agent.jar";
        let file_name = file_name_for(url);
        std::fs::write(root.join(&file_name), b"jar").expect("write artifact");
        std::fs::write(
            root.join(INDEX_FILE),
            serde_json::json!({"entries": {url: file_name}}).to_string(),
        )
        .expect("write index");

        let cache = FsArtifactCache::open(&root).expect("open cache");

        let path = cache.cached_path(url).expect("cached path");
        assert_eq!(path.file_name(), Some(file_name.as_str()));
        assert_eq!(cache.cached_path("https://example.com/missing.jar"), None);
    }
}
