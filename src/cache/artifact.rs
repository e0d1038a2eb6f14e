//! Remote artifact cache: fetch once, reuse forever
//!
//! An artifact is identified by a logical name and a unique reference that
//! pins its exact content. The store maps that pair to
//! `<cacheRoot>/<name>-<uniqueRef>`, fetches on the first request, and answers
//! every later request from disk without touching the network.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{WindlassError, WindlassResult};
use crate::fetch::{HttpFetcher, RemoteContent};

/// Handle to one remotely sourced file.
///
/// `unique_ref` must pin the exact content (commit SHA, tag, blob SHA): the
/// store never refetches a key it has seen, so a moving reference would serve
/// stale bytes forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact {
    pub name: String,
    pub unique_ref: String,
    pub url: String,
}

impl RemoteArtifact {
    pub fn new(
        name: impl Into<String>,
        unique_ref: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            unique_ref: unique_ref.into(),
            url: url.into(),
        }
    }

    /// Cache file name for this artifact.
    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.name, self.unique_ref)
    }
}

/// Content-addressed store for remote artifacts.
pub struct ArtifactStore {
    root: PathBuf,
    fetcher: Arc<dyn RemoteContent>,
    // One lock per cache key so concurrent callers share a single fetch.
    // Entries are tiny and live for the process; no cleanup.
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ArtifactStore {
    /// Store rooted at `root`, fetching over unauthenticated HTTPS.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(root, Arc::new(HttpFetcher::new()))
    }

    /// Store with a caller-supplied fetcher.
    pub fn with_fetcher(root: impl Into<PathBuf>, fetcher: Arc<dyn RemoteContent>) -> Self {
        Self {
            root: root.into(),
            fetcher,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Local path for an artifact, whether or not it is cached yet.
    pub fn entry_path(&self, artifact: &RemoteArtifact) -> PathBuf {
        self.root.join(artifact.cache_key())
    }

    /// Resolve an artifact to a local path, fetching at most once per key.
    pub async fn resolve(&self, artifact: &RemoteArtifact) -> WindlassResult<PathBuf> {
        let path = self.entry_path(artifact);
        if path.exists() {
            debug!("Cache hit: {}", path.display());
            return Ok(path);
        }

        let key_lock = self.key_lock(artifact.cache_key()).await;
        let _guard = key_lock.lock().await;

        // A racing caller may have finished the fetch while we waited.
        if path.exists() {
            debug!("Cache hit after wait: {}", path.display());
            return Ok(path);
        }

        info!("Fetching {} -> {}", artifact.url, path.display());
        let contents = self.fetcher.fetch_text(&artifact.url).await?;

        fs::create_dir_all(&self.root).await.map_err(|e| {
            WindlassError::io(format!("creating cache root {}", self.root.display()), e)
        })?;

        // Write to a sibling and rename so readers only ever observe complete
        // entries. The temp name embeds the key; racing writers of the same
        // key are serialized by the lock above, and a same-key writer in
        // another process renames identical bytes over ours.
        let partial = self.root.join(format!("{}.partial", artifact.cache_key()));
        fs::write(&partial, &contents)
            .await
            .map_err(|e| WindlassError::io(format!("writing {}", partial.display()), e))?;
        fs::rename(&partial, &path)
            .await
            .map_err(|e| WindlassError::io(format!("placing {}", path.display()), e))?;

        Ok(path)
    }

    /// Resolve an artifact and read its full text.
    pub async fn read_to_string(&self, artifact: &RemoteArtifact) -> WindlassResult<String> {
        let path = self.resolve(artifact).await?;
        fs::read_to_string(&path)
            .await
            .map_err(|e| WindlassError::io(format!("reading {}", path.display()), e))
    }

    /// Resolve a batch concurrently; paths come back in input order.
    pub async fn resolve_all(&self, artifacts: &[RemoteArtifact]) -> WindlassResult<Vec<PathBuf>> {
        try_join_all(artifacts.iter().map(|artifact| self.resolve(artifact))).await
    }

    async fn key_lock(&self, key: String) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        inflight.entry(key).or_default().clone()
    }
}
