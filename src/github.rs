//! GitHub repository browsing
//!
//! Thin client over the GitHub REST API used to enumerate repository
//! contents and to mint cacheable handles for raw files. Listing calls hit
//! the network; `file_at` is pure URL and cache-key construction.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::cache::{safe_component, RemoteArtifact};
use crate::config::Settings;
use crate::error::{WindlassError, WindlassResult};
use crate::fetch::{HttpFetcher, RemoteContent};

/// How a file is pinned to a point in repository history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Tag(String),
    Commit(String),
}

/// One entry of a git tree listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Recursive tree listing for one ref.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoTree {
    pub sha: String,
    pub url: String,
    pub tree: Vec<TreeEntry>,
    pub truncated: bool,
}

/// One entry of a contents listing. Directories and submodules carry a null
/// `download_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentsEntry {
    pub name: String,
    pub sha: String,
    pub download_url: Option<String>,
}

/// Browser for files hosted in GitHub repositories.
pub struct GithubFiles {
    api_base: String,
    raw_base: String,
    fetcher: Arc<dyn RemoteContent>,
}

impl GithubFiles {
    /// Browser authenticated with the resolved token, if any.
    pub fn new(settings: &Settings) -> Self {
        let fetcher = Arc::new(HttpFetcher::with_bearer(settings.github_token.clone()));
        Self::with_fetcher(settings, fetcher)
    }

    /// Browser with a caller-supplied transport.
    pub fn with_fetcher(settings: &Settings, fetcher: Arc<dyn RemoteContent>) -> Self {
        Self {
            api_base: settings.api_base.clone(),
            raw_base: settings.raw_base.clone(),
            fetcher,
        }
    }

    /// Full recursive tree of `repo` at `git_ref` (branch, tag, or commit).
    pub async fn repo_tree(&self, repo: &str, git_ref: &str) -> WindlassResult<RepoTree> {
        let url = format!(
            "{}/repos/{}/git/trees/{}?recursive=1",
            self.api_base, repo, git_ref
        );
        debug!("Listing tree: {}", url);
        let body = self.fetcher.fetch_text(&url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Cacheable handles for every file directly under `subdir`.
    ///
    /// The contents endpoint answers with an object for a file path and with
    /// a list for a directory. Anything that is not a list of at least two
    /// entries is rejected; fetch single files through [`GithubFiles::file_at`].
    pub async fn folder_files(
        &self,
        repo: &str,
        subdir: &str,
        git_ref: &str,
    ) -> WindlassResult<Vec<RemoteArtifact>> {
        let url = format!(
            "{}/repos/{}/contents/{}?ref={}",
            self.api_base, repo, subdir, git_ref
        );
        debug!("Listing folder: {}", url);
        let body = self.fetcher.fetch_text(&url).await?;

        let parsed: serde_json::Value = serde_json::from_str(&body)?;
        if !parsed.as_array().is_some_and(|list| list.len() > 1) {
            return Err(WindlassError::FolderIsSingleFile {
                repo: repo.to_string(),
                subdir: subdir.to_string(),
            });
        }
        let entries: Vec<ContentsEntry> = serde_json::from_value(parsed)?;

        entries
            .into_iter()
            .map(|entry| {
                let ContentsEntry {
                    name,
                    sha,
                    download_url,
                } = entry;
                let url = download_url.ok_or_else(|| WindlassError::NotAFile {
                    repo: repo.to_string(),
                    subdir: subdir.to_string(),
                    entry: name.clone(),
                })?;
                Ok(RemoteArtifact::new(name, sha, url))
            })
            .collect()
    }

    /// Cacheable handle for a single file pinned to a tag or commit.
    ///
    /// Pure: builds the raw download URL and a cache key out of the repo and
    /// ref, both normalized to the cache alphabet. Commit hashes are already
    /// safe and are used verbatim.
    pub fn file_at(&self, repo: &str, path: &str, file_ref: &FileRef) -> RemoteArtifact {
        let name = path.rsplit('/').next().unwrap_or(path);
        let safe_repo = safe_component(repo);
        match file_ref {
            FileRef::Tag(tag) => RemoteArtifact::new(
                name,
                format!("tag-{}-{}", safe_repo, safe_component(tag)),
                format!("{}/{}/refs/tags/{}/{}", self.raw_base, repo, tag, path),
            ),
            FileRef::Commit(commit) => RemoteArtifact::new(
                name,
                format!("{}-{}", safe_repo, commit),
                format!("{}/{}/{}/{}", self.raw_base, repo, commit, path),
            ),
        }
    }
}
