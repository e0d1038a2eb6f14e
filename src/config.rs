//! Process-wide settings resolved once at startup
//!
//! Token discovery and cache-root resolution happen exactly once; the
//! resulting `Settings` value is immutable and passed into the components that
//! need it. Nothing here is re-resolved mid-process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{WindlassError, WindlassResult};

/// Default repository REST API host.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default raw-content host.
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory all cache entries live under.
    pub cache_root: PathBuf,
    /// Bearer token for repository API calls; `None` means unauthenticated.
    pub github_token: Option<String>,
    /// Base URL of the repository REST API.
    pub api_base: String,
    /// Base URL for raw file content.
    pub raw_base: String,
    /// Binary used to fetch and unpack chart bundles.
    pub helm_bin: String,
}

impl Settings {
    /// Resolve settings from the process environment: the cache root from the
    /// enclosing repository checkout, the token from `GITHUB_TOKEN` or the gh
    /// credential helper.
    pub async fn resolve() -> WindlassResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| WindlassError::io("reading working directory", e))?;
        let cache_root = discover_cache_root(&cwd)?;
        tokio::fs::create_dir_all(&cache_root)
            .await
            .map_err(|e| WindlassError::io(format!("creating {}", cache_root.display()), e))?;
        let github_token = resolve_github_token().await;
        Ok(Self::explicit(cache_root, github_token))
    }

    /// Fully explicit settings, no discovery. For tests and embedded hosts
    /// that manage their own directory layout and credentials.
    pub fn explicit(cache_root: impl Into<PathBuf>, github_token: Option<String>) -> Self {
        Self {
            cache_root: cache_root.into(),
            github_token,
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            helm_bin: "helm".to_string(),
        }
    }
}

/// Walk up from `start` to the enclosing repository root (a `.git` marker)
/// and return `<root>/.cache`.
///
/// Cached artifacts live next to the checkout that requested them; running
/// outside any checkout is a configuration error, not a fallback case.
pub fn discover_cache_root(start: &Path) -> WindlassResult<PathBuf> {
    let mut dir = start;
    loop {
        if dir.join(".git").exists() {
            return Ok(dir.join(".cache"));
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Err(WindlassError::CacheRootNotFound(start.to_path_buf())),
        }
    }
}

/// Resolve the repository API token once: `GITHUB_TOKEN` wins, then the gh
/// credential helper. Absence is not an error; requests fall back to the
/// unauthenticated rate limit.
pub async fn resolve_github_token() -> Option<String> {
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        let token = token.trim().to_string();
        if !token.is_empty() {
            debug!("Using GitHub token from GITHUB_TOKEN");
            return Some(token);
        }
    }

    match gh_auth_token().await {
        Ok(token) => {
            debug!("Using GitHub token from gh CLI");
            Some(token)
        }
        Err(err) => {
            warn!(
                "No GitHub token available ({}); API calls are unauthenticated and rate limited",
                err
            );
            None
        }
    }
}

/// Ask the gh CLI for its stored token.
async fn gh_auth_token() -> WindlassResult<String> {
    let output = Command::new("gh")
        .args(["auth", "token"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| WindlassError::command_failed("gh auth token", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WindlassError::command_exec("gh auth token", stderr.trim()));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(WindlassError::command_exec(
            "gh auth token",
            "no token in output",
        ));
    }
    Ok(token)
}
