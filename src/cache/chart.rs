//! Versioned chart-bundle cache
//!
//! Charts are cached per (name, version, source) triple under
//! `<cacheRoot>/helm-charts/<shortName>-<digest>/<version>`. The digest is
//! taken over the source repository (or the chart reference itself for
//! registry-qualified charts) so same-named charts from different sources
//! never share an entry. Presence of the version directory is the cache-hit
//! signal; contents are not re-verified.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::cache::{safe_component, short_digest};
use crate::config::Settings;
use crate::error::{WindlassError, WindlassResult};

/// Fetches and unpacks one chart version into a destination directory.
#[async_trait]
pub trait ChartFetcher: Send + Sync {
    async fn pull(
        &self,
        chart: &str,
        version: &str,
        repo: Option<&str>,
        dest: &Path,
    ) -> WindlassResult<()>;
}

/// Production fetcher shelling out to the helm CLI:
/// `helm pull <chart> [--repo <repo>] --version <version> -d <dest> --untar`.
pub struct HelmCli {
    bin: String,
}

impl HelmCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new("helm")
    }
}

#[async_trait]
impl ChartFetcher for HelmCli {
    async fn pull(
        &self,
        chart: &str,
        version: &str,
        repo: Option<&str>,
        dest: &Path,
    ) -> WindlassResult<()> {
        let mut args = vec!["pull".to_string(), chart.to_string()];
        if let Some(repo) = repo {
            args.push("--repo".to_string());
            args.push(repo.to_string());
        }
        args.push("--version".to_string());
        args.push(version.to_string());
        args.push("-d".to_string());
        args.push(dest.display().to_string());
        args.push("--untar".to_string());

        let mut cmd = Command::new(&self.bin);
        cmd.args(&args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let rendered = format!("{} {}", self.bin, args.join(" "));
        debug!("Running: {}", rendered);

        let output = cmd
            .output()
            .await
            .map_err(|e| WindlassError::command_failed(rendered.clone(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WindlassError::command_exec(rendered, stderr.trim()));
        }
        Ok(())
    }
}

/// Cache of unpacked chart bundles.
pub struct ChartCache {
    root: PathBuf,
    fetcher: Arc<dyn ChartFetcher>,
}

impl ChartCache {
    /// Cache under `settings.cache_root`, pulling with `settings.helm_bin`.
    pub fn new(settings: &Settings) -> Self {
        Self::with_fetcher(
            settings.cache_root.clone(),
            Arc::new(HelmCli::new(settings.helm_bin.clone())),
        )
    }

    /// Cache with a caller-supplied fetcher.
    pub fn with_fetcher(cache_root: impl Into<PathBuf>, fetcher: Arc<dyn ChartFetcher>) -> Self {
        Self {
            root: cache_root.into(),
            fetcher,
        }
    }

    /// Directory that holds (or would hold) this chart version.
    pub fn chart_path(&self, chart: &str, version: &str, repo: Option<&str>) -> PathBuf {
        let digest = short_digest(repo.unwrap_or(chart));
        let local_name = safe_component(&format!("{}-{}", short_name(chart), digest));
        self.root.join("helm-charts").join(local_name).join(version)
    }

    /// Resolve a chart to its unpacked local directory, pulling only when the
    /// version directory does not exist yet.
    ///
    /// Returns `<versionDir>/<shortName>`: helm untars into a subdirectory
    /// named after the chart (helm/helm#10459), and callers want the chart
    /// root, not the version directory.
    pub async fn chart_dir(
        &self,
        chart: &str,
        version: &str,
        repo: Option<&str>,
    ) -> WindlassResult<PathBuf> {
        let target = self.chart_path(chart, version, repo);
        if target.exists() {
            debug!("Chart cache hit: {}", target.display());
        } else {
            info!("Pulling chart {} {} into {}", chart, version, target.display());
            self.fetcher.pull(chart, version, repo, &target).await?;
        }
        Ok(target.join(short_name(chart)))
    }
}

/// Final path segment of a chart reference:
/// `oci://registry.example.com/library/postgres` -> `postgres`.
fn short_name(chart: &str) -> &str {
    chart.rsplit('/').next().unwrap_or(chart)
}
