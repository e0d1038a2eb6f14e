//! Managed helm charts
//!
//! A `ChartDescriptor` is prepared asynchronously (the chart bundle is
//! resolved through the cache) and then consumed synchronously by the host
//! when it constructs its chart resource. V3 and V4 are two variants of the
//! same capability; they differ only in which migration alias gets attached
//! to each rendered manifest, so a stack can switch chart implementations
//! without replacing its resources.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::warn;

use crate::cache::ChartCache;
use crate::error::{WindlassError, WindlassResult};

/// Which chart implementation the host is building on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartApi {
    V3,
    V4,
}

/// Project and stack the resources belong to; both appear in alias URNs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackContext {
    pub project: String,
    pub stack: String,
}

/// Where a chart comes from: a repository-hosted or registry-qualified chart
/// reference plus a pinned version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSource {
    pub chart: String,
    pub version: String,
    pub repo: Option<String>,
}

/// Everything the host needs to construct a chart resource: the locally
/// cached chart directory plus the context for alias construction.
#[derive(Debug, Clone)]
pub struct ChartDescriptor {
    pub release: String,
    pub api: ChartApi,
    pub local_path: PathBuf,
    pub ctx: StackContext,
}

impl ChartDescriptor {
    /// Resolve the chart bundle through the cache and capture the context
    /// needed later. This is the only async step; everything on the
    /// descriptor afterwards is plain value work.
    pub async fn prepare(
        api: ChartApi,
        release: impl Into<String>,
        source: &ChartSource,
        cache: &ChartCache,
        ctx: StackContext,
    ) -> WindlassResult<Self> {
        let local_path = cache
            .chart_dir(&source.chart, &source.version, source.repo.as_deref())
            .await?;
        Ok(Self {
            release: release.into(),
            api,
            local_path,
            ctx,
        })
    }

    /// URN this resource carried under the other chart implementation.
    ///
    /// Building on V3 aliases each manifest to its V4 URN and vice versa, so
    /// the host's state engine matches old and new resources up instead of
    /// replacing them. The V4 URN shape has no release segment.
    pub fn migration_alias(&self, resource: &ResourceIdentity) -> String {
        let api_version = qualified_api_version(&resource.api_version);
        let namespace = match resource.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}/", ns),
            _ => String::new(),
        };
        match self.api {
            ChartApi::V3 => format!(
                "urn:pulumi:{}::{}::kubernetes:helm.sh/v4:Chart$kubernetes:{}:{}::{}:{}{}",
                self.ctx.stack,
                self.ctx.project,
                api_version,
                resource.kind,
                self.release,
                namespace,
                resource.name,
            ),
            ChartApi::V4 => format!(
                "urn:pulumi:{}::{}::kubernetes:helm.sh/v3:Chart$kubernetes:{}:{}::{}{}",
                self.ctx.stack,
                self.ctx.project,
                api_version,
                resource.kind,
                namespace,
                resource.name,
            ),
        }
    }

    /// Migration alias for a rendered manifest, or `None` for values without
    /// an `apiVersion` (the chart component wrapper itself renders as one).
    pub fn migration_alias_for(&self, manifest: &Value) -> Option<String> {
        ResourceIdentity::from_manifest(manifest).map(|identity| self.migration_alias(&identity))
    }
}

/// Identity of one rendered manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceIdentity {
    /// Extract the identity from a rendered manifest. `None` when the value
    /// carries no `apiVersion`.
    pub fn from_manifest(manifest: &Value) -> Option<Self> {
        let api_version = manifest.get("apiVersion")?.as_str()?.to_string();
        let kind = manifest
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata = manifest.get("metadata");
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            api_version,
            kind,
            namespace,
            name,
        })
    }

    /// Selector form, `{apiVersion}:{kind}:{namespace}:{name}`, with an empty
    /// namespace segment for cluster-scoped resources. The apiVersion is used
    /// as rendered; `v1` is not qualified here.
    pub fn selector(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.api_version,
            self.kind,
            self.namespace.as_deref().unwrap_or(""),
            self.name,
        )
    }
}

/// Pick the single rendered manifest matching `selector`.
pub fn select_resource<'a>(resources: &'a [Value], selector: &str) -> WindlassResult<&'a Value> {
    let matching: Vec<&Value> = resources
        .iter()
        .filter(|resource| {
            ResourceIdentity::from_manifest(resource)
                .is_some_and(|identity| identity.selector() == selector)
        })
        .collect();

    match matching.as_slice() {
        [only] => Ok(only),
        [] => Err(WindlassError::SelectorNoMatch {
            selector: selector.to_string(),
        }),
        many => Err(WindlassError::SelectorAmbiguous {
            selector: selector.to_string(),
            matches: many.len(),
        }),
    }
}

/// Manifests deployed outside the engine. Matching manifests are archived to
/// disk for whoever deploys them and replaced in place with an empty
/// `v1/List`, so the host keeps the resource slot without creating anything.
pub struct SkipRules {
    project: String,
    archive_dir: PathBuf,
    selectors: HashSet<String>,
}

impl SkipRules {
    pub fn new(
        ctx: &StackContext,
        archive_dir: impl Into<PathBuf>,
        selectors: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            project: ctx.project.clone(),
            archive_dir: archive_dir.into(),
            selectors: selectors.into_iter().collect(),
        }
    }

    /// Archive and blank out `manifest` if it is on the skip list. Returns
    /// whether the manifest was replaced.
    pub fn apply(&self, manifest: &mut Value) -> WindlassResult<bool> {
        let Some(identity) = ResourceIdentity::from_manifest(manifest) else {
            return Ok(false);
        };
        let selector = identity.selector();
        if !self.selectors.contains(&selector) {
            return Ok(false);
        }

        warn!("Skipping manifest: {}", selector);
        fs::create_dir_all(&self.archive_dir).map_err(|e| {
            WindlassError::io(format!("creating {}", self.archive_dir.display()), e)
        })?;
        let file = self
            .archive_dir
            .join(format!("{}-{}.yaml", self.project, selector.replace('/', "-")));
        let rendered = serde_yaml::to_string(manifest)?;
        fs::write(&file, rendered)
            .map_err(|e| WindlassError::io(format!("writing {}", file.display()), e))?;

        *manifest = json!({ "apiVersion": "v1", "kind": "List", "items": [] });
        Ok(true)
    }
}

fn qualified_api_version(api_version: &str) -> &str {
    if api_version == "v1" {
        "core/v1"
    } else {
        api_version
    }
}
