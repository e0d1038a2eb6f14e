//! Error types for Windlass
//!
//! All modules use `WindlassResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Windlass operations
pub type WindlassResult<T> = Result<T, WindlassError>;

/// All errors that can occur in Windlass
#[derive(Error, Debug)]
pub enum WindlassError {
    // Remote fetch errors
    #[error("Request failed: {url}: HTTP {status}: {body}")]
    RemoteFetch {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Request error: {url}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Cache misuse errors
    #[error("Retrieved a single file, use file_at instead: {repo} {subdir}")]
    FolderIsSingleFile { repo: String, subdir: String },

    #[error("Folder entry is not a downloadable file: {repo} {subdir}/{entry}")]
    NotAFile {
        repo: String,
        subdir: String,
        entry: String,
    },

    // External tool errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Configuration errors
    #[error("No repository root found above {0}; cannot place the cache directory")]
    CacheRootNotFound(PathBuf),

    // Resource selection errors
    #[error("No resource matches selector: {selector}")]
    SelectorNoMatch { selector: String },

    #[error("Selector must match exactly one resource, found {matches}: {selector}")]
    SelectorAmbiguous { selector: String, matches: usize },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // Reconciliation contract errors
    #[error("Provider contract violation: {0}")]
    Provider(String),
}

impl WindlassError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RemoteFetch {
                status: 401 | 403 | 429,
                ..
            } => Some("Set GITHUB_TOKEN or run: gh auth login"),
            Self::FolderIsSingleFile { .. } => Some("Use file_at for single files"),
            Self::CacheRootNotFound(_) => {
                Some("Run from inside a repository checkout, or set the cache root explicitly")
            }
            _ => None,
        }
    }
}
