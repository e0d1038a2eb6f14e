//! HTTP retrieval of remote content
//!
//! `RemoteContent` is the seam between the caches and the network: production
//! code fetches over HTTPS, tests substitute counting fakes.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{WindlassError, WindlassResult};

/// Fetches the complete text content behind a URL.
#[async_trait]
pub trait RemoteContent: Send + Sync {
    /// Fetch the full body at `url` as UTF-8 text.
    async fn fetch_text(&self, url: &str) -> WindlassResult<String>;
}

/// Production fetcher: plain GET with optional bearer authentication.
///
/// Non-success statuses become errors carrying the response body, so callers
/// can diagnose a failed request without replaying it.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
    bearer: Option<String>,
}

impl HttpFetcher {
    /// Unauthenticated fetcher, used for raw content downloads.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            bearer: None,
        }
    }

    /// Fetcher that sends `Authorization: Bearer <token>` when a token is
    /// present. `None` falls back to unauthenticated requests.
    pub fn with_bearer(token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            bearer: token,
        }
    }
}

#[async_trait]
impl RemoteContent for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> WindlassResult<String> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| WindlassError::Http {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| WindlassError::Http {
            url: url.to_string(),
            source: e,
        })?;

        if !status.is_success() {
            return Err(WindlassError::RemoteFetch {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}
