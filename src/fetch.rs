//! Downloading subscription feeds over HTTP.

use async_trait::async_trait;
use calmirror_core::ports::FeedFetcher;
use calmirror_core::{MirrorError, MirrorResult};
use reqwest::Client;
use tracing::debug;

/// `FeedFetcher` that downloads feeds with reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpFeedFetcher {
    http: Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `webcal://` is a plain HTTPS feed under another name.
pub fn normalize_feed_url(uri: &str) -> String {
    match uri.strip_prefix("webcal://") {
        Some(rest) => format!("https://{}", rest),
        None => uri.to_string(),
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_text(&self, uri: &str) -> MirrorResult<String> {
        let url = normalize_feed_url(uri);
        let fetch_error = |message: String| MirrorError::Fetch {
            uri: uri.to_string(),
            message,
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let text = response.text().await.map_err(|e| fetch_error(e.to_string()))?;
        debug!(bytes = text.len(), "Fetched feed");

        Ok(text)
    }
}
