use super::item::FeedItem;
use super::parser::{parse_feed, ParseResult};
use crate::transport::{TransportClient, TransportError};
use crate::util::{validate_url, UrlValidationError};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while fetching and parsing a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed identifier is not an http(s) URL
    #[error("Invalid feed URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: UrlValidationError,
    },
    /// Fetch failed after all attempts
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Body is not a recognizable RSS/Atom/JSON feed
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Produces normalized items for a feed identifier.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Items in document order (not sorted).
    async fn fetch(&self, feed_id: &str) -> Result<Vec<FeedItem>, FeedError>;
}

/// Feed source that treats the feed identifier as a URL and fetches it over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    transport: TransportClient,
}

impl HttpFeedSource {
    pub fn new(transport: TransportClient) -> Self {
        Self { transport }
    }

    /// Fetches and parses a feed, returning the detected kind and skip count too.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidUrl`] - not an http(s) URL; no request is made
    /// - [`FeedError::Transport`] - every attempt failed (status, timeout, network)
    /// - [`FeedError::Parse`] - body is not a feed document
    pub async fn fetch_parsed(&self, feed_url: &str) -> Result<ParseResult, FeedError> {
        validate_url(feed_url).map_err(|source| FeedError::InvalidUrl {
            url: feed_url.to_string(),
            source,
        })?;

        let response = self.transport.get(feed_url).await?;

        let result =
            parse_feed(&response.body, feed_url).map_err(|e| FeedError::Parse(e.to_string()))?;

        if result.skipped > 0 {
            tracing::warn!(
                feed = %feed_url,
                skipped = result.skipped,
                "Entries missing title, link or date skipped"
            );
        }
        tracing::debug!(
            feed = %feed_url,
            kind = %result.kind,
            items = result.items.len(),
            "Feed parsed"
        );

        Ok(result)
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed_id: &str) -> Result<Vec<FeedItem>, FeedError> {
        Ok(self.fetch_parsed(feed_id).await?.items)
    }
}
