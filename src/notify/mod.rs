//! Outbound notifications: relayed feed items and operator error reports.
//!
//! The engine only sees the [`Notifier`] trait. [`DiscordNotifier`] is the
//! production implementation, posting embeds to a Discord-compatible webhook
//! through the retrying [`TransportClient`](crate::transport::TransportClient).

mod discord;
mod event;

pub use discord::{
    error_embed, item_embed, DiscordEmbed, DiscordNotifier, DiscordOptions, DiscordWebhookPayload,
    EmbedAuthor, EmbedField, MAX_EMBEDS_PER_MESSAGE,
};
pub use event::{category, ErrorEvent, Severity};

use crate::feed::FeedItem;
use crate::transport::TransportError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from [`Notifier::deliver`].
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook delivery failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Failed to encode webhook payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for relayed items and error reports.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers items in the given order. An empty slice sends nothing.
    ///
    /// Stops at the first failed batch; batches already sent stay sent.
    async fn deliver(&self, items: &[FeedItem]) -> Result<(), NotifyError>;

    /// Best-effort error report. Failures are logged, never returned.
    async fn report_error(&self, event: &ErrorEvent);
}
