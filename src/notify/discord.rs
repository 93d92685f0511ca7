use super::event::{ErrorEvent, Severity};
use super::{Notifier, NotifyError};
use crate::feed::FeedItem;
use crate::transport::{RequestSpec, TransportClient};
use crate::util::truncate_chars;
use async_trait::async_trait;
use chrono::SecondsFormat;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;

/// Discord accepts at most this many embeds per webhook message
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

const MAX_TITLE_CHARS: usize = 256;
const MAX_DESCRIPTION_CHARS: usize = 4096;
const MAX_FIELD_NAME_CHARS: usize = 256;
const MAX_AUTHOR_CHARS: usize = 256;
const MAX_FIELD_VALUE_CHARS: usize = 1024;

const COLOR_ITEM: u32 = 0x00ff00;

/// Default per-attempt timeout for webhook posts
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

fn severity_color(severity: Severity) -> u32 {
    match severity {
        Severity::Low => 0x0000ff,
        Severity::Medium => 0xffff00,
        Severity::High => 0xff0000,
        Severity::Critical => 0x8b0000,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// One message card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscordEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

/// Body of a webhook POST.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscordWebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub embeds: Vec<DiscordEmbed>,
}

/// Presentation settings for [`DiscordNotifier`].
#[derive(Debug, Clone)]
pub struct DiscordOptions {
    /// Overrides the webhook's configured display name
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    /// Adds the publish time to item embeds
    pub include_timestamp: bool,
    pub webhook_timeout: Duration,
}

impl Default for DiscordOptions {
    fn default() -> Self {
        Self {
            username: None,
            avatar_url: None,
            include_timestamp: true,
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }
}

/// Builds the embed for a relayed feed item.
///
/// The `ID:` line is only shown when the id was derived rather than taken
/// from the document, since a native guid is usually just the link again.
pub fn item_embed(item: &FeedItem, include_timestamp: bool) -> DiscordEmbed {
    let mut lines = Vec::with_capacity(2);
    if item.has_derived_id() {
        lines.push(format!("ID: {}", item.id));
    }
    if include_timestamp {
        lines.push(format!(
            "Published: {}",
            item.published_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }

    DiscordEmbed {
        title: Some(truncate_chars(&item.title, MAX_TITLE_CHARS).into_owned()),
        url: Some(item.link.clone()),
        description: (!lines.is_empty()).then(|| lines.join("\n")),
        timestamp: include_timestamp
            .then(|| item.published_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        color: Some(COLOR_ITEM),
        author: item.author.as_ref().map(|name| EmbedAuthor {
            name: truncate_chars(name, MAX_AUTHOR_CHARS).into_owned(),
        }),
        fields: Vec::new(),
    }
}

/// Builds the embed for an operator error report.
pub fn error_embed(event: &ErrorEvent) -> DiscordEmbed {
    let mut fields = vec![
        EmbedField {
            name: "Feed URL".to_string(),
            value: truncate_chars(event.feed_id.as_deref().unwrap_or("N/A"), MAX_FIELD_VALUE_CHARS)
                .into_owned(),
            inline: false,
        },
        EmbedField {
            name: "Severity".to_string(),
            value: event.severity.to_string(),
            inline: true,
        },
        EmbedField {
            name: "Timestamp".to_string(),
            value: event.occurred_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            inline: true,
        },
    ];
    fields.extend(event.details.iter().map(|(key, value)| EmbedField {
        name: truncate_chars(key, MAX_FIELD_NAME_CHARS).into_owned(),
        value: truncate_chars(value, MAX_FIELD_VALUE_CHARS).into_owned(),
        inline: false,
    }));

    DiscordEmbed {
        title: Some(truncate_chars(&format!("Error: {}", event.category), MAX_TITLE_CHARS).into_owned()),
        description: Some(truncate_chars(&event.message, MAX_DESCRIPTION_CHARS).into_owned()),
        color: Some(severity_color(event.severity)),
        fields,
        ..DiscordEmbed::default()
    }
}

/// Posts embeds to a Discord-compatible webhook.
///
/// Webhook URLs carry a token, so they are kept as [`SecretString`] and only
/// exposed at the moment a request is built. `Debug` output shows them
/// redacted.
#[derive(Debug)]
pub struct DiscordNotifier {
    transport: TransportClient,
    webhook_url: SecretString,
    error_webhook_url: Option<SecretString>,
    options: DiscordOptions,
}

impl DiscordNotifier {
    pub fn new(transport: TransportClient, webhook_url: SecretString) -> Self {
        Self {
            transport,
            webhook_url,
            error_webhook_url: None,
            options: DiscordOptions::default(),
        }
    }

    /// Routes error reports to a separate webhook instead of the primary one.
    pub fn with_error_webhook(mut self, url: SecretString) -> Self {
        self.error_webhook_url = Some(url);
        self
    }

    pub fn with_options(mut self, options: DiscordOptions) -> Self {
        self.options = options;
        self
    }

    async fn post(&self, url: &SecretString, payload: &DiscordWebhookPayload) -> Result<(), NotifyError> {
        let body = serde_json::to_string(payload)?;
        let spec = RequestSpec::post_json(body).with_timeout(self.options.webhook_timeout);
        self.transport.send(url.expose_secret(), &spec).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, items: &[FeedItem]) -> Result<(), NotifyError> {
        if items.is_empty() {
            return Ok(());
        }

        let embeds: Vec<DiscordEmbed> = items
            .iter()
            .map(|item| item_embed(item, self.options.include_timestamp))
            .collect();
        let batches = embeds.len().div_ceil(MAX_EMBEDS_PER_MESSAGE);

        for (index, chunk) in embeds.chunks(MAX_EMBEDS_PER_MESSAGE).enumerate() {
            let payload = DiscordWebhookPayload {
                content: None,
                username: self.options.username.clone(),
                avatar_url: self.options.avatar_url.clone(),
                embeds: chunk.to_vec(),
            };
            self.post(&self.webhook_url, &payload).await?;
            tracing::debug!(batch = index + 1, batches, embeds = chunk.len(), "Webhook batch sent");
        }

        Ok(())
    }

    async fn report_error(&self, event: &ErrorEvent) {
        let payload = DiscordWebhookPayload {
            embeds: vec![error_embed(event)],
            ..DiscordWebhookPayload::default()
        };
        let url = self.error_webhook_url.as_ref().unwrap_or(&self.webhook_url);

        match self.post(url, &payload).await {
            Ok(()) => tracing::info!(category = %event.category, "Error notification sent"),
            Err(e) => tracing::error!(
                category = %event.category,
                error = %e,
                "Failed to send error notification"
            ),
        }
    }
}
