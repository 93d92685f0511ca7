use chrono::{DateTime, Utc};

/// A feed entry normalized from RSS, Atom or JSON Feed.
///
/// `id` is the deduplication key. It equals `guid` when the document supplies
/// a native identifier and is derived from title and link otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub id: String,
    /// Native identifier as found in the document
    pub guid: Option<String>,
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub author: Option<String>,
    pub description: Option<String>,
    /// Identifier (URL) of the feed this item came from
    pub feed_id: String,
}

impl FeedItem {
    /// True when `id` was derived rather than taken from the document.
    pub fn has_derived_id(&self) -> bool {
        self.guid.as_deref() != Some(self.id.as_str())
    }
}
