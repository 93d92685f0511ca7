use super::item::FeedItem;
use crate::util::{collapse_whitespace, is_valid_url};
use feed_rs::model::{Entry, FeedType};
use feed_rs::parser;
use sha2::{Digest, Sha256};

/// Document family detected by the parser.
///
/// Resolved once here; nothing downstream of the feed source branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Rss,
    Atom,
    Json,
}

impl From<&FeedType> for FeedKind {
    fn from(ft: &FeedType) -> Self {
        match ft {
            FeedType::Atom => FeedKind::Atom,
            FeedType::JSON => FeedKind::Json,
            FeedType::RSS0 | FeedType::RSS1 | FeedType::RSS2 => FeedKind::Rss,
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FeedKind::Rss => "rss",
            FeedKind::Atom => "atom",
            FeedKind::Json => "json",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ParseResult {
    pub kind: FeedKind,
    pub title: Option<String>,
    pub items: Vec<FeedItem>,
    /// Entries dropped for missing title, link or date, or an unusable link
    pub skipped: usize,
}

/// Parses an RSS/Atom/JSON feed document into normalized items.
///
/// Individual malformed entries are skipped and counted rather than failing
/// the whole document. Items keep document order.
pub fn parse_feed(bytes: &[u8], feed_id: &str) -> Result<ParseResult, parser::ParseFeedError> {
    // feed-rs would otherwise invent ids for entries without one; leave them
    // empty so normalize_entry can tell native ids from derived ones.
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)?;

    let kind = FeedKind::from(&feed.feed_type);
    let title = feed
        .title
        .map(|t| collapse_whitespace(&t.content).into_owned())
        .filter(|t| !t.is_empty());

    let mut skipped = 0;
    let items: Vec<FeedItem> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let item = normalize_entry(entry, feed_id);
            if item.is_none() {
                skipped += 1;
            }
            item
        })
        .collect();

    Ok(ParseResult {
        kind,
        title,
        items,
        skipped,
    })
}

fn normalize_entry(entry: Entry, feed_id: &str) -> Option<FeedItem> {
    let title = entry
        .title
        .as_ref()
        .map(|t| collapse_whitespace(&t.content).into_owned())
        .filter(|t| !t.is_empty())?;

    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| is_valid_url(href))?;

    let published_at = entry.published.or(entry.updated)?;

    let guid = Some(entry.id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let id = guid.clone().unwrap_or_else(|| derive_id(&title, &link));

    let author = entry
        .authors
        .first()
        .map(|p| p.name.trim().to_string())
        .filter(|n| !n.is_empty());

    let description = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body));

    Some(FeedItem {
        id,
        guid,
        title,
        link,
        published_at,
        author,
        description,
        feed_id: feed_id.to_string(),
    })
}

/// Stable identifier for entries without a native one: SHA-256 of `title|link`.
pub fn derive_id(title: &str, link: &str) -> String {
    let hash = Sha256::digest(format!("{}|{}", title, link).as_bytes());
    format!("{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    const FEED: &str = "https://example.com/rss";

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_rss2() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example RSS</title>
    <link>https://example.com</link>
    <description>d</description>
    <item>
        <guid>post-2</guid>
        <title>Second   post</title>
        <link>https://example.com/2</link>
        <pubDate>Mon, 02 Jan 2023 00:00:00 GMT</pubDate>
        <author>alice@example.com (Alice)</author>
        <description>Body two</description>
    </item>
    <item>
        <guid>post-1</guid>
        <title>First post</title>
        <link>https://example.com/1</link>
        <pubDate>Sun, 01 Jan 2023 12:00:00 GMT</pubDate>
    </item>
</channel></rss>"#;

        let result = parse_feed(xml.as_bytes(), FEED).unwrap();
        assert_eq!(result.kind, FeedKind::Rss);
        assert_eq!(result.title.as_deref(), Some("Example RSS"));
        assert_eq!(result.skipped, 0);
        assert_eq!(result.items.len(), 2);

        let first = &result.items[0];
        assert_eq!(first.id, "post-2");
        assert_eq!(first.guid.as_deref(), Some("post-2"));
        assert_eq!(first.title, "Second post");
        assert_eq!(first.link, "https://example.com/2");
        assert_eq!(first.published_at, ts("2023-01-02T00:00:00Z"));
        assert_eq!(first.description.as_deref(), Some("Body two"));
        assert_eq!(first.feed_id, FEED);
        assert!(!first.has_derived_id());

        assert_eq!(result.items[1].id, "post-1");
    }

    #[test]
    fn test_parse_atom() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Example Atom</title>
    <id>urn:feed</id>
    <updated>2023-01-02T00:00:00Z</updated>
    <entry>
        <id>urn:entry:1</id>
        <title>Atom entry</title>
        <link rel="alternate" href="https://example.com/atom/1"/>
        <published>2023-01-02T00:00:00Z</published>
        <updated>2023-01-03T00:00:00Z</updated>
        <author><name>Bob</name></author>
        <summary>Summary text</summary>
    </entry>
</feed>"#;

        let result = parse_feed(xml.as_bytes(), FEED).unwrap();
        assert_eq!(result.kind, FeedKind::Atom);
        assert_eq!(result.items.len(), 1);

        let item = &result.items[0];
        assert_eq!(item.id, "urn:entry:1");
        assert_eq!(item.link, "https://example.com/atom/1");
        assert_eq!(item.published_at, ts("2023-01-02T00:00:00Z"));
        assert_eq!(item.author.as_deref(), Some("Bob"));
        assert_eq!(item.description.as_deref(), Some("Summary text"));
    }

    #[test]
    fn test_atom_entry_without_published_uses_updated() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>t</title>
    <id>urn:feed</id>
    <updated>2023-01-02T00:00:00Z</updated>
    <entry>
        <id>urn:entry:1</id>
        <title>Only updated</title>
        <link href="https://example.com/a"/>
        <updated>2023-01-05T00:00:00Z</updated>
    </entry>
</feed>"#;

        let result = parse_feed(xml.as_bytes(), FEED).unwrap();
        assert_eq!(result.items[0].published_at, ts("2023-01-05T00:00:00Z"));
    }

    #[test]
    fn test_malformed_items_skipped_not_fatal() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>t</title>
    <link>https://example.com</link>
    <description>d</description>
    <item>
        <guid>no-date</guid>
        <title>No date</title>
        <link>https://example.com/no-date</link>
    </item>
    <item>
        <guid>no-title</guid>
        <link>https://example.com/no-title</link>
        <pubDate>Sun, 01 Jan 2023 12:00:00 GMT</pubDate>
    </item>
    <item>
        <guid>no-link</guid>
        <title>No link</title>
        <pubDate>Sun, 01 Jan 2023 12:00:00 GMT</pubDate>
    </item>
    <item>
        <guid>ok</guid>
        <title>Fine</title>
        <link>https://example.com/ok</link>
        <pubDate>Sun, 01 Jan 2023 12:00:00 GMT</pubDate>
    </item>
</channel></rss>"#;

        let result = parse_feed(xml.as_bytes(), FEED).unwrap();
        assert_eq!(result.skipped, 3);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, "ok");
    }

    #[test]
    fn test_not_a_feed_is_error() {
        assert!(parse_feed(b"<not valid xml", FEED).is_err());
        assert!(parse_feed(b"<html><body>hello</body></html>", FEED).is_err());
    }

    #[test]
    fn test_empty_channel_is_ok() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title><link>https://example.com</link><description>d</description></channel></rss>"#;
        let result = parse_feed(xml.as_bytes(), FEED).unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn test_item_without_guid_gets_derived_id() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>t</title>
    <link>https://example.com</link>
    <description>d</description>
    <item>
        <title>No guid here</title>
        <link>https://example.com/no-guid</link>
        <pubDate>Sun, 01 Jan 2023 12:00:00 GMT</pubDate>
    </item>
</channel></rss>"#;

        let result = parse_feed(xml.as_bytes(), FEED).unwrap();
        assert_eq!(result.items.len(), 1);

        let item = &result.items[0];
        assert_eq!(item.guid, None);
        assert_eq!(item.id, derive_id("No guid here", "https://example.com/no-guid"));
        assert!(item.has_derived_id());
    }

    #[test]
    fn test_atom_entry_without_id_gets_derived_id() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>t</title>
    <id>urn:feed</id>
    <updated>2023-01-02T00:00:00Z</updated>
    <entry>
        <title>Anonymous</title>
        <link href="https://example.com/anon"/>
        <updated>2023-01-05T00:00:00Z</updated>
    </entry>
</feed>"#;

        let item = &parse_feed(xml.as_bytes(), FEED).unwrap().items[0];
        assert_eq!(item.guid, None);
        assert_eq!(item.id, derive_id("Anonymous", "https://example.com/anon"));
    }

    #[test]
    fn test_derive_id_deterministic() {
        let a = derive_id("Title", "https://example.com/1");
        let b = derive_id("Title", "https://example.com/1");
        let c = derive_id("Title", "https://example.com/2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
