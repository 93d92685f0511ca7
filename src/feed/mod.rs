//! Feed source: fetch a feed URL and normalize its entries.
//!
//! - [`parser`] turns RSS 0.9x/1.0/2.0, Atom and JSON Feed documents into
//!   [`FeedItem`]s using `feed-rs`
//! - [`fetcher`] provides the [`FeedSource`] trait and its HTTP implementation
//!   on top of the retrying transport
//!
//! The document format is resolved once in the parser; consumers only see
//! `FeedItem`.

mod fetcher;
mod item;
mod parser;

pub use fetcher::{FeedError, FeedSource, HttpFeedSource};
pub use item::FeedItem;
pub use parser::{derive_id, parse_feed, FeedKind, ParseResult};
