//! Utility functions shared by the transport, feed and notifier layers.
//!
//! - **URL validation**: scheme/authority checks for feed and webhook URLs
//! - **Text processing**: character-limit truncation and whitespace cleanup
//!
//! # Examples
//!
//! ```
//! use feedrelay::util::{is_valid_url, truncate_chars};
//!
//! assert!(is_valid_url("https://example.com/feed.xml"));
//! assert_eq!(truncate_chars("Long article title", 8), "Long ar…");
//! ```

mod text;
mod url_validator;

pub use text::{collapse_whitespace, truncate_chars};
pub use url_validator::{is_valid_url, validate_url, UrlValidationError};
