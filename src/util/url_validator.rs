use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// Feed and webhook URLs come from operator configuration, so validation is a
/// shape check (scheme and authority), not an SSRF policy.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a feed source or webhook destination.
///
/// Accepts only `http` and `https` URLs with a non-empty host.
///
/// # Errors
///
/// - [`UrlValidationError::InvalidUrl`] if the string does not parse
/// - [`UrlValidationError::UnsupportedScheme`] for `file://`, `ftp://`, etc.
/// - [`UrlValidationError::MissingHost`] if the authority is empty
///
/// # Examples
///
/// ```
/// use feedrelay::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("file:///etc/passwd").is_err());
/// assert!(validate_url("example.com").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}

/// Pure predicate form of [`validate_url`].
pub fn is_valid_url(url_str: &str) -> bool {
    validate_url(url_str).is_ok()
}
