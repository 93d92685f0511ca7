use std::borrow::Cow;

/// Ellipsis appended when text is cut
const ELLIPSIS: char = '…';

/// Truncates a string to at most `max_chars` Unicode scalar values.
///
/// Webhook channels count message limits in characters, not bytes, so the
/// cut always lands on a `char` boundary. When truncation happens the last
/// character is replaced by an ellipsis, keeping the result within the limit.
///
/// Returns `Cow::Borrowed` when the input already fits.
///
/// # Examples
///
/// ```
/// use feedrelay::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 5), "Hell…");
/// assert_eq!(truncate_chars("日本語のタイトル", 4), "日本語…");
/// assert_eq!(truncate_chars("Test", 0), "");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match s.char_indices().nth(max_chars) {
        None => Cow::Borrowed(s),
        Some(_) => {
            let keep = max_chars - 1;
            let cut = s.char_indices().nth(keep).map(|(idx, _)| idx).unwrap_or(s.len());
            let mut out = String::with_capacity(cut + ELLIPSIS.len_utf8());
            out.push_str(&s[..cut]);
            out.push(ELLIPSIS);
            Cow::Owned(out)
        }
    }
}

/// Collapses runs of whitespace (including newlines) into single spaces and trims.
///
/// Feed titles frequently carry indentation and line breaks from the XML
/// source; channel messages render them verbatim, so they are normalized once
/// at parse time.
pub fn collapse_whitespace(s: &str) -> Cow<'_, str> {
    let trimmed = s.trim();
    let needs_work = trimmed
        .as_bytes()
        .windows(2)
        .any(|w| w[0].is_ascii_whitespace() && w[1].is_ascii_whitespace())
        || trimmed.chars().any(|c| c.is_whitespace() && c != ' ');

    if !needs_work {
        return Cow::Borrowed(trimmed);
    }

    let mut out = String::with_capacity(trimmed.len());
    for word in trimmed.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    Cow::Owned(out)
}
