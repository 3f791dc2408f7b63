use std::collections::HashMap;

/// Checks whether a raw email contains a `MIME-Version:` header,
/// indicating it is a valid MIME message per RFC 2045.
///
/// Only the header section (lines before the first blank line) is inspected.
///
/// # Examples
///
/// ```rust
/// assert!(maildrop_dispatch::is_mime_valid(
///     "MIME-Version: 1.0\r\nContent-Type: text/plain\r\n\r\nBody"
/// ));
/// assert!(!maildrop_dispatch::is_mime_valid("Subject: Hello\r\n\r\nBody"));
/// assert!(!maildrop_dispatch::is_mime_valid(
///     "Subject: Hello\r\n\r\nMIME-Version: 1.0"
/// ));
/// ```
pub fn is_mime_valid(raw: &str) -> bool {
    header_lines(raw).any(|line| {
        line.split_once(':')
            .is_some_and(|(key, _)| key.trim().eq_ignore_ascii_case("MIME-Version"))
    })
}

/// Parses the header section of an email into a map of header values.
///
/// Parsing stops at the first blank line. Keys keep their original case,
/// repeated headers keep the first value seen.
///
/// # Examples
///
/// ```rust
/// let headers = maildrop_dispatch::parse_mime_headers(
///     "From: test@example.com\r\nSubject: Hi\r\n\r\nSubject: not a header",
/// );
/// assert_eq!(headers.get("From").map(String::as_str), Some("test@example.com"));
/// assert_eq!(headers.get("Subject").map(String::as_str), Some("Hi"));
/// ```
pub fn parse_mime_headers(raw: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in header_lines(raw) {
        if let Some((key, value)) = line.split_once(':') {
            headers
                .entry(key.trim().to_string())
                .or_insert_with(|| value.trim().to_string());
        }
    }
    headers
}

fn header_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().take_while(|line| !line.trim().is_empty())
}
