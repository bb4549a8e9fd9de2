//! MIME header handling.

use crate::encoding::decode_rfc2047;
use std::collections::HashMap;

/// Collection of email headers.
///
/// Names are case-insensitive; repeated headers keep every value in
/// arrival order.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        let value = value.into();
        self.headers.entry(name).or_default().push(value);
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets the first value for a header with RFC 2047 encoded words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_rfc2047)
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns true if no headers were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Parses headers from raw text.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///   folded continuation
    /// ```
    ///
    /// Parsing stops at the first empty line. Lines without a colon that
    /// are not continuations are ignored, so arbitrary text never fails.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current_name: Option<String> = None;
        let mut current_value = String::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                break;
            }

            // Continuation line (starts with space or tab)
            if line.starts_with(' ') || line.starts_with('\t') {
                if current_name.is_some() {
                    current_value.push(' ');
                    current_value.push_str(line.trim());
                }
                continue;
            }

            if let Some(name) = current_name.take() {
                headers.add(name, current_value.trim().to_string());
                current_value.clear();
            }

            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                // Header names never contain whitespace; "From sender date" mbox lines do.
                if !name.is_empty() && !name.contains(char::is_whitespace) {
                    current_name = Some(name.to_string());
                    current_value = value.trim().to_string();
                }
            }
        }

        if let Some(name) = current_name {
            headers.add(name, current_value.trim().to_string());
        }

        headers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
    }

    #[test]
    fn test_headers_get_all() {
        let mut headers = Headers::new();
        headers.add("Received", "from a");
        headers.add("Received", "from b");
        assert_eq!(headers.get_all("received"), vec!["from a", "from b"]);
        assert_eq!(headers.get("received"), Some("from a"));
    }

    #[test]
    fn test_headers_parse() {
        let text = "From: sender@example.com\r\n\
                    To: recipient@example.com\r\n\
                    Subject: Test\r\n\
                    \r\n\
                    Body: not a header";

        let headers = Headers::parse(text);
        assert_eq!(headers.get("from"), Some("sender@example.com"));
        assert_eq!(headers.get("to"), Some("recipient@example.com"));
        assert_eq!(headers.get("subject"), Some("Test"));
        assert_eq!(headers.get("body"), None);
    }

    #[test]
    fn test_headers_parse_continuation() {
        let text = "Subject: This is a very long\r\n subject line\r\n\r\n";
        let headers = Headers::parse(text);
        assert_eq!(
            headers.get("subject"),
            Some("This is a very long subject line")
        );
    }

    #[test]
    fn test_headers_parse_skips_mbox_separator() {
        let text = "From jane@example.com Mon Jan  1 00:00:00 2024\n\
                    From: Jane <jane@example.com>\n";
        let headers = Headers::parse(text);
        assert_eq!(headers.get_all("from"), vec!["Jane <jane@example.com>"]);
    }

    #[test]
    fn test_headers_parse_garbage_is_empty() {
        let headers = Headers::parse("just some words\nwithout any structure");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_get_decoded() {
        let headers = Headers::parse("From: =?utf-8?Q?Jos=C3=A9?= <jose@example.com>\n");
        assert_eq!(
            headers.get_decoded("from").unwrap(),
            "José <jose@example.com>"
        );
    }
}
