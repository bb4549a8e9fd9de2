//! Lenient MIME message parsing.
//!
//! [`Message::parse`] never fails. Headers that cannot be read are skipped,
//! parts without a recognisable boundary collapse into a single body, and
//! undecodable transfer encodings fall back to the raw text.

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable_bytes};
use crate::header::Headers;
use std::fmt;

/// Nesting limit for multipart bodies.
const MAX_DEPTH: usize = 16;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string. Unknown values mean 7bit.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// A MIME entity: headers, a raw body, and any nested parts.
#[derive(Debug, Clone, Default)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Raw body text, still transfer-encoded.
    pub body: String,
    /// Nested parts when this entity is multipart.
    pub parts: Vec<Self>,
}

impl Part {
    fn parse(raw: &str, depth: usize) -> Self {
        let (header_text, body) = split_headers_body(raw);
        let headers = Headers::parse(header_text);
        let mut part = Self {
            headers,
            body: body.to_string(),
            parts: Vec::new(),
        };

        if depth < MAX_DEPTH {
            let content_type = part.content_type();
            if content_type.is_multipart()
                && let Some(boundary) = content_type.boundary()
            {
                part.parts = split_multipart(body, boundary)
                    .into_iter()
                    .map(|chunk| Self::parse(chunk, depth + 1))
                    .collect();
            }
        }

        part
    }

    /// Gets the content type, defaulting to `text/plain` when the header is
    /// missing or unreadable.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Returns true if the part is marked as an attachment.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.headers
            .get("content-disposition")
            .is_some_and(|d| d.trim_start().to_ascii_lowercase().starts_with("attachment"))
    }

    /// Decodes the body according to its transfer encoding and charset.
    ///
    /// If the body cannot be decoded the raw text is returned unchanged.
    #[must_use]
    pub fn decoded_text(&self) -> String {
        let charset = self.content_type().charset().unwrap_or("utf-8").to_string();
        let bytes = match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&self.body),
            TransferEncoding::QuotedPrintable => decode_quoted_printable_bytes(&self.body),
            _ => return self.body.clone(),
        };
        bytes.map_or_else(|_| self.body.clone(), |b| decode_charset(&b, &charset))
    }

    /// Finds the first non-attachment leaf part of type `main/sub`,
    /// searching depth-first.
    #[must_use]
    pub fn find(&self, main: &str, sub: &str) -> Option<&Self> {
        if self.parts.is_empty() {
            return (!self.is_attachment() && self.content_type().matches(main, sub))
                .then_some(self);
        }
        self.parts.iter().find_map(|part| part.find(main, sub))
    }
}

/// A parsed message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Top-level headers.
    pub headers: Headers,
    root: Part,
}

impl Message {
    /// Parses a raw RFC 5322 payload.
    ///
    /// Input without a header block is treated as a bare body.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let root = Part::parse(raw, 0);
        Self {
            headers: root.headers.clone(),
            root,
        }
    }

    /// The top-level entity.
    #[must_use]
    pub const fn root(&self) -> &Part {
        &self.root
    }

    /// Nested parts; empty for single-part messages.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.root.parts
    }

    /// Gets the Subject header with encoded words decoded.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers.get_decoded("subject")
    }

    /// First `text/html` body, decoded. Blank bodies count as absent.
    #[must_use]
    pub fn html_body(&self) -> Option<String> {
        self.body_of("text", "html")
    }

    /// First `text/plain` body, decoded. Blank bodies count as absent.
    #[must_use]
    pub fn text_body(&self) -> Option<String> {
        self.body_of("text", "plain")
    }

    fn body_of(&self, main: &str, sub: &str) -> Option<String> {
        self.root
            .find(main, sub)
            .map(Part::decoded_text)
            .filter(|text| !text.trim().is_empty())
    }
}

/// Splits an entity into its header block and body.
///
/// An entity that starts with a blank line has no headers. When there is no
/// blank line at all the text is treated as headers if any parse, and as a
/// body otherwise.
fn split_headers_body(text: &str) -> (&str, &str) {
    if let Some(rest) = text.strip_prefix("\r\n").or_else(|| text.strip_prefix('\n')) {
        return ("", rest);
    }

    let crlf = text.find("\r\n\r\n").map(|idx| (idx, 4));
    let lf = text.find("\n\n").map(|idx| (idx, 2));
    let separator = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match separator {
        Some((idx, len)) => (&text[..idx], &text[idx + len..]),
        None if Headers::parse(text).is_empty() => ("", text),
        None => (text, ""),
    }
}

/// Splits a multipart body into its raw parts.
///
/// The preamble before the first delimiter and everything after the closing
/// delimiter are dropped. A body with no delimiter yields no parts.
fn split_multipart<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    let closing = format!("--{boundary}--");
    let body = body.find(&closing).map_or(body, |end| &body[..end]);

    body.split(delimiter.as_str())
        .skip(1)
        .map(|chunk| {
            // Drop the remainder of the delimiter line.
            let chunk = chunk.split_once('\n').map_or("", |(_, rest)| rest);
            chunk
                .strip_suffix("\r\n")
                .or_else(|| chunk.strip_suffix('\n'))
                .unwrap_or(chunk)
        })
        .filter(|chunk| !chunk.trim().is_empty())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALTERNATIVE: &str = "From: Jane <jane@example.com>\r\n\
        Subject: Roof quote\r\n\
        Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
        \r\n\
        preamble\r\n\
        --b1\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        Plain quote\r\n\
        --b1\r\n\
        Content-Type: text/html; charset=utf-8\r\n\
        Content-Transfer-Encoding: quoted-printable\r\n\
        \r\n\
        <p>Quote =E2=82=AC500</p>\r\n\
        --b1--\r\n\
        epilogue";

    #[test]
    fn test_single_part_plain() {
        let message = Message::parse("Subject: hi\n\nHello there");
        assert!(message.parts().is_empty());
        assert_eq!(message.text_body().as_deref(), Some("Hello there"));
        assert!(message.html_body().is_none());
    }

    #[test]
    fn test_single_part_html() {
        let raw = "Content-Type: text/html\r\n\r\n<b>Hi</b>";
        let message = Message::parse(raw);
        assert_eq!(message.html_body().as_deref(), Some("<b>Hi</b>"));
        assert!(message.text_body().is_none());
    }

    #[test]
    fn test_multipart_alternative() {
        let message = Message::parse(ALTERNATIVE);
        assert_eq!(message.parts().len(), 2);
        assert_eq!(message.text_body().as_deref(), Some("Plain quote"));
        assert_eq!(message.html_body().as_deref(), Some("<p>Quote €500</p>"));
        assert_eq!(message.subject().as_deref(), Some("Roof quote"));
    }

    #[test]
    fn test_nested_multipart() {
        let raw = "Content-Type: multipart/mixed; boundary=outer\n\
            \n\
            --outer\n\
            Content-Type: multipart/alternative; boundary=inner\n\
            \n\
            --inner\n\
            Content-Type: text/html\n\
            Content-Transfer-Encoding: base64\n\
            \n\
            PGgxPk5lc3RlZDwvaDE+\n\
            --inner--\n\
            --outer\n\
            Content-Type: text/html\n\
            Content-Disposition: attachment; filename=a.html\n\
            \n\
            <p>attachment</p>\n\
            --outer--\n";
        let message = Message::parse(raw);
        assert_eq!(message.html_body().as_deref(), Some("<h1>Nested</h1>"));
    }

    #[test]
    fn test_attachment_is_not_a_body() {
        let raw = "Content-Type: multipart/mixed; boundary=x\n\n\
            --x\n\
            Content-Type: text/plain\n\
            Content-Disposition: attachment\n\
            \n\
            not a body\n\
            --x--\n";
        assert!(Message::parse(raw).text_body().is_none());
    }

    #[test]
    fn test_bad_base64_falls_back_to_raw() {
        let raw = "Content-Type: text/plain\nContent-Transfer-Encoding: base64\n\n!!not-b64!!";
        assert_eq!(Message::parse(raw).text_body().as_deref(), Some("!!not-b64!!"));
    }

    #[test]
    fn test_latin1_charset() {
        let raw = "Content-Type: text/plain; charset=iso-8859-1\n\
            Content-Transfer-Encoding: quoted-printable\n\nCaf=E9";
        assert_eq!(Message::parse(raw).text_body().as_deref(), Some("Café"));
    }

    #[test]
    fn test_missing_boundary_keeps_body() {
        let raw = "Content-Type: multipart/mixed\n\nno boundary here";
        let message = Message::parse(raw);
        assert!(message.parts().is_empty());
        assert_eq!(message.root().body, "no boundary here");
    }

    #[test]
    fn test_bare_body_without_headers() {
        let message = Message::parse("just a body line");
        assert!(message.headers.is_empty());
        assert_eq!(message.text_body().as_deref(), Some("just a body line"));
    }

    #[test]
    fn test_part_without_headers() {
        let raw = "Content-Type: multipart/mixed; boundary=z\n\n--z\n\nheaderless\n--z--";
        let message = Message::parse(raw);
        assert_eq!(message.text_body().as_deref(), Some("headerless"));
    }

    #[test]
    fn test_blank_body_is_absent() {
        assert!(Message::parse("Subject: x\n\n   \n").text_body().is_none());
    }

    proptest! {
        #[test]
        fn parse_never_panics(raw in "\\PC{0,400}") {
            let message = Message::parse(&raw);
            let _ = message.html_body();
            let _ = message.text_body();
        }

        #[test]
        fn parse_never_panics_on_multipart_shapes(
            body in "(--b\r?\n|Content-Type: [a-z/]{0,12}\r?\n|\r?\n|[ -~]{0,20})*"
        ) {
            let raw = format!("Content-Type: multipart/mixed; boundary=b\r\n\r\n{body}");
            let message = Message::parse(&raw);
            let _ = message.html_body();
            let _ = message.text_body();
        }
    }
}
