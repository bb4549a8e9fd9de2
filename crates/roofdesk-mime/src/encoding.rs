//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 encoded words.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decodes Base64 data.
///
/// Whitespace (line breaks inside a transfer-encoded body) is ignored.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045) into raw bytes.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable_bytes(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break
        match bytes.get(i + 1..i + 3) {
            Some([b'\r', b'\n']) => {
                i += 3;
                continue;
            }
            Some([b'\n', _]) => {
                i += 2;
                continue;
            }
            _ => {}
        }
        if bytes.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }

        // Hex encoded byte
        let hex = bytes
            .get(i + 1..i + 3)
            .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        let decoded = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        result.push(decoded);
        i += 3;
    }

    Ok(result)
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences or the
/// decoded bytes are not valid UTF-8.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let bytes = decode_quoted_printable_bytes(text)?;
    String::from_utf8(bytes).map_err(Into::into)
}

/// Converts bytes in the given charset to a string.
///
/// Latin-1 family charsets map byte-for-byte; everything else is treated
/// as UTF-8 with lossy replacement.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: &str) -> String {
    match charset.trim().to_ascii_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "latin-1" | "windows-1252" | "cp1252" => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Decodes a single RFC 2047 encoded word.
///
/// Format: `=?charset?encoding?encoded-text?=`
///
/// # Errors
///
/// Returns an error if the input is not a valid encoded word.
fn decode_encoded_word(word: &str) -> Result<String> {
    let inner = word
        .strip_prefix("=?")
        .and_then(|w| w.strip_suffix("?="))
        .ok_or_else(|| Error::InvalidEncoding("Invalid RFC 2047 format".to_string()))?;

    let parts: Vec<&str> = inner.splitn(3, '?').collect();
    let [charset, encoding, encoded_text] = parts.as_slice() else {
        return Err(Error::InvalidEncoding(
            "Invalid RFC 2047 format".to_string(),
        ));
    };

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(encoded_text)?,
        // Quoted-Printable with underscore for space
        "Q" => decode_quoted_printable_bytes(&encoded_text.replace('_', " "))?,
        other => {
            return Err(Error::InvalidEncoding(format!("Unknown encoding: {other}")));
        }
    };

    Ok(decode_charset(&bytes, charset))
}

/// Decodes RFC 2047 encoded words anywhere inside a header value.
///
/// Plain text between encoded words is kept; whitespace separating two
/// adjacent encoded words is dropped as the RFC requires. Words that fail
/// to decode are left as-is.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    let mut last_was_word = false;

    while let Some(start) = rest.find("=?") {
        let candidate = &rest[start..];
        let Some(end) = find_encoded_word_end(candidate) else {
            break;
        };

        let before = &rest[..start];
        let word = &candidate[..end];

        if let Ok(decoded) = decode_encoded_word(word) {
            if !(last_was_word && before.trim().is_empty()) {
                result.push_str(before);
            }
            result.push_str(&decoded);
            last_was_word = true;
        } else {
            result.push_str(before);
            result.push_str(word);
            last_was_word = false;
        }

        rest = &candidate[end..];
    }

    result.push_str(rest);
    result
}

/// Returns the byte length of the encoded word at the start of `s`.
fn find_encoded_word_end(s: &str) -> Option<usize> {
    // Skip "=?", then charset "?", encoding "?", then look for "?="
    let mut question_marks = 0;
    let bytes = s.as_bytes();
    let mut i = 2;
    while i < bytes.len() {
        if bytes[i] == b'?' {
            question_marks += 1;
            if question_marks >= 3 && bytes.get(i + 1) == Some(&b'=') {
                return Some(i + 2);
            }
        } else if bytes[i].is_ascii_whitespace() {
            return None;
        }
        i += 1;
    }
    None
}
