//! Header and address extraction from raw transport payloads.

use std::sync::OnceLock;

use regex::Regex;
use roofdesk_mime::{Mailbox, Message};

fn address_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)*\.\w+").expect("valid email address regex")
    })
}

/// Mailbox named by the top-level `From:` header.
pub(super) fn from_header(message: &Message) -> Option<Mailbox> {
    message
        .headers
        .get_decoded("from")
        .and_then(|value| Mailbox::parse(&value))
}

/// Mailbox named by the `Return-Path:` header. A null path (`<>`) yields
/// nothing.
pub(super) fn return_path(message: &Message) -> Option<Mailbox> {
    message.headers.get("return-path").and_then(Mailbox::parse)
}

/// First thing shaped like an email address anywhere in the payload.
pub(super) fn scan_address(raw: &str) -> Option<String> {
    address_regex()
        .find(raw)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}
