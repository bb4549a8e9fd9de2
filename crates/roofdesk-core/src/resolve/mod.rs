//! Field extraction resolver.
//!
//! Mailbox protocols are inconsistent about which fields they fill in. The
//! [`Resolver`] recovers a sender, a body and a subject for any
//! [`MessageDetail`], falling back through progressively weaker sources and
//! recording which one produced the value.
//!
//! Sender order:
//! 1. structured `from`
//! 2. structured `sender`
//! 3. `From:` header of the raw payload
//! 4. `Return-Path:` header of the raw payload
//! 5. first address-shaped token anywhere in the raw payload
//! 6. the configured placeholder
//!
//! Body order: structured body, HTML part, plain-text part, empty.
//!
//! Everything here is pure; no I/O happens during resolution.

mod raw;

use roofdesk_mime::{Address, Message};
use serde::{Deserialize, Serialize};

use crate::config::ResolverConfig;
use crate::mailbox::{MailboxAddress, MessageDetail};

/// Subject stored for messages that have none.
pub const NO_SUBJECT: &str = "(No Subject)";

/// Where a resolved sender came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderSource {
    /// Structured `from` field.
    Structured,
    /// Structured `sender` field.
    SenderField,
    /// `From:` header of the raw payload.
    FromHeader,
    /// `Return-Path:` header of the raw payload.
    ReturnPath,
    /// Address-shaped token found by scanning the raw payload.
    AddressScan,
    /// Nothing found; placeholder assigned.
    Placeholder,
}

/// Where a resolved body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySource {
    /// Structured body field.
    Structured,
    /// HTML part of the raw payload.
    MimeHtml,
    /// Plain-text part of the raw payload.
    MimeText,
    /// No body found.
    None,
}

/// A sender that is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSender {
    /// Email address.
    pub address: String,
    /// Display name; falls back to the address local part.
    pub name: String,
    /// Which step produced the address.
    pub source: SenderSource,
}

/// A body, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBody {
    /// Body content; empty when `source` is [`BodySource::None`].
    pub content: String,
    /// Which step produced the body.
    pub source: BodySource,
}

/// All resolved fields of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Sender.
    pub sender: ResolvedSender,
    /// Body.
    pub body: ResolvedBody,
    /// Subject, never empty.
    pub subject: String,
}

/// Best-effort field resolver.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    /// Creates a resolver with the given placeholder settings.
    #[must_use]
    pub const fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Placeholder sender address.
    #[must_use]
    pub fn placeholder_address(&self) -> String {
        self.config.placeholder_address()
    }

    /// Returns true if `address` is empty or the placeholder.
    #[must_use]
    pub fn is_placeholder(&self, address: &str) -> bool {
        let address = address.trim();
        address.is_empty() || address.eq_ignore_ascii_case(&self.placeholder_address())
    }

    /// Resolves sender, body and subject, parsing the raw payload once.
    #[must_use]
    pub fn resolve(&self, message: &MessageDetail) -> Resolution {
        let parsed = message.raw.as_deref().map(Message::parse);
        Resolution {
            sender: self.sender_with(message, parsed.as_ref()),
            body: Self::body_with(message, parsed.as_ref()),
            subject: Self::subject_with(message, parsed.as_ref()),
        }
    }

    /// Resolves the sender.
    #[must_use]
    pub fn resolve_sender(&self, message: &MessageDetail) -> ResolvedSender {
        let parsed = message.raw.as_deref().map(Message::parse);
        self.sender_with(message, parsed.as_ref())
    }

    /// Resolves the body.
    #[must_use]
    pub fn resolve_body(&self, message: &MessageDetail) -> ResolvedBody {
        let parsed = message.raw.as_deref().map(Message::parse);
        Self::body_with(message, parsed.as_ref())
    }

    fn sender_with(&self, message: &MessageDetail, parsed: Option<&Message>) -> ResolvedSender {
        // A name seen on an earlier step survives into later ones.
        let mut carried_name: Option<String> = None;

        let structured = [
            (message.summary.from.as_ref(), SenderSource::Structured),
            (message.summary.sender.as_ref(), SenderSource::SenderField),
        ];
        for (candidate, source) in structured {
            let Some(MailboxAddress { name, address }) = candidate else {
                continue;
            };
            let name = non_blank(name.as_deref());
            if carried_name.is_none() {
                carried_name.clone_from(&name);
            }
            if let Ok(address) = Address::new(address.trim()) {
                return finish(&address, name.or(carried_name), source);
            }
        }

        if let Some(parsed) = parsed {
            let headers = [
                (raw::from_header(parsed), SenderSource::FromHeader),
                (raw::return_path(parsed), SenderSource::ReturnPath),
            ];
            for (mailbox, source) in headers {
                if let Some(mailbox) = mailbox {
                    let name = non_blank(mailbox.name.as_deref()).or(carried_name);
                    return finish(&mailbox.address, name, source);
                }
            }
        }

        if let Some(address) = message
            .raw
            .as_deref()
            .and_then(raw::scan_address)
            .and_then(|found| Address::new(found).ok())
        {
            return finish(&address, carried_name, SenderSource::AddressScan);
        }

        ResolvedSender {
            address: self.placeholder_address(),
            name: self.config.placeholder_name.clone(),
            source: SenderSource::Placeholder,
        }
    }

    fn body_with(message: &MessageDetail, parsed: Option<&Message>) -> ResolvedBody {
        if let Some(body) = message.summary.body.as_deref()
            && !body.trim().is_empty()
        {
            return ResolvedBody {
                content: body.to_string(),
                source: BodySource::Structured,
            };
        }

        if let Some(parsed) = parsed {
            if let Some(html) = parsed.html_body() {
                return ResolvedBody {
                    content: html,
                    source: BodySource::MimeHtml,
                };
            }
            if let Some(text) = parsed.text_body() {
                return ResolvedBody {
                    content: text,
                    source: BodySource::MimeText,
                };
            }
        }

        ResolvedBody {
            content: String::new(),
            source: BodySource::None,
        }
    }

    fn subject_with(message: &MessageDetail, parsed: Option<&Message>) -> String {
        non_blank(message.summary.subject.as_deref())
            .or_else(|| parsed.and_then(Message::subject).and_then(|s| non_blank(Some(&s))))
            .unwrap_or_else(|| NO_SUBJECT.to_string())
    }
}

fn finish(address: &Address, name: Option<String>, source: SenderSource) -> ResolvedSender {
    ResolvedSender {
        name: name.unwrap_or_else(|| address.local_part().to_string()),
        address: address.as_str().to_string(),
        source,
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
