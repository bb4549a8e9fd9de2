//! # roofdesk-mime
//!
//! Lenient MIME parsing for raw transport payloads returned by a mailbox
//! service.
//!
//! Mailbox protocols frequently hand back messages whose structured fields
//! are empty while the raw RFC 5322 payload still carries the data. This
//! crate turns such a payload into something that can be queried:
//!
//! - **Headers**: case-insensitive lookup with folded-line support
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words
//! - **Content types**: `type/subtype; param=value` parsing
//! - **Multipart**: nested boundary-delimited parts, searched depth-first
//! - **Mailboxes**: `"Name" <addr>`, `<addr>`, `addr (Name)` and bare forms
//!
//! Parsing never fails on malformed input; missing structure simply yields
//! fewer parts.
//!
//! ## Quick Start
//!
//! ```
//! use roofdesk_mime::{Mailbox, Message};
//!
//! let raw = "From: Jane Doe <jane@example.com>\r\n\
//!            Content-Type: text/plain\r\n\
//!            \r\n\
//!            Hello";
//!
//! let message = Message::parse(raw);
//! let from = message.headers.get("from").and_then(Mailbox::parse).unwrap();
//! assert_eq!(from.address.as_str(), "jane@example.com");
//! assert_eq!(from.name.as_deref(), Some("Jane Doe"));
//! assert_eq!(message.text_body().as_deref(), Some("Hello"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use address::{Address, Mailbox};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, Part, TransferEncoding};
