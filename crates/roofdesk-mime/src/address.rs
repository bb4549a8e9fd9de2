//! Email address types.

use crate::error::{Error, Result};

/// A syntactically plausible email address.
///
/// Validation is deliberately shallow: one `@` with non-empty local and
/// domain parts and no whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the part before the `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(local, _)| local)
    }

    /// Returns the part after the `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }

    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        if addr.contains(char::is_whitespace) {
            return Err(Error::InvalidAddress(
                "Address cannot contain whitespace".into(),
            ));
        }

        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress("Address must contain @".into()));
        };

        if domain.contains('@') {
            return Err(Error::InvalidAddress(
                "Address must have exactly one @".into(),
            ));
        }

        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(
                "Local and domain parts cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mailbox (optional display name + address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Email address.
    pub address: Address,
}

impl Mailbox {
    /// Creates a new mailbox with just an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: None,
            address: Address::new(address)?,
        })
    }

    /// Creates a new mailbox with a display name and address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: Some(name.into()),
            address: Address::new(address)?,
        })
    }

    /// Parses the first mailbox out of a header value.
    ///
    /// Accepted forms:
    /// - `"Jane Doe" <jane@example.com>`
    /// - `Jane Doe <jane@example.com>`
    /// - `<jane@example.com>`
    /// - `jane@example.com (Jane Doe)`
    /// - `jane@example.com`
    ///
    /// Returns `None` when no valid address can be found.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();

        if let Some(open) = value.find('<') {
            let rest = &value[open + 1..];
            let close = rest.find('>')?;
            let address = Address::new(rest[..close].trim()).ok()?;
            let name = clean_display_name(&value[..open]);
            return Some(Self { name, address });
        }

        if let Some(open) = value.find('(') {
            let address = Address::new(value[..open].trim()).ok()?;
            let comment = value[open + 1..].trim_end();
            let comment = comment.strip_suffix(')').unwrap_or(comment);
            let name = clean_display_name(comment);
            return Some(Self { name, address });
        }

        // A bare list like "a@x, b@y" yields the first entry.
        let first = value.split(',').next().unwrap_or(value);
        Address::new(first.trim())
            .ok()
            .map(|address| Self { name: None, address })
    }
}

fn clean_display_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .replace("\\\"", "\"");
    let name = unquoted.trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.local_part(), "user");
        assert_eq!(addr.domain(), "example.com");
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(Address::new("userexample.com").is_err());
        assert!(Address::new("").is_err());
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
        assert!(Address::new("a@b@c").is_err());
        assert!(Address::new("jane doe@example.com").is_err());
    }

    #[test]
    fn test_mailbox_with_name() {
        let mailbox = Mailbox::with_name("John Doe", "john@example.com").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("John Doe"));
        assert_eq!(mailbox.address.as_str(), "john@example.com");
    }

    #[test]
    fn test_parse_quoted_name() {
        let mailbox = Mailbox::parse("\"Doe, Jane\" <jane@example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Doe, Jane"));
        assert_eq!(mailbox.address.as_str(), "jane@example.com");
    }

    #[test]
    fn test_parse_unquoted_name() {
        let mailbox = Mailbox::parse("Jane Doe <jane@example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_parse_angle_only() {
        let mailbox = Mailbox::parse("<jane@example.com>").unwrap();
        assert!(mailbox.name.is_none());
        assert_eq!(mailbox.address.as_str(), "jane@example.com");
    }

    #[test]
    fn test_parse_comment_name() {
        let mailbox = Mailbox::parse("jane@example.com (Jane Doe)").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_parse_bare_and_list() {
        let mailbox = Mailbox::parse(" jane@example.com ").unwrap();
        assert_eq!(mailbox.address.as_str(), "jane@example.com");

        let mailbox = Mailbox::parse("a@example.com, b@example.com").unwrap();
        assert_eq!(mailbox.address.as_str(), "a@example.com");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Mailbox::parse("").is_none());
        assert!(Mailbox::parse("<>").is_none());
        assert!(Mailbox::parse("Jane Doe").is_none());
        assert!(Mailbox::parse("Jane <unterminated@example.com").is_none());
    }
}
