// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const SLUG_MAX_LEN: usize = 64;
pub const EMAIL_MAX_LEN: usize = 320;
pub const EVENT_ID_MAX_LEN: usize = 128;

const ORDER_ID_PREFIX: &str = "ord_";
const ORDER_ID_HEX_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    Empty(&'static str),
    Trimmed(&'static str),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty(name) => write!(f, "{name} must not be empty"),
            Self::Trimmed(name) => {
                write!(f, "{name} must not contain leading/trailing whitespace")
            }
            Self::TooLong(name, max) => write!(f, "{name} exceeds max length {max}"),
            Self::InvalidFormat(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ParseError {}

/// URL identity of a catalog product. Lowercase alphanumerics and single
/// dashes, never at the ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct ProductSlug(String);

impl ProductSlug {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("slug"));
        }
        if input.trim() != input {
            return Err(ParseError::Trimmed("slug"));
        }
        if input.len() > SLUG_MAX_LEN {
            return Err(ParseError::TooLong("slug", SLUG_MAX_LEN));
        }
        if !input
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(ParseError::InvalidFormat(
                "slug must be lowercase ascii alphanumerics and dashes",
            ));
        }
        if input.starts_with('-') || input.ends_with('-') {
            return Err(ParseError::InvalidFormat(
                "slug must not start or end with a dash",
            ));
        }
        Ok(Self(input.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProductSlug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public order identity handed to customers, `ord_` plus 12 hex digits.
/// The database rowid never leaves the store layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct OrderId(String);

impl OrderId {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("order_id"));
        }
        if input.trim() != input {
            return Err(ParseError::Trimmed("order_id"));
        }
        let Some(hex_part) = input.strip_prefix(ORDER_ID_PREFIX) else {
            return Err(ParseError::InvalidFormat("order_id must start with ord_"));
        };
        if hex_part.len() != ORDER_ID_HEX_LEN
            || !hex_part
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(ParseError::InvalidFormat(
                "order_id must be ord_ followed by 12 lowercase hex digits",
            ));
        }
        Ok(Self(input.to_string()))
    }

    /// Mints an id from a 48-bit nonce. Uniqueness is the caller's concern;
    /// the store enforces it with a UNIQUE column.
    #[must_use]
    pub fn mint(nonce: u64) -> Self {
        Self(format!("{ORDER_ID_PREFIX}{:012x}", nonce & 0xffff_ffff_ffff))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized (lowercased) email address. Validation is deliberately
/// shallow: one `@`, a dotted domain, printable ascii. Deliverability is
/// the mailer's problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("email"));
        }
        if input.trim() != input {
            return Err(ParseError::Trimmed("email"));
        }
        if input.len() > EMAIL_MAX_LEN {
            return Err(ParseError::TooLong("email", EMAIL_MAX_LEN));
        }
        if input.bytes().any(|b| !b.is_ascii_graphic()) {
            return Err(ParseError::InvalidFormat(
                "email must be printable ascii without spaces",
            ));
        }
        let mut parts = input.splitn(2, '@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(ParseError::InvalidFormat(
                "email must contain exactly one @ with text on both sides",
            ));
        }
        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(ParseError::InvalidFormat(
                "email domain must contain an interior dot",
            ));
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Webhook event identity as supplied by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct EventId(String);

impl EventId {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("event_id"));
        }
        if input.trim() != input {
            return Err(ParseError::Trimmed("event_id"));
        }
        if input.len() > EVENT_ID_MAX_LEN {
            return Err(ParseError::TooLong("event_id", EVENT_ID_MAX_LEN));
        }
        if input.bytes().any(|b| !b.is_ascii_graphic()) {
            return Err(ParseError::InvalidFormat(
                "event_id must be printable ascii without whitespace",
            ));
        }
        Ok(Self(input.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
