// SPDX-License-Identifier: Apache-2.0

use crate::ids::{EmailAddress, ParseError};
use serde::{Deserialize, Serialize};

pub const CONTACT_NAME_MAX_LEN: usize = 120;
pub const CONTACT_BODY_MAX_LEN: usize = 4000;

/// Double-opt-in lifecycle. An unsubscribed address stays unsubscribed;
/// signing up again starts a fresh row only after the old one is purged
/// out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SubscriberStatus {
    Pending,
    Confirmed,
    Unsubscribed,
}

impl SubscriberStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Unsubscribed => "unsubscribed",
        }
    }

    #[must_use]
    pub fn parse_str(input: &str) -> Option<Self> {
        match input {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "unsubscribed" => Some(Self::Unsubscribed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: SubscriberStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Unsubscribed)
                | (Self::Confirmed, Self::Unsubscribed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewsletterSubscriber {
    pub email: EmailAddress,
    pub status: SubscriberStatus,
    pub token: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactMessage {
    pub id: i64,
    pub name: String,
    pub email: EmailAddress,
    pub body: String,
    pub resolved: bool,
    pub created_at_ms: u64,
}

pub fn validate_contact_fields(name: &str, body: &str) -> Result<(), ParseError> {
    if name.is_empty() {
        return Err(ParseError::Empty("name"));
    }
    if name.trim() != name {
        return Err(ParseError::Trimmed("name"));
    }
    if name.len() > CONTACT_NAME_MAX_LEN {
        return Err(ParseError::TooLong("name", CONTACT_NAME_MAX_LEN));
    }
    if body.trim().is_empty() {
        return Err(ParseError::Empty("message"));
    }
    if body.len() > CONTACT_BODY_MAX_LEN {
        return Err(ParseError::TooLong("message", CONTACT_BODY_MAX_LEN));
    }
    Ok(())
}
