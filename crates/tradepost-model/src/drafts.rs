// SPDX-License-Identifier: Apache-2.0

use crate::ids::{ParseError, ProductSlug};
use serde::{Deserialize, Serialize};

pub const GOOGLE_HEADLINE_MAX: usize = 30;
pub const GOOGLE_DESCRIPTION_MAX: usize = 90;
pub const META_PRIMARY_MAX: usize = 125;
pub const META_HEADLINE_MAX: usize = 40;

const TONE_MAX_LEN: usize = 60;

/// Ad destinations with their copy shape limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum AdChannel {
    Google,
    Meta,
}

impl AdChannel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Meta => "meta",
        }
    }

    #[must_use]
    pub fn parse_str(input: &str) -> Option<Self> {
        match input {
            "google" => Some(Self::Google),
            "meta" => Some(Self::Meta),
            _ => None,
        }
    }

    #[must_use]
    pub const fn headline_max(self) -> usize {
        match self {
            Self::Google => GOOGLE_HEADLINE_MAX,
            Self::Meta => META_HEADLINE_MAX,
        }
    }

    #[must_use]
    pub const fn body_max(self) -> usize {
        match self {
            Self::Google => GOOGLE_DESCRIPTION_MAX,
            Self::Meta => META_PRIMARY_MAX,
        }
    }

    #[must_use]
    pub const fn headline_count(self) -> usize {
        match self {
            Self::Google => 3,
            Self::Meta => 1,
        }
    }

    #[must_use]
    pub const fn body_count(self) -> usize {
        match self {
            Self::Google => 2,
            Self::Meta => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DraftStatus {
    Proposed,
    Approved,
    Rejected,
}

impl DraftStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn parse_str(input: &str) -> Option<Self> {
        match input {
            "proposed" => Some(Self::Proposed),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: DraftStatus) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Approved) | (Self::Proposed, Self::Rejected)
        )
    }
}

/// Copy variants as parsed out of the model response, before channel
/// limits are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DraftCopy {
    pub headlines: Vec<String>,
    pub body_lines: Vec<String>,
}

impl DraftCopy {
    /// Trims variants to the channel's counts and character limits.
    /// Returns an error when nothing usable remains.
    pub fn clamp_to_channel(mut self, channel: AdChannel) -> Result<Self, ParseError> {
        self.headlines = clamp_variants(self.headlines, channel.headline_count(), channel.headline_max());
        self.body_lines = clamp_variants(self.body_lines, channel.body_count(), channel.body_max());
        if self.headlines.is_empty() {
            return Err(ParseError::Empty("headlines"));
        }
        if self.body_lines.is_empty() {
            return Err(ParseError::Empty("body_lines"));
        }
        Ok(self)
    }
}

fn clamp_variants(variants: Vec<String>, count: usize, max_len: usize) -> Vec<String> {
    variants
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| truncate_on_char_boundary(v, max_len))
        .take(count)
        .collect()
}

fn truncate_on_char_boundary(mut s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let mut cut = max_len;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s.trim_end().to_string()
}

pub fn validate_tone(tone: &str) -> Result<(), ParseError> {
    if tone.is_empty() {
        return Err(ParseError::Empty("tone"));
    }
    if tone.trim() != tone {
        return Err(ParseError::Trimmed("tone"));
    }
    if tone.len() > TONE_MAX_LEN {
        return Err(ParseError::TooLong("tone", TONE_MAX_LEN));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdsDraft {
    pub id: i64,
    pub product_slug: ProductSlug,
    pub channel: AdChannel,
    pub tone: Option<String>,
    pub status: DraftStatus,
    pub copy: DraftCopy,
    pub model: String,
    pub created_at_ms: u64,
    pub reviewed_at_ms: Option<u64>,
}
