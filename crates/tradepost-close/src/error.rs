// SPDX-License-Identifier: Apache-2.0

use std::fmt::{Display, Formatter};
use tradepost_store::{StoreError, StoreErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CloseErrorCode {
    /// The options never made a runnable job (future date, absurd offset).
    Options,
    /// The date already has a live run that blocks this claim.
    AlreadyClosed,
    Store,
    Gateway,
}

impl CloseErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Options => "options",
            Self::AlreadyClosed => "already_closed",
            Self::Store => "store",
            Self::Gateway => "gateway",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseError {
    pub code: CloseErrorCode,
    pub message: String,
}

impl CloseError {
    #[must_use]
    pub fn new(code: CloseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn options(message: impl Into<String>) -> Self {
        Self::new(CloseErrorCode::Options, message)
    }

    #[must_use]
    pub fn already_closed(message: impl Into<String>) -> Self {
        Self::new(CloseErrorCode::AlreadyClosed, message)
    }
}

impl From<StoreError> for CloseError {
    fn from(err: StoreError) -> Self {
        Self::new(CloseErrorCode::Store, err.to_string())
    }
}

impl Display for CloseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for CloseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DraftErrorCode {
    Validation,
    NotFound,
    /// The copy model call itself failed.
    Gateway,
    /// The model answered but the answer was not usable copy.
    Decode,
    Store,
}

impl DraftErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Gateway => "gateway",
            Self::Decode => "decode",
            Self::Store => "store",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftError {
    pub code: DraftErrorCode,
    pub message: String,
}

impl DraftError {
    #[must_use]
    pub fn new(code: DraftErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(DraftErrorCode::Validation, message)
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(DraftErrorCode::Decode, message)
    }
}

impl From<StoreError> for DraftError {
    fn from(err: StoreError) -> Self {
        let code = match err.code {
            StoreErrorCode::NotFound => DraftErrorCode::NotFound,
            _ => DraftErrorCode::Store,
        };
        Self::new(code, err.to_string())
    }
}

impl Display for DraftError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for DraftError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_by_code() {
        let err: CloseError = StoreError::conflict("busy".to_string()).into();
        assert_eq!(err.code, CloseErrorCode::Store);

        let err: DraftError = StoreError::not_found("product mug".to_string()).into();
        assert_eq!(err.code, DraftErrorCode::NotFound);
        let err: DraftError = StoreError::constraint("bad".to_string()).into();
        assert_eq!(err.code, DraftErrorCode::Store);
    }

    #[test]
    fn display_carries_code() {
        let err = CloseError::already_closed("close for 2026-08-20 already balanced");
        assert_eq!(
            err.to_string(),
            "already_closed: close for 2026-08-20 already balanced"
        );
    }
}
