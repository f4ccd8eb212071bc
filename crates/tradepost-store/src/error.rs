// SPDX-License-Identifier: Apache-2.0

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorCode {
    NotFound,
    Conflict,
    Constraint,
    Io,
    Corrupt,
    Internal,
}

impl StoreErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Constraint => "constraint_violation",
            Self::Io => "io_error",
            Self::Corrupt => "corrupt",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::NotFound, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Conflict, message)
    }

    #[must_use]
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Constraint, message)
    }

    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Corrupt, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Internal, message)
    }

    /// Classify a rusqlite failure. Busy/locked surfaces as Conflict so
    /// callers can retry; schema-level trouble surfaces as Corrupt.
    #[must_use]
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::QueryReturnedNoRows => StoreErrorCode::NotFound,
            rusqlite::Error::SqliteFailure(f, _) => match f.code {
                rusqlite::ErrorCode::ConstraintViolation => StoreErrorCode::Constraint,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StoreErrorCode::Conflict
                }
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase => {
                    StoreErrorCode::Corrupt
                }
                rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::DiskFull => {
                    StoreErrorCode::Io
                }
                _ => StoreErrorCode::Internal,
            },
            _ => StoreErrorCode::Internal,
        };
        Self::new(code, err.to_string())
    }

    #[must_use]
    pub fn is_constraint(&self) -> bool {
        self.code == StoreErrorCode::Constraint
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for StoreError {}
