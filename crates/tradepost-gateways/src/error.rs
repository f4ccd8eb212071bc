// SPDX-License-Identifier: Apache-2.0

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayErrorCode {
    /// The client was built with unusable settings (bad base url, empty key).
    Config,
    /// The request never completed: connect failure, timeout, dns.
    Http,
    /// The remote answered with a non-success status.
    Status,
    /// The remote answered 2xx but the body did not parse as expected.
    Decode,
    /// The failure gate is open; the call was refused locally.
    Breaker,
}

impl GatewayErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Http => "http",
            Self::Status => "status",
            Self::Decode => "decode",
            Self::Breaker => "breaker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
}

impl GatewayError {
    #[must_use]
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Config, message)
    }

    #[must_use]
    pub fn http(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Http, message)
    }

    #[must_use]
    pub fn status(status: u16, context: &str) -> Self {
        Self::new(
            GatewayErrorCode::Status,
            format!("{context} returned status {status}"),
        )
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Decode, message)
    }

    #[must_use]
    pub fn breaker(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Breaker, message)
    }

    /// Close runs treat these as the gateway being down rather than the
    /// data being wrong.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.code,
            GatewayErrorCode::Http | GatewayErrorCode::Status | GatewayErrorCode::Breaker
        )
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for GatewayError {}
