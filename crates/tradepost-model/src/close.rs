// SPDX-License-Identifier: Apache-2.0

use crate::ids::{OrderId, ParseError};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A calendar day in the shop's bookkeeping timezone, `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct BusinessDate(NaiveDate);

impl BusinessDate {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("date"));
        }
        if input.len() != 10 {
            return Err(ParseError::InvalidFormat("date must be YYYY-MM-DD"));
        }
        let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .map_err(|_| ParseError::InvalidFormat("date must be YYYY-MM-DD"))?;
        Ok(Self(date))
    }

    #[must_use]
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// The day this utc instant falls on once the shop's offset is applied.
    #[must_use]
    pub fn from_utc_millis(utc_ms: i64, utc_offset_minutes: i32) -> Option<Self> {
        let shifted = utc_ms.checked_add(i64::from(utc_offset_minutes) * 60_000)?;
        DateTime::from_timestamp_millis(shifted).map(|dt| Self(dt.date_naive()))
    }

    /// Utc millisecond window `[start, end)` covering this local day.
    #[must_use]
    pub fn day_window_utc_ms(self, utc_offset_minutes: i32) -> Option<(i64, i64)> {
        let offset_ms = i64::from(utc_offset_minutes) * 60_000;
        let start = self.0.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis() - offset_ms;
        let next = self.0.succ_opt()?;
        let end = next.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis() - offset_ms;
        Some((start, end))
    }

    #[must_use]
    pub fn pred(self) -> Option<Self> {
        self.0.pred_opt().map(Self)
    }

    #[must_use]
    pub const fn as_naive(self) -> NaiveDate {
        self.0
    }
}

impl Display for BusinessDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Run-tracking states. A run is Running exactly while the job holds it;
/// every finish path lands in one terminal state and stays there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum CloseRunStatus {
    Running,
    Balanced,
    Discrepant,
    Failed,
}

impl CloseRunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Balanced => "balanced",
            Self::Discrepant => "discrepant",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse_str(input: &str) -> Option<Self> {
        match input {
            "running" => Some(Self::Running),
            "balanced" => Some(Self::Balanced),
            "discrepant" => Some(Self::Discrepant),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: CloseRunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Balanced)
                | (Self::Running, Self::Discrepant)
                | (Self::Running, Self::Failed)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum CloseSource {
    Cli,
    Scheduler,
    Admin,
}

impl CloseSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Scheduler => "scheduler",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse_str(input: &str) -> Option<Self> {
        match input {
            "cli" => Some(Self::Cli),
            "scheduler" => Some(Self::Scheduler),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DiscrepancyKind {
    MissingCharge,
    MissingOrder,
    AmountMismatch,
}

impl DiscrepancyKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingCharge => "missing_charge",
            Self::MissingOrder => "missing_order",
            Self::AmountMismatch => "amount_mismatch",
        }
    }

    #[must_use]
    pub fn parse_str(input: &str) -> Option<Self> {
        match input {
            "missing_charge" => Some(Self::MissingCharge),
            "missing_order" => Some(Self::MissingOrder),
            "amount_mismatch" => Some(Self::AmountMismatch),
            _ => None,
        }
    }

    #[must_use]
    pub const fn sort_rank(self) -> u8 {
        match self {
            Self::MissingCharge => 0,
            Self::MissingOrder => 1,
            Self::AmountMismatch => 2,
        }
    }
}

/// One mismatch surfaced by reconciliation. `amount_delta_cents` is order
/// minus gateway for mismatches, the stranded amount otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseDiscrepancy {
    pub kind: DiscrepancyKind,
    pub order_id: Option<OrderId>,
    pub charge_id: Option<String>,
    pub detail: String,
    pub amount_delta_cents: i64,
}

impl CloseDiscrepancy {
    /// Stable ordering so re-runs over identical inputs write identical rows.
    #[must_use]
    pub fn sort_key(&self) -> (u8, String, String) {
        (
            self.kind.sort_rank(),
            self.order_id
                .as_ref()
                .map(|o| o.as_str().to_string())
                .unwrap_or_default(),
            self.charge_id.clone().unwrap_or_default(),
        )
    }
}

/// Money totals for one close run. Order-side and gateway-side figures
/// are kept separate; `delta_cents` is the headline comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseTotals {
    pub orders_count: u64,
    pub gross_cents: i64,
    pub refunds_cents: i64,
    pub net_cents: i64,
    pub gateway_gross_cents: i64,
    pub gateway_refunds_cents: i64,
    pub gateway_fees_cents: i64,
    pub delta_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseRun {
    pub id: i64,
    pub business_date: BusinessDate,
    pub attempt: u32,
    pub status: CloseRunStatus,
    pub superseded: bool,
    pub totals: CloseTotals,
    pub discrepancy_count: u64,
    pub source: CloseSource,
    pub error: Option<String>,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
}
