// SPDX-License-Identifier: Apache-2.0

use crate::ids::{EmailAddress, OrderId, ParseError, ProductSlug};
use crate::money::{Currency, Money, MoneyError};
use serde::{Deserialize, Serialize};

pub const ORDER_MAX_LINES: usize = 25;
pub const LINE_MAX_QUANTITY: u32 = 99;

/// Lifecycle of an order. Transitions outside `can_transition_to` are
/// store-level constraint violations, not best-effort updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Canceled,
    Fulfilled,
    Refunded,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Fulfilled => "fulfilled",
            Self::Refunded => "refunded",
        }
    }

    #[must_use]
    pub fn parse_str(input: &str) -> Option<Self> {
        match input {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "canceled" => Some(Self::Canceled),
            "fulfilled" => Some(Self::Fulfilled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Canceled)
                | (Self::Paid, Self::Fulfilled)
                | (Self::Paid, Self::Refunded)
                | (Self::Fulfilled, Self::Refunded)
        )
    }

    /// Orders in these states settled money and belong in a daily close.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Paid | Self::Fulfilled | Self::Refunded)
    }
}

/// One catalog line inside an order. Name and unit price are snapshots
/// taken at checkout so later catalog edits cannot rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderLine {
    pub product_slug: ProductSlug,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Order {
    pub id: OrderId,
    pub email: EmailAddress,
    pub status: OrderStatus,
    pub currency: Currency,
    pub total_cents: i64,
    pub payment_ref: Option<String>,
    pub idempotency_key: Option<String>,
    pub lines: Vec<OrderLine>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub paid_at_ms: Option<u64>,
}

/// What checkout asks for before the catalog is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub email: EmailAddress,
    pub lines: Vec<OrderDraftLine>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraftLine {
    pub slug: ProductSlug,
    pub quantity: u32,
}

impl OrderDraft {
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.lines.is_empty() {
            return Err(ParseError::Empty("items"));
        }
        if self.lines.len() > ORDER_MAX_LINES {
            return Err(ParseError::TooLong("items", ORDER_MAX_LINES));
        }
        for line in &self.lines {
            if line.quantity == 0 || line.quantity > LINE_MAX_QUANTITY {
                return Err(ParseError::InvalidFormat(
                    "quantity must be between 1 and 99",
                ));
            }
        }
        for (i, line) in self.lines.iter().enumerate() {
            if self.lines[..i].iter().any(|prior| prior.slug == line.slug) {
                return Err(ParseError::InvalidFormat(
                    "items must not repeat a product",
                ));
            }
        }
        if let Some(key) = &self.idempotency_key {
            if key.is_empty() || key.len() > 128 || key.bytes().any(|b| !b.is_ascii_graphic()) {
                return Err(ParseError::InvalidFormat(
                    "idempotency_key must be 1..=128 printable ascii characters",
                ));
            }
        }
        Ok(())
    }
}

pub fn compute_line_total(
    unit_price_cents: i64,
    currency: Currency,
    quantity: u32,
) -> Result<i64, MoneyError> {
    let unit = Money::non_negative(unit_price_cents, currency)?;
    Ok(unit.checked_mul(quantity)?.cents)
}

pub fn compute_order_total(lines: &[OrderLine], currency: Currency) -> Result<i64, MoneyError> {
    let mut total = Money::from_cents(0, currency);
    for line in lines {
        total = total.checked_add(Money::non_negative(line.line_total_cents, currency)?)?;
    }
    Ok(total.cents)
}
