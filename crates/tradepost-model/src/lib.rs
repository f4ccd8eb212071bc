// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Domain model SSOT for the storefront backend.
//!
//! ```compile_fail
//! use tradepost_model::OrderStatus;
//!
//! fn exhaustive_match(s: OrderStatus) -> &'static str {
//!     match s {
//!         OrderStatus::Pending => "p",
//!         OrderStatus::Paid => "d",
//!         OrderStatus::Failed => "f",
//!         OrderStatus::Canceled => "c",
//!         OrderStatus::Fulfilled => "u",
//!         OrderStatus::Refunded => "r",
//!     }
//! }
//! ```

mod catalog;
mod close;
mod drafts;
mod engagement;
mod ids;
mod money;
mod order;

pub use catalog::{Product, DESCRIPTION_MAX_LEN, NAME_MAX_LEN, PRICE_MAX_CENTS};
pub use close::{
    BusinessDate, CloseDiscrepancy, CloseRun, CloseRunStatus, CloseSource, CloseTotals,
    DiscrepancyKind,
};
pub use drafts::{
    validate_tone, AdChannel, AdsDraft, DraftCopy, DraftStatus, GOOGLE_DESCRIPTION_MAX,
    GOOGLE_HEADLINE_MAX, META_HEADLINE_MAX, META_PRIMARY_MAX,
};
pub use engagement::{
    validate_contact_fields, ContactMessage, NewsletterSubscriber, SubscriberStatus,
    CONTACT_BODY_MAX_LEN, CONTACT_NAME_MAX_LEN,
};
pub use ids::{
    EmailAddress, EventId, OrderId, ParseError, ProductSlug, EMAIL_MAX_LEN, EVENT_ID_MAX_LEN,
    SLUG_MAX_LEN,
};
pub use money::{Currency, Money, MoneyError};
pub use order::{
    compute_line_total, compute_order_total, Order, OrderDraft, OrderDraftLine, OrderLine,
    OrderStatus, LINE_MAX_QUANTITY, ORDER_MAX_LINES,
};

pub const CRATE_NAME: &str = "tradepost-model";
