// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Relational store over SQLite. One writer-friendly connection behind a
//! mutex, schema migrations keyed off `PRAGMA user_version`, and typed
//! errors instead of stringly panics.

mod catalog;
mod close;
mod drafts;
mod engagement;
mod error;
mod orders;
mod schema;
mod store;
mod webhooks;

pub use close::BeginCloseOutcome;
pub use engagement::SubscribeOutcome;
pub use error::{StoreError, StoreErrorCode};
pub use orders::CreateOrderOutcome;
pub use schema::SCHEMA_VERSION;
pub use store::{Store, StoreInspection};
pub use webhooks::{WebhookEventRecord, WebhookOutcome};

pub const CRATE_NAME: &str = "tradepost-store";
