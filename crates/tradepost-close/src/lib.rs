// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Back-office jobs for the tradepost storefront: the daily close that
//! reconciles the order book against the payment gateway, and the
//! ads-draft generator that turns catalog rows into reviewable copy.

mod drafts;
mod error;
mod job;
mod reconcile;
mod run;

pub use drafts::generate_draft;
pub use error::{CloseError, CloseErrorCode, DraftError, DraftErrorCode};
pub use job::{CloseJob, CloseOptions, MAX_UTC_OFFSET_MINUTES};
pub use reconcile::{dedup_charges, order_totals, reconcile, Reconciliation};
pub use run::{run_close, CloseReport, SummaryMail};

pub const CRATE_NAME: &str = "tradepost-close";
