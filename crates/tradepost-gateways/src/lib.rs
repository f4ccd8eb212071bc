// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Clients for everything tradepost talks to over the network: the
//! payment provider, the transactional mailer, and the copy model. Each
//! sits behind a trait so the server, the close job, and tests swap in
//! fakes without touching call sites.

mod breaker;
mod copy;
mod error;
mod fakes;
mod mailer;
mod payments;
pub mod webhook;

pub use copy::{CopyModel, CopyPrompt, HttpCopyModel};
pub use error::{GatewayError, GatewayErrorCode};
pub use fakes::{FakeCopyModel, FakeMailer, FakePaymentGateway};
pub use mailer::{Email, HttpMailer, Mailer};
pub use payments::{
    ChargeRecord, HttpPaymentGateway, PaymentGateway, PaymentSession, RefundOutcome,
};
pub use webhook::{WebhookEvent, WebhookEventKind, WebhookVerifyError};

pub const CRATE_NAME: &str = "tradepost-gateways";
