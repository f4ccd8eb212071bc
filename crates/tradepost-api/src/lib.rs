// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Wire contract for the storefront API: error envelope, request and
//! response DTOs, and the machine-readable description of the v1 surface.
//! Everything here is serde-strict; unknown request fields are rejected
//! rather than silently dropped.

mod errors;
mod openapi;
mod requests;
mod responses;

pub use errors::{ApiError, ApiErrorCode};
pub use openapi::openapi_v1_spec;
pub use requests::{
    CheckoutItem, CheckoutRequest, CloseRunRequest, ContactRequest, DraftRequest,
    DraftReviewRequest, NewsletterSignupRequest, ProductUpsertRequest, ReviewDecision,
};
pub use responses::{
    CheckoutResponse, CloseDiscrepancyResponse, CloseRunResponse, ContactMessageResponse,
    ContactResponse, DraftResponse, HealthResponse, OrderLineResponse, OrderListResponse,
    OrderResponse, ProductListResponse, ProductResponse, SubscribeResponse, SubscriberResponse,
    VersionResponse, WebhookAck,
};

pub const CRATE_NAME: &str = "tradepost-api";

const _: fn() = || {
    fn assert_traits<T: serde::Serialize + for<'de> serde::Deserialize<'de>>() {}
    assert_traits::<ApiError>();
    assert_traits::<CheckoutRequest>();
    assert_traits::<ProductResponse>();
    assert_traits::<WebhookAck>();
};
