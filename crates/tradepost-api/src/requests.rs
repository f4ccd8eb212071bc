// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutItem {
    pub slug: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutRequest {
    pub email: String,
    pub items: Vec<CheckoutItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewsletterSignupRequest {
    pub email: String,
}

/// `website` is a honeypot: browsers never fill it, bots do. A non-empty
/// value is accepted with a 202 and the message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl ContactRequest {
    #[must_use]
    pub fn looks_like_bot(&self) -> bool {
        self.website.as_deref().is_some_and(|w| !w.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductUpsertRequest {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub position: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DraftRequest {
    pub slug: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DraftReviewRequest {
    pub decision: ReviewDecision,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseRunRequest {
    /// Defaults to yesterday in the shop timezone when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checkout_rejects_unknown_fields() {
        let ok = json!({"email": "a@b.co", "items": [{"slug": "mug", "quantity": 1}]});
        assert!(serde_json::from_value::<CheckoutRequest>(ok).is_ok());
        let bad = json!({"email": "a@b.co", "items": [], "coupon": "SAVE10"});
        assert!(serde_json::from_value::<CheckoutRequest>(bad).is_err());
    }

    #[test]
    fn contact_honeypot_detection() {
        let human: ContactRequest =
            serde_json::from_value(json!({"name": "Ada", "email": "a@b.co", "message": "hi"}))
                .unwrap();
        assert!(!human.looks_like_bot());
        let bot: ContactRequest = serde_json::from_value(
            json!({"name": "Bot", "email": "b@b.co", "message": "hi", "website": "spam.example"}),
        )
        .unwrap();
        assert!(bot.looks_like_bot());
        let empty_honeypot: ContactRequest = serde_json::from_value(
            json!({"name": "Ada", "email": "a@b.co", "message": "hi", "website": ""}),
        )
        .unwrap();
        assert!(!empty_honeypot.looks_like_bot());
    }

    #[test]
    fn product_upsert_defaults() {
        let req: ProductUpsertRequest = serde_json::from_value(json!({
            "slug": "mug",
            "name": "Mug",
            "price_cents": 1800,
            "currency": "usd"
        }))
        .unwrap();
        assert!(req.active);
        assert_eq!(req.position, 0);
        assert_eq!(req.description, "");
    }

    #[test]
    fn close_run_request_defaults_to_yesterday() {
        let req: CloseRunRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.date, None);
        assert!(!req.force);
    }

    #[test]
    fn review_decision_parses_lowercase() {
        let req: DraftReviewRequest =
            serde_json::from_value(json!({"decision": "approved"})).unwrap();
        assert_eq!(req.decision, ReviewDecision::Approved);
        assert!(serde_json::from_value::<DraftReviewRequest>(json!({"decision": "maybe"})).is_err());
    }
}
