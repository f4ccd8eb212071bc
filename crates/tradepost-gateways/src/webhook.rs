// SPDX-License-Identifier: Apache-2.0

//! Stripe-style webhook signatures: `t=<unix seconds>,v1=<hmac hex>`,
//! where the mac covers `"{t}.{body}"`. Verification runs before any
//! body parsing so a forged payload never reaches serde.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::{Display, Formatter};
use tradepost_model::EventId;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WebhookVerifyError {
    MissingTimestamp,
    MissingSignature,
    MalformedTimestamp,
    TimestampOutsideTolerance { skew_secs: u64 },
    NoMatchingSignature,
}

impl Display for WebhookVerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTimestamp => f.write_str("signature header has no t= element"),
            Self::MissingSignature => f.write_str("signature header has no v1= element"),
            Self::MalformedTimestamp => f.write_str("signature timestamp is not an integer"),
            Self::TimestampOutsideTolerance { skew_secs } => {
                write!(f, "signature timestamp is {skew_secs}s outside tolerance")
            }
            Self::NoMatchingSignature => f.write_str("no v1 signature matches the payload"),
        }
    }
}

impl std::error::Error for WebhookVerifyError {}

fn mac_hex(secret: &str, timestamp: u64, body: &[u8]) -> String {
    // Keys of any length are valid for HMAC; new_from_slice cannot fail.
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Produces a header the verifier accepts. Used by tests and by
/// `tradepost webhook sign` for rehearsing integrations.
#[must_use]
pub fn sign(secret: &str, timestamp: u64, body: &[u8]) -> String {
    format!("t={timestamp},v1={}", mac_hex(secret, timestamp, body))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Checks the header against the raw body. Element order in the header
/// does not matter and multiple v1 entries are allowed (key rotation);
/// one match is enough.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now_unix: u64,
    tolerance_secs: u64,
) -> Result<(), WebhookVerifyError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for element in header.split(',') {
        let Some((key, value)) = element.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(WebhookVerifyError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(WebhookVerifyError::MissingSignature);
    }
    let timestamp: u64 = timestamp
        .parse()
        .map_err(|_| WebhookVerifyError::MalformedTimestamp)?;
    let skew = now_unix.abs_diff(timestamp);
    if skew > tolerance_secs {
        return Err(WebhookVerifyError::TimestampOutsideTolerance { skew_secs: skew });
    }
    let expected = mac_hex(secret, timestamp, body);
    if signatures.iter().any(|s| constant_time_eq(s, &expected)) {
        Ok(())
    } else {
        Err(WebhookVerifyError::NoMatchingSignature)
    }
}

/// The payment events this shop acts on. Everything else parses to
/// `Ignored` and is acked without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WebhookEventKind {
    PaymentSucceeded {
        payment_ref: String,
        amount_cents: i64,
    },
    PaymentFailed {
        payment_ref: String,
    },
    ChargeRefunded {
        payment_ref: String,
        refunded_cents: i64,
    },
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: EventId,
    pub event_type: String,
    pub kind: WebhookEventKind,
}

impl WebhookEvent {
    /// Parses a verified body. Only called after the signature check.
    pub fn from_body(body: &[u8]) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| format!("event body is not json: {e}"))?;
        let id = value["id"]
            .as_str()
            .ok_or_else(|| "event has no id".to_string())?;
        let id = EventId::parse(id).map_err(|e| format!("event id: {e}"))?;
        let event_type = value["type"]
            .as_str()
            .ok_or_else(|| "event has no type".to_string())?
            .to_string();
        let object = &value["data"]["object"];

        let kind = match event_type.as_str() {
            "payment_intent.succeeded" => WebhookEventKind::PaymentSucceeded {
                payment_ref: object_str(object, "id")?,
                amount_cents: object["amount"].as_i64().unwrap_or(0),
            },
            "payment_intent.payment_failed" => WebhookEventKind::PaymentFailed {
                payment_ref: object_str(object, "id")?,
            },
            "charge.refunded" => WebhookEventKind::ChargeRefunded {
                payment_ref: object_str(object, "payment_intent")?,
                refunded_cents: object["amount_refunded"].as_i64().unwrap_or(0),
            },
            _ => WebhookEventKind::Ignored,
        };
        Ok(Self {
            id,
            event_type,
            kind,
        })
    }
}

fn object_str(object: &serde_json::Value, field: &str) -> Result<String, String> {
    object[field]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("event object has no {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    #[test]
    fn sign_then_verify_round_trips() {
        let body = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let header = sign(SECRET, 1_700_000_000, body);
        assert!(verify_signature(SECRET, &header, body, 1_700_000_000, 300).is_ok());
        // Within tolerance on either side.
        assert!(verify_signature(SECRET, &header, body, 1_700_000_299, 300).is_ok());
        assert!(verify_signature(SECRET, &header, body, 1_699_999_701, 300).is_ok());
    }

    #[test]
    fn reordered_elements_and_extra_schemes_still_verify() {
        let body = b"payload";
        let mac = sign(SECRET, 100, body);
        let v1 = mac.split_once("v1=").unwrap().1.to_string();
        let reordered = format!("v0=garbage, v1={v1}, t=100");
        assert!(verify_signature(SECRET, &reordered, body, 100, 300).is_ok());
        let rotated = format!("t=100,v1=deadbeef,v1={v1}");
        assert!(verify_signature(SECRET, &rotated, body, 100, 300).is_ok());
    }

    #[test]
    fn skew_beyond_tolerance_rejected_both_directions() {
        let body = b"payload";
        let header = sign(SECRET, 1_000, body);
        assert_eq!(
            verify_signature(SECRET, &header, body, 1_301, 300),
            Err(WebhookVerifyError::TimestampOutsideTolerance { skew_secs: 301 })
        );
        // Future-dated headers are just as invalid.
        assert_eq!(
            verify_signature(SECRET, &header, body, 699, 300),
            Err(WebhookVerifyError::TimestampOutsideTolerance { skew_secs: 301 })
        );
    }

    #[test]
    fn missing_elements_and_wrong_secret_rejected() {
        let body = b"payload";
        let header = sign(SECRET, 100, body);
        assert_eq!(
            verify_signature(SECRET, "v1=abc", body, 100, 300),
            Err(WebhookVerifyError::MissingTimestamp)
        );
        assert_eq!(
            verify_signature(SECRET, "t=100", body, 100, 300),
            Err(WebhookVerifyError::MissingSignature)
        );
        assert_eq!(
            verify_signature(SECRET, "t=soon,v1=abc", body, 100, 300),
            Err(WebhookVerifyError::MalformedTimestamp)
        );
        assert_eq!(
            verify_signature("whsec_other", &header, body, 100, 300),
            Err(WebhookVerifyError::NoMatchingSignature)
        );
        // Tampered body fails even with a valid header shape.
        assert_eq!(
            verify_signature(SECRET, &header, b"tampered", 100, 300),
            Err(WebhookVerifyError::NoMatchingSignature)
        );
    }

    #[test]
    fn event_parsing_extracts_the_acted_on_fields() {
        let body = json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_9", "amount": 6100}}
        });
        let event = WebhookEvent::from_body(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            event.kind,
            WebhookEventKind::PaymentSucceeded {
                payment_ref: "pi_9".to_string(),
                amount_cents: 6100
            }
        );

        let body = json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1", "payment_intent": "pi_9", "amount_refunded": 6100}}
        });
        let event = WebhookEvent::from_body(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            event.kind,
            WebhookEventKind::ChargeRefunded {
                payment_ref: "pi_9".to_string(),
                refunded_cents: 6100
            }
        );
    }

    #[test]
    fn unknown_types_parse_to_ignored() {
        let body = json!({
            "id": "evt_3",
            "type": "customer.created",
            "data": {"object": {"id": "cus_1"}}
        });
        let event = WebhookEvent::from_body(body.to_string().as_bytes()).unwrap();
        assert_eq!(event.kind, WebhookEventKind::Ignored);
        assert_eq!(event.event_type, "customer.created");
    }

    #[test]
    fn malformed_events_are_errors_not_panics() {
        assert!(WebhookEvent::from_body(b"not json").is_err());
        assert!(WebhookEvent::from_body(br#"{"type":"payment_intent.succeeded"}"#).is_err());
        let no_ref = json!({
            "id": "evt_4",
            "type": "payment_intent.succeeded",
            "data": {"object": {}}
        });
        assert!(WebhookEvent::from_body(no_ref.to_string().as_bytes()).is_err());
    }
}
