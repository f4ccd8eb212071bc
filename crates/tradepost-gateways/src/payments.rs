// SPDX-License-Identifier: Apache-2.0

use crate::breaker::FailureGate;
use crate::error::GatewayError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tradepost_model::Order;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub payment_ref: String,
    pub checkout_url: String,
}

/// One settled charge as the provider reports it, used by the close job
/// to reconcile against the order book.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChargeRecord {
    pub charge_id: String,
    pub payment_ref: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub refunded_cents: i64,
    #[serde(default)]
    pub fee_cents: i64,
    pub created_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundOutcome {
    pub payment_ref: String,
    pub refunded_cents: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout session for a pending order.
    async fn create_checkout(&self, order: &Order) -> Result<PaymentSession, GatewayError>;

    /// All charges settled inside `[start_ms, end_ms)`, deduplicated by
    /// charge id. Pagination is the implementation's concern.
    async fn charges_on(&self, start_ms: i64, end_ms: i64)
        -> Result<Vec<ChargeRecord>, GatewayError>;

    async fn refund(&self, payment_ref: &str) -> Result<RefundOutcome, GatewayError>;
}

const CHARGES_PAGE_SIZE: usize = 100;
const BREAKER_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(30);

/// Stripe-shaped HTTP client. Base url and key come from config; every
/// call carries connect and overall timeouts and feeds the failure gate.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    gate: FailureGate,
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChargesEnvelope {
    data: Vec<ChargeRecord>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct RefundEnvelope {
    payment_intent: String,
    amount_refunded: i64,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        if api_key.trim().is_empty() {
            return Err(GatewayError::config("payment api key is empty"));
        }
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http") {
            return Err(GatewayError::config(format!(
                "payment base url {base_url:?} is not http(s)"
            )));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::config(format!("payment http client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            gate: FailureGate::new(BREAKER_THRESHOLD, BREAKER_COOLDOWN),
        })
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
        context: &str,
    ) -> Result<T, GatewayError> {
        self.gate.check(context)?;
        let result = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await;
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                self.gate.record_failure();
                return Err(GatewayError::http(format!("{context}: {e}")));
            }
        };
        if !response.status().is_success() {
            self.gate.record_failure();
            return Err(GatewayError::status(response.status().as_u16(), context));
        }
        self.gate.record_success();
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::decode(format!("{context}: {e}")))
    }

    async fn get_charges_page(
        &self,
        start_ms: i64,
        end_ms: i64,
        starting_after: Option<&str>,
    ) -> Result<ChargesEnvelope, GatewayError> {
        let context = "payment charges";
        self.gate.check(context)?;
        let mut request = self
            .client
            .get(format!("{}/v1/charges", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[
                ("created_gte", start_ms.to_string()),
                ("created_lt", end_ms.to_string()),
                ("limit", CHARGES_PAGE_SIZE.to_string()),
            ]);
        if let Some(cursor) = starting_after {
            request = request.query(&[("starting_after", cursor)]);
        }
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                self.gate.record_failure();
                return Err(GatewayError::http(format!("{context}: {e}")));
            }
        };
        if !response.status().is_success() {
            self.gate.record_failure();
            return Err(GatewayError::status(response.status().as_u16(), context));
        }
        self.gate.record_success();
        response
            .json::<ChargesEnvelope>()
            .await
            .map_err(|e| GatewayError::decode(format!("{context}: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_checkout(&self, order: &Order) -> Result<PaymentSession, GatewayError> {
        let body = serde_json::json!({
            "amount_cents": order.total_cents,
            "currency": order.currency.as_str(),
            "client_reference_id": order.id.as_str(),
            "customer_email": order.email.as_str(),
        });
        let session: SessionEnvelope = self
            .post_json("/v1/checkout/sessions", &body, "payment checkout session")
            .await?;
        Ok(PaymentSession {
            payment_ref: session.id,
            checkout_url: session.url,
        })
    }

    async fn charges_on(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<ChargeRecord>, GatewayError> {
        let mut charges: Vec<ChargeRecord> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .get_charges_page(start_ms, end_ms, cursor.as_deref())
                .await?;
            let last_id = page.data.last().map(|c| c.charge_id.clone());
            for charge in page.data {
                if !charges.iter().any(|c| c.charge_id == charge.charge_id) {
                    charges.push(charge);
                }
            }
            // Short page or an explicit end both stop pagination.
            if !page.has_more {
                break;
            }
            match last_id {
                Some(id) => cursor = Some(id),
                None => break,
            }
        }
        Ok(charges)
    }

    async fn refund(&self, payment_ref: &str) -> Result<RefundOutcome, GatewayError> {
        let body = serde_json::json!({"payment_intent": payment_ref});
        let refund: RefundEnvelope = self
            .post_json("/v1/refunds", &body, "payment refund")
            .await?;
        Ok(RefundOutcome {
            payment_ref: refund.payment_intent,
            refunded_cents: refund.amount_refunded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_validates_config() {
        assert!(HttpPaymentGateway::new("https://pay.example", "sk_test", Duration::from_secs(5))
            .is_ok());
        let err = HttpPaymentGateway::new("https://pay.example", "  ", Duration::from_secs(5))
            .err()
            .expect("blank key is a config error");
        assert_eq!(err.code, crate::GatewayErrorCode::Config);
        let err = HttpPaymentGateway::new("ftp://pay.example", "sk_test", Duration::from_secs(5))
            .err()
            .expect("non-http scheme is a config error");
        assert_eq!(err.code, crate::GatewayErrorCode::Config);
    }

    #[test]
    fn charge_record_deserializes_with_defaults() {
        let record: ChargeRecord = serde_json::from_value(serde_json::json!({
            "charge_id": "ch_1",
            "payment_ref": "pi_1",
            "amount_cents": 1800,
            "created_ms": 1_700_000_000_000_i64
        }))
        .unwrap();
        assert_eq!(record.refunded_cents, 0);
        assert_eq!(record.fee_cents, 0);
    }
}
