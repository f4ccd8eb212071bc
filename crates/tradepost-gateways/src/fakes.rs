// SPDX-License-Identifier: Apache-2.0

//! In-memory gateway doubles. Tests and the offline CLI paths script
//! what each call returns and inspect what was asked of them afterward.

use crate::copy::{CopyModel, CopyPrompt};
use crate::error::GatewayError;
use crate::mailer::{Email, Mailer};
use crate::payments::{ChargeRecord, PaymentGateway, PaymentSession, RefundOutcome};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tradepost_model::Order;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Fake payment provider. Checkout sessions are minted from a counter,
/// `charges_on` returns whatever was scripted, and refunds are recorded.
#[derive(Default)]
pub struct FakePaymentGateway {
    session_counter: AtomicU64,
    charges: Mutex<Vec<ChargeRecord>>,
    refunds: Mutex<Vec<String>>,
    fail_next: AtomicBool,
}

impl FakePaymentGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the charge list the next `charges_on` window filters over.
    pub fn script_charges(&self, charges: Vec<ChargeRecord>) {
        *lock(&self.charges) = charges;
    }

    /// The next call of any kind fails with a transient http error.
    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn refund_calls(&self) -> Vec<String> {
        lock(&self.refunds).clone()
    }

    fn take_failure(&self) -> Result<(), GatewayError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(GatewayError::http("scripted failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_checkout(&self, order: &Order) -> Result<PaymentSession, GatewayError> {
        self.take_failure()?;
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentSession {
            payment_ref: format!("pi_fake_{n:04}"),
            checkout_url: format!("https://pay.invalid/session/{}", order.id.as_str()),
        })
    }

    async fn charges_on(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<ChargeRecord>, GatewayError> {
        self.take_failure()?;
        Ok(lock(&self.charges)
            .iter()
            .filter(|c| c.created_ms >= start_ms && c.created_ms < end_ms)
            .cloned()
            .collect())
    }

    async fn refund(&self, payment_ref: &str) -> Result<RefundOutcome, GatewayError> {
        self.take_failure()?;
        lock(&self.refunds).push(payment_ref.to_string());
        let refunded_cents = lock(&self.charges)
            .iter()
            .find(|c| c.payment_ref == payment_ref)
            .map_or(0, |c| c.amount_cents);
        Ok(RefundOutcome {
            payment_ref: payment_ref.to_string(),
            refunded_cents,
        })
    }
}

/// Records every email instead of sending it.
#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<Email>>,
    fail_next: AtomicBool,
}

impl FakeMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: &Email) -> Result<(), GatewayError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::http("scripted failure"));
        }
        lock(&self.sent).push(email.clone());
        Ok(())
    }
}

/// Pops scripted responses in order and remembers the prompts it saw.
/// An empty queue is a decode error, which surfaces scripting mistakes
/// in tests instead of hanging on defaults.
#[derive(Default)]
pub struct FakeCopyModel {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<CopyPrompt>>,
    fail_next: AtomicBool,
}

impl FakeCopyModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_response(&self, response: impl Into<String>) {
        lock(&self.responses).push_back(response.into());
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<CopyPrompt> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl CopyModel for FakeCopyModel {
    async fn complete(&self, prompt: &CopyPrompt) -> Result<String, GatewayError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::http("scripted failure"));
        }
        lock(&self.prompts).push(prompt.clone());
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| GatewayError::decode("no scripted response left"))
    }

    fn model_name(&self) -> &str {
        "fake-copy-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradepost_model::{
        Currency, EmailAddress, OrderId, OrderLine, OrderStatus, ProductSlug,
    };

    fn order() -> Order {
        Order {
            id: OrderId::mint(1),
            email: EmailAddress::parse("buyer@example.com").unwrap(),
            status: OrderStatus::Pending,
            currency: Currency::Usd,
            total_cents: 6100,
            payment_ref: None,
            idempotency_key: None,
            lines: vec![OrderLine {
                product_slug: ProductSlug::parse("walnut-board").unwrap(),
                name: "Walnut board".to_string(),
                unit_price_cents: 6100,
                quantity: 1,
                line_total_cents: 6100,
            }],
            created_at_ms: 1_700_000_000_000,
            updated_at_ms: 1_700_000_000_000,
            paid_at_ms: None,
        }
    }

    #[tokio::test]
    async fn checkout_sessions_are_distinct() {
        let gateway = FakePaymentGateway::new();
        let a = gateway.create_checkout(&order()).await.unwrap();
        let b = gateway.create_checkout(&order()).await.unwrap();
        assert_ne!(a.payment_ref, b.payment_ref);
    }

    #[tokio::test]
    async fn scripted_charges_respect_the_window() {
        let gateway = FakePaymentGateway::new();
        gateway.script_charges(vec![
            ChargeRecord {
                charge_id: "ch_in".to_string(),
                payment_ref: "pi_1".to_string(),
                amount_cents: 100,
                refunded_cents: 0,
                fee_cents: 3,
                created_ms: 500,
            },
            ChargeRecord {
                charge_id: "ch_out".to_string(),
                payment_ref: "pi_2".to_string(),
                amount_cents: 200,
                refunded_cents: 0,
                fee_cents: 6,
                created_ms: 2_000,
            },
        ]);
        let charges = gateway.charges_on(0, 1_000).await.unwrap();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].charge_id, "ch_in");
    }

    #[tokio::test]
    async fn scripted_failure_fires_once() {
        let gateway = FakePaymentGateway::new();
        gateway.fail_next_call();
        assert!(gateway.charges_on(0, 1_000).await.is_err());
        assert!(gateway.charges_on(0, 1_000).await.is_ok());
    }

    #[tokio::test]
    async fn refunds_are_recorded() {
        let gateway = FakePaymentGateway::new();
        gateway.refund("pi_9").await.unwrap();
        assert_eq!(gateway.refund_calls(), vec!["pi_9".to_string()]);
    }

    #[tokio::test]
    async fn mailer_records_and_copy_model_pops_in_order() {
        let mailer = FakeMailer::new();
        mailer
            .send(&Email {
                to: EmailAddress::parse("buyer@example.com").unwrap(),
                subject: "Receipt".to_string(),
                text: "Thanks".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(mailer.sent().len(), 1);

        let model = FakeCopyModel::new();
        model.script_response("one");
        model.script_response("two");
        let prompt = CopyPrompt {
            system: "s".to_string(),
            user: "u".to_string(),
            max_tokens: 64,
        };
        assert_eq!(model.complete(&prompt).await.unwrap(), "one");
        assert_eq!(model.complete(&prompt).await.unwrap(), "two");
        assert!(model.complete(&prompt).await.is_err());
        assert_eq!(model.prompts().len(), 3);
    }
}
