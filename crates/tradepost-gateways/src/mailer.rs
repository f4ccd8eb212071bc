// SPDX-License-Identifier: Apache-2.0

use crate::breaker::FailureGate;
use crate::error::GatewayError;
use async_trait::async_trait;
use std::time::Duration;
use tradepost_model::EmailAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: EmailAddress,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), GatewayError>;
}

/// Resend-shaped transactional mailer: JSON POST to `/emails` with
/// bearer auth. Senders treat failures as warnings; mail never blocks
/// an order or a close run.
pub struct HttpMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from: String,
    gate: FailureGate,
}

impl HttpMailer {
    pub fn new(
        base_url: &str,
        api_key: &str,
        from: &str,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        if api_key.trim().is_empty() {
            return Err(GatewayError::config("mailer api key is empty"));
        }
        if from.trim().is_empty() {
            return Err(GatewayError::config("mailer from address is empty"));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::config(format!("mailer http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
            gate: FailureGate::new(5, Duration::from_secs(60)),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), GatewayError> {
        let context = "mailer send";
        self.gate.check(context)?;
        let body = serde_json::json!({
            "from": self.from,
            "to": [email.to.as_str()],
            "subject": email.subject,
            "text": email.text,
        });
        let result = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
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
        Ok(())
    }
}
