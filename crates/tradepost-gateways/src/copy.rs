// SPDX-License-Identifier: Apache-2.0

use crate::breaker::FailureGate;
use crate::error::GatewayError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// A single completion request. The system message pins the output
/// contract; the user message carries the product facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPrompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CopyModel: Send + Sync {
    async fn complete(&self, prompt: &CopyPrompt) -> Result<String, GatewayError>;

    /// Recorded alongside each stored draft so reviews know what wrote it.
    fn model_name(&self) -> &str;
}

/// Chat-completions-shaped HTTP client. The draft generator owns prompt
/// construction and output validation; this client only moves text.
pub struct HttpCopyModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    gate: FailureGate,
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

impl HttpCopyModel {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        if api_key.trim().is_empty() {
            return Err(GatewayError::config("copy model api key is empty"));
        }
        if model.trim().is_empty() {
            return Err(GatewayError::config("copy model name is empty"));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::config(format!("copy model http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            gate: FailureGate::new(5, Duration::from_secs(60)),
        })
    }
}

#[async_trait]
impl CopyModel for HttpCopyModel {
    async fn complete(&self, prompt: &CopyPrompt) -> Result<String, GatewayError> {
        let context = "copy completion";
        self.gate.check(context)?;
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": prompt.max_tokens,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        });
        let result = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
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
        let envelope = response
            .json::<CompletionEnvelope>()
            .await
            .map_err(|e| GatewayError::decode(format!("{context}: {e}")))?;
        envelope
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::decode(format!("{context}: response has no choices")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_validates_config() {
        assert!(HttpCopyModel::new(
            "https://llm.example",
            "sk-key",
            "gpt-4o-mini",
            Duration::from_secs(30)
        )
        .is_ok());
        assert!(
            HttpCopyModel::new("https://llm.example", "", "gpt-4o-mini", Duration::from_secs(30))
                .is_err()
        );
        assert!(
            HttpCopyModel::new("https://llm.example", "sk-key", "", Duration::from_secs(30))
                .is_err()
        );
    }

    #[test]
    fn completion_envelope_extracts_first_choice() {
        let envelope: CompletionEnvelope = serde_json::from_value(serde_json::json!({
            "choices": [
                {"message": {"role": "assistant", "content": "first"}},
                {"message": {"role": "assistant", "content": "second"}}
            ]
        }))
        .unwrap();
        assert_eq!(envelope.choices[0].message.content, "first");
    }
}
