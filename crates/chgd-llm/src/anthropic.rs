use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use chgd_core::chat::{ChatMessage, ChatRole};
use chgd_core::errors::GatewayError;
use chgd_core::generate::{GenerateOptions, TextGenerator};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Non-streaming Messages API client.
pub struct AnthropicGenerator {
    client: Client,
    api_key: SecretString,
    model: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicGenerator {
    pub fn new(api_key: SecretString, model: Option<&str>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        })
    }

    fn build_body(
        &self,
        system: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> serde_json::Value {
        let messages: Vec<_> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        json!({
            "model": self.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "system": system,
            "messages": messages,
        })
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, system, messages, options), fields(model = %self.model))]
    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<String, GatewayError> {
        let body = self.build_body(system, messages, options);

        let resp = self
            .client
            .post(API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(REQUEST_TIMEOUT)
                } else {
                    GatewayError::NetworkError(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::NetworkError(format!("decode response: {e}")))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect();

        if text.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "response contained no text content".into(),
            ));
        }

        Ok(text)
    }
}
