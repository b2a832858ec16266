use engage_core::{ConfigError, CoreError, LlmConfig, LlmError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";
const OPENAI_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait ChatModel {
    /// Returns the assistant's reply text.
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for `/chat/completions` style APIs (OpenRouter, OpenAI).
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleChat {
    client: Client,
    provider: String,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleChat {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CoreError> {
        let default_base = match config.provider.as_str() {
            "openrouter" => OPENROUTER_BASE,
            "openai" => OPENAI_BASE,
            other => {
                return Err(ConfigError::UnsupportedProvider {
                    provider: other.to_string(),
                }
                .into())
            }
        };

        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidApiKey {
                provider: config.provider.clone(),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            provider: config.provider.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn map_status(&self, model: &str, status: StatusCode, retry_after: Option<u64>) -> LlmError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidApiKey {
                provider: self.provider.clone(),
            },
            StatusCode::NOT_FOUND => LlmError::ModelNotAvailable {
                model: model.to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded {
                provider: self.provider.clone(),
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmError::RequestTimeout {
                provider: self.provider.clone(),
            },
            _ => LlmError::ServiceUnavailable {
                provider: self.provider.clone(),
                status_code: status.as_u16(),
            },
        }
    }
}

impl ChatModel for OpenAiCompatibleChat {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        debug!(provider = %self.provider, model = %model, "Sending chat completion");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model,
                messages,
                temperature: 0.0,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::RequestTimeout {
                        provider: self.provider.clone(),
                    }
                } else {
                    warn!(provider = %self.provider, error = %e, "Chat request failed");
                    LlmError::ServiceUnavailable {
                        provider: self.provider.clone(),
                        status_code: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(self.map_status(model, status, retry_after));
        }

        let body: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponseFormat {
                    model: model.to_string(),
                    details: e.to_string(),
                })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponseFormat {
                model: model.to_string(),
                details: "response has no message content".to_string(),
            })
    }
}
