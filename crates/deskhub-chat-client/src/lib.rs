//! # deskhub-chat-client -- Typed client for chat completion APIs
//!
//! Sends a single-prompt conversation to an OpenAI-compatible
//! `chat/completions` endpoint and returns the first choice.
//!
//! ## Behaviour
//!
//! - Requests carry `Authorization: Bearer <key>` as a default header.
//! - Transport failures are retried with exponential backoff
//!   (200ms, 400ms, 800ms). Error statuses are not retried.
//! - Non-2xx responses surface as [`ChatApiError::ApiError`] with the
//!   response body, which callers must log rather than forward.

pub mod config;
pub mod error;
pub(crate) mod retry;
pub mod types;

pub use config::{ChatApiConfig, ConfigError};
pub use error::ChatApiError;
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, Role};

use std::time::Duration;

const COMPLETIONS_PATH: &str = "chat/completions";

/// Client for a chat completion API.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    completions_url: url::Url,
    model: String,
}

impl ChatClient {
    /// Create a client from configuration.
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let completions_url = config.base_url.join(COMPLETIONS_PATH).map_err(|e| {
            ChatApiError::Config(ConfigError::InvalidUrl(
                config.base_url.to_string(),
                e.to_string(),
            ))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                let mut value =
                    reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.as_str()))
                        .map_err(|_| ChatApiError::Config(ConfigError::MissingApiKey))?;
                value.set_sensitive(true);
                headers.insert(reqwest::header::AUTHORIZATION, value);
                headers
            })
            .build()
            .map_err(|e| ChatApiError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;

        Ok(Self {
            http,
            completions_url,
            model: config.model,
        })
    }

    /// Model name sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a full conversation and return the parsed response.
    ///
    /// Calls `POST {base_url}chat/completions`.
    pub async fn create_completion(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<CompletionResponse, ChatApiError> {
        let endpoint = "POST /chat/completions";
        let req = CompletionRequest {
            model: self.model.clone(),
            messages,
        };

        let resp = retry::retry_send(|| self.http.post(self.completions_url.clone()).json(&req).send())
            .await
            .map_err(|e| ChatApiError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatApiError::ApiError {
                endpoint: endpoint.into(),
                status,
                body,
            });
        }

        resp.json().await.map_err(|e| ChatApiError::Deserialization {
            endpoint: endpoint.into(),
            source: e,
        })
    }

    /// Send one user prompt and return the first choice's content.
    pub async fn complete(&self, prompt: &str) -> Result<String, ChatApiError> {
        let resp = self.create_completion(vec![ChatMessage::user(prompt)]).await?;
        if let Some(usage) = &resp.usage {
            tracing::debug!(
                model = self.model.as_str(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion received"
            );
        }
        resp.first_content()
            .map(str::to_string)
            .ok_or_else(|| ChatApiError::EmptyCompletion {
                endpoint: "POST /chat/completions".into(),
            })
    }
}
