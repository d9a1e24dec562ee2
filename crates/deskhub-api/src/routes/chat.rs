//! # Chat Proxy
//!
//! `POST /chat` forwards one user message to the completion API and
//! returns the first choice. Conversation history is kept by the client.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

const NOT_CONFIGURED: &str = "OpenAI API key not configured";
const UPSTREAM_FAILED: &str = "Failed to get response from AI";

/// Build the chat router.
pub fn router() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

/// A message from the user.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
}

impl Validate for ChatRequest {
    fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("The message field is required.".into());
        }
        Ok(())
    }
}

/// The assistant's reply, echoed together with the user's message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub message: String,
}

/// Send a message to the completion API.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 422, description = "Empty message", body = crate::error::ErrorBody),
        (status = 500, description = "Completion API unavailable", body = crate::error::ErrorBody),
    ),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let req = extract_validated_json(body)?;

    let client = state.chat.as_ref().ok_or_else(|| {
        tracing::error!("chat request received but no completion API key is configured");
        AppError::Upstream(NOT_CONFIGURED.into())
    })?;

    let response = client.complete(&req.message).await.map_err(|e| {
        tracing::error!(error = %e, model = client.model(), "completion request failed");
        AppError::Upstream(UPSTREAM_FAILED.into())
    })?;

    Ok(Json(ChatResponse {
        response,
        message: req.message,
    }))
}
