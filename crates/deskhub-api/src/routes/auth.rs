//! # Account Routes
//!
//! - `POST /register` — create an account and return a token
//! - `POST /login`    — exchange credentials for a token
//! - `POST /logout`   — revoke the presenting token (authenticated)
//! - `GET  /user`     — the current user (authenticated)

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::auth::{hash_password, issue_token, verify_password, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, is_valid_email, Validate};
use crate::state::{AppState, UserRecord};

const MAX_FIELD_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 8;

/// Routes reachable without a token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Routes behind the auth middleware.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/user", get(current_user))
}

// -- Request / response types -------------------------------------------------

/// Registration form. Passwords are wiped from memory on drop.
#[derive(Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("The name field is required.".into());
        }
        if name.chars().count() > MAX_FIELD_LEN {
            return Err(format!("The name may not be greater than {MAX_FIELD_LEN} characters."));
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err("The email field is required.".into());
        }
        if email.len() > MAX_FIELD_LEN {
            return Err(format!("The email may not be greater than {MAX_FIELD_LEN} characters."));
        }
        if !is_valid_email(email) {
            return Err("The email must be a valid email address.".into());
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!("The password must be at least {MIN_PASSWORD_LEN} characters."));
        }
        if self.password != self.password_confirmation {
            return Err("The password confirmation does not match.".into());
        }
        Ok(())
    }
}

/// Login form. The password is wiped from memory on drop.
#[derive(Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("The email field is required.".into());
        }
        if self.password.is_empty() {
            return Err("The password field is required.".into());
        }
        Ok(())
    }
}

/// A user and a freshly issued bearer token.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserRecord,
    /// Bearer token, `{token_id}|{secret}`. Shown once.
    pub token: String,
}

/// Plain confirmation message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

// -- Handlers -----------------------------------------------------------------

/// Register a new account.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 422, description = "Invalid form or email already taken", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = extract_validated_json(body)?;
    let email = req.email.trim().to_string();

    if state.find_user_by_email(&email).is_some() {
        return Err(AppError::Validation("The email has already been taken.".into()));
    }

    let password = req.password.clone();
    let iterations = state.config.password_iterations;
    let password_digest =
        tokio::task::spawn_blocking(move || {
            let mut password = password;
            let digest = hash_password(&password, iterations);
            password.zeroize();
            digest
        })
        .await?;

    let role = if state.config.is_admin_email(&email) {
        Role::Admin
    } else {
        Role::User
    };
    let user = UserRecord {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        email,
        role,
        password_digest,
        created_at: Utc::now(),
    };

    let inserted = state.users.insert_unless(user.id, user.clone(), |existing| {
        existing.email.eq_ignore_ascii_case(&user.email)
    });
    if !inserted {
        return Err(AppError::Validation("The email has already been taken.".into()));
    }

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::insert(pool, &user).await {
            state.users.remove(&user.id);
            return Err(AppError::Internal(format!("failed to persist user: {e}")));
        }
    }

    let token = store_token(&state, user.id).await?;
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "user registered");

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

/// Log in with email and password.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let invalid = || AppError::Unauthorized("Invalid credentials".into());

    let user = state.find_user_by_email(&req.email).ok_or_else(invalid)?;

    let password = req.password.clone();
    let stored = user.password_digest.clone();
    let verified = tokio::task::spawn_blocking(move || {
        let mut password = password;
        let ok = verify_password(&password, &stored);
        password.zeroize();
        ok
    })
    .await?;
    if !verified {
        return Err(invalid());
    }

    let token = store_token(&state, user.id).await?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse { user, token }))
}

/// Revoke the token used for this request.
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<MessageResponse>, AppError> {
    state.tokens.remove(&caller.token_id);
    if let Some(pool) = &state.db_pool {
        crate::db::tokens::delete(pool, caller.token_id)
            .await
            .map_err(|e| AppError::Internal(format!("failed to revoke token: {e}")))?;
    }
    tracing::info!(user_id = %caller.user_id, "user logged out");
    Ok(Json(MessageResponse {
        message: "Logged out successfully".into(),
    }))
}

/// The authenticated user.
#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "Current user", body = UserRecord),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn current_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<UserRecord>, AppError> {
    state
        .users
        .get(&caller.user_id)
        .map(Json)
        .ok_or_else(|| AppError::Unauthorized("Unauthenticated.".into()))
}

/// Issue a token for `user_id`, persisting it when a database is configured.
async fn store_token(state: &AppState, user_id: Uuid) -> Result<String, AppError> {
    let (record, plain) = issue_token(user_id);
    if let Some(pool) = &state.db_pool {
        crate::db::tokens::insert(pool, &record)
            .await
            .map_err(|e| AppError::Internal(format!("failed to persist token: {e}")))?;
    }
    state.tokens.insert(record.id, record);
    Ok(plain)
}
