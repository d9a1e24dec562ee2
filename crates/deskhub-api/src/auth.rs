//! # Authentication & Authorization
//!
//! Bearer token middleware with role-based access control (RBAC).
//!
//! ## Token Format
//!
//! ```text
//! Bearer {token_id}|{secret}
//! ```
//!
//! `token_id` is the UUID of an [`AccessTokenRecord`]; `secret` is 32 random
//! bytes, hex-encoded. Only the SHA-256 digest of the secret is stored, and
//! it is compared in constant time.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use std::fmt;
use std::str::FromStr;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use pbkdf2::pbkdf2_hmac;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::state::{AccessTokenRecord, AppState, UserRecord};

/// PBKDF2-HMAC-SHA256 rounds applied to new password digests.
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 16;
const SECRET_LEN: usize = 32;
const DIGEST_SCHEME: &str = "sha256";

// -- Role ---------------------------------------------------------------------

/// User roles, ordered by privilege level.
///
/// The `Ord` derivation respects variant declaration order
/// (`User < Admin`), so access checks are a single `>=` comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account: chat and project files.
    User,
    /// Additionally sees the admin dashboard.
    Admin,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// -- CallerIdentity -----------------------------------------------------------

/// Identity of the authenticated caller, injected by [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// The token presented with this request (revoked by logout).
    pub token_id: Uuid,
}

impl CallerIdentity {
    /// Check if the caller has at least the given minimum role.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }
}

/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present (middleware didn't run or failed).
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Unauthenticated.".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

// -- Hex ----------------------------------------------------------------------

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Constant-time comparison of secrets.
///
/// When lengths differ, performs a dummy comparison so timing does not
/// reveal the length of the expected value.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

// -- Passwords ----------------------------------------------------------------

fn stretch(salt: &[u8], password: &str, iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations.max(1), &mut key);
    key
}

/// Digest a password with a fresh random salt.
///
/// Format: `sha256$<iterations>$<salt hex>$<digest hex>`.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let iterations = iterations.max(1);
    let digest = stretch(&salt, password, iterations);
    format!(
        "{DIGEST_SCHEME}${iterations}${}${}",
        to_hex(&salt),
        to_hex(&digest)
    )
}

/// Check a password against a stored digest. Malformed digests never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, iterations, salt, expected] = parts.as_slice() else {
        return false;
    };
    if *scheme != DIGEST_SCHEME {
        return false;
    }
    let (Ok(iterations), Some(salt)) = (iterations.parse::<u32>(), from_hex(salt)) else {
        return false;
    };
    let actual = to_hex(&stretch(&salt, password, iterations));
    constant_time_token_eq(&actual, expected)
}

// -- Tokens -------------------------------------------------------------------

/// Hex SHA-256 of a token secret.
pub fn token_digest(secret: &str) -> String {
    to_hex(&Sha256::digest(secret.as_bytes()))
}

/// Create a token for `user_id`.
///
/// Returns the record to store and the plain-text bearer value, which is
/// shown to the client once and never kept.
pub fn issue_token(user_id: Uuid) -> (AccessTokenRecord, String) {
    let mut secret = [0u8; SECRET_LEN];
    OsRng.fill_bytes(&mut secret);
    let secret = to_hex(&secret);
    let record = AccessTokenRecord {
        id: Uuid::new_v4(),
        user_id,
        secret_digest: token_digest(&secret),
        created_at: Utc::now(),
    };
    let plain = format!("{}|{secret}", record.id);
    (record, plain)
}

/// Resolve a bearer value to the caller it belongs to.
pub fn authenticate(state: &AppState, bearer: &str) -> Result<CallerIdentity, String> {
    let (id, secret) = bearer
        .split_once('|')
        .ok_or_else(|| "invalid token format".to_string())?;
    let token_id = Uuid::parse_str(id).map_err(|_| "invalid token format".to_string())?;

    let token = state
        .tokens
        .get(&token_id)
        .ok_or_else(|| "invalid bearer token".to_string())?;
    if !constant_time_token_eq(&token_digest(secret), &token.secret_digest) {
        return Err("invalid bearer token".into());
    }

    let user: UserRecord = state
        .users
        .get(&token.user_id)
        .ok_or_else(|| "token owner no longer exists".to_string())?;

    Ok(CallerIdentity {
        user_id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
        token_id,
    })
}

// -- Middleware ---------------------------------------------------------------

/// Validate the Bearer token and inject the caller's [`CallerIdentity`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header_value) if header_value.starts_with("Bearer ") => {
            let provided = header_value[7..].trim();
            match authenticate(&state, provided) {
                Ok(identity) => {
                    request.extensions_mut().insert(identity);
                    next.run(request).await
                }
                Err(msg) => {
                    tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                    unauthorized_response(&msg)
                }
            }
        }
        Some(_) => {
            tracing::warn!("authentication failed: non-Bearer authorization scheme");
            unauthorized_response("authorization header must use Bearer scheme")
        }
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new("UNAUTHORIZED", message)),
    )
        .into_response()
}
