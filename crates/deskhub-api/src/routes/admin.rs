//! # Admin Dashboard
//!
//! Read-only statistics for users with the `admin` role.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::state::{AppState, UserRecord};

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/users", get(list_users))
}

/// Dashboard counters.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_users: usize,
    pub total_files: usize,
    /// Always 0: chat history is kept by the client.
    pub total_chats: usize,
}

/// All users, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct UsersResponse {
    pub success: bool,
    pub users: Vec<UserRecord>,
    pub count: usize,
}

/// Dashboard statistics.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Counters", body = StatsResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn stats(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<StatsResponse>, AppError> {
    require_role(&caller, Role::Admin)?;

    let project = state.project.clone();
    let total_files = tokio::task::spawn_blocking(move || project.count_files()).await??;

    Ok(Json(StatsResponse {
        total_users: state.users.len(),
        total_files,
        total_chats: 0,
    }))
}

/// List every registered user.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "Users ordered by creation time, newest first", body = UsersResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn list_users(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<UsersResponse>, AppError> {
    require_role(&caller, Role::Admin)?;

    let mut users = state.users.list();
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.email.cmp(&b.email)));
    let count = users.len();

    Ok(Json(UsersResponse {
        success: true,
        users,
        count,
    }))
}
