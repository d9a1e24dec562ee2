//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "DeskHub API",
        version = "0.1.0",
        description = "Accounts, chat proxy, project file manager and admin dashboard.",
        license(name = "MIT")
    ),
    paths(
        // Accounts
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::current_user,
        // Chat
        crate::routes::chat::chat,
        // Files
        crate::routes::files::list_files,
        crate::routes::files::upload_project,
        crate::routes::files::read_file,
        crate::routes::files::write_file,
        crate::routes::files::delete_entry,
        // Admin
        crate::routes::admin::stats,
        crate::routes::admin::list_users,
    ),
    components(schemas(
        crate::auth::Role,
        crate::state::UserRecord,
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::auth::RegisterRequest,
        crate::routes::auth::LoginRequest,
        crate::routes::auth::AuthResponse,
        crate::routes::auth::MessageResponse,
        crate::routes::chat::ChatRequest,
        crate::routes::chat::ChatResponse,
        crate::routes::files::ListResponse,
        crate::routes::files::UploadResponse,
        crate::routes::files::ContentResponse,
        crate::routes::files::WriteRequest,
        crate::routes::files::FileMessage,
        crate::routes::admin::StatsResponse,
        crate::routes::admin::UsersResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login and tokens"),
        (name = "chat", description = "Chat completion proxy"),
        (name = "files", description = "Project file manager"),
        (name = "admin", description = "Admin dashboard"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
