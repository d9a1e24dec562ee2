//! # deskhub-api — Axum API Services for DeskHub
//!
//! Accounts with bearer tokens, a chat proxy to an OpenAI-compatible
//! completion API, the project file manager backed by
//! [`deskhub_core::ProjectFileStore`], and an admin dashboard.
//!
//! ## API Surface
//!
//! | Prefix / Path          | Module                | Auth            |
//! |------------------------|-----------------------|-----------------|
//! | `/register`, `/login`  | [`routes::auth`]      | none            |
//! | `/logout`, `/user`     | [`routes::auth`]      | bearer          |
//! | `/chat`                | [`routes::chat`]      | none            |
//! | `/files/*`             | [`routes::files`]     | bearer          |
//! | `/admin/*`             | [`routes::admin`]     | bearer + admin  |
//! | `/openapi.json`        | [`openapi`]           | none            |
//! | `/health/*`, `/metrics`| this module           | none            |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → RateLimitMiddleware → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};

use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::RateLimiter;
use crate::state::AppState;

/// Body limit for every route except the upload.
const JSON_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks and `/metrics` are mounted outside the rate limiter and
/// the auth middleware.
pub fn app(state: AppState) -> Router {
    let metrics = ApiMetrics::new();
    let limiter = RateLimiter::new(state.config.rate_limit.clone());

    let protected = Router::new()
        .merge(routes::auth::protected_router())
        .merge(routes::files::router(state.config.max_upload_bytes))
        .merge(routes::admin::router())
        .route_layer(from_fn_with_state(state.clone(), auth::auth_middleware));

    let api = Router::new()
        .merge(routes::auth::public_router())
        .merge(routes::chat::router())
        .merge(openapi::router())
        .merge(protected)
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware));

    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics));

    Router::new()
        .merge(ops)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(Extension(metrics))
        .layer(Extension(limiter))
        .with_state(state)
}

/// Liveness check: always 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: 503 when a configured database cannot be reached.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::ping(pool).await {
            tracing::error!(error = %e, "readiness check failed: database unreachable");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable");
        }
    }
    (StatusCode::OK, "ready")
}

/// Prometheus scrape endpoint. Domain gauges are refreshed on each scrape.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    metrics.users_total().set(state.users.len() as f64);

    let project = state.project.clone();
    match tokio::task::spawn_blocking(move || project.count_files()).await {
        Ok(Ok(files)) => metrics.project_files_total().set(files as f64),
        Ok(Err(e)) => tracing::warn!(error = %e, "could not count project files for metrics"),
        Err(e) => tracing::warn!(error = %e, "project file count task failed"),
    }

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_checks_need_no_token() {
        let (status, body) = get_text(app(AppState::new()), "/health/liveness").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");

        let (status, body) = get_text(app(AppState::new()), "/health/readiness").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ready");
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        for uri in ["/user", "/files", "/admin/stats"] {
            let (status, body) = get_text(app(AppState::new()), uri).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert!(body.contains("UNAUTHORIZED"));
        }
    }

    #[tokio::test]
    async fn unknown_route_is_not_found_rather_than_unauthorized() {
        let (status, _) = get_text(app(AppState::new()), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_endpoint_reports_gauges() {
        let (status, body) = get_text(app(AppState::new()), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("deskhub_users_total 0"));
        assert!(body.contains("deskhub_project_files_total 0"));
    }

    #[tokio::test]
    async fn rate_limit_returns_429() {
        let config = state::AppConfig {
            rate_limit: middleware::rate_limit::RateLimitConfig {
                max_requests: 2,
                window_secs: 60,
            },
            ..state::AppConfig::default()
        };
        let app = app(AppState::with_config(config, None));

        for _ in 0..2 {
            let (status, _) = get_text(app.clone(), "/openapi.json").await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = get_text(app, "/openapi.json").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body.contains("RATE_LIMITED"));
    }
}
