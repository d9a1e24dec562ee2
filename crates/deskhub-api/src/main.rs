//! # deskhub-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for DeskHub. Configuration comes from CLI
//! flags with environment-variable fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use deskhub_api::middleware::rate_limit::RateLimitConfig;
use deskhub_api::state::{AppConfig, AppState};
use deskhub_chat_client::{ChatApiConfig, ChatClient};
use deskhub_core::{DEFAULT_PROJECT_ROOT, MAX_ARCHIVE_BYTES};

/// DeskHub API server.
#[derive(Parser, Debug)]
#[command(name = "deskhub-api", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Directory for project files. Files are kept in memory when unset.
    #[arg(long, env = "DESKHUB_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Storage key of the project root.
    #[arg(long, env = "DESKHUB_PROJECT_ROOT", default_value = DEFAULT_PROJECT_ROOT)]
    project_root: String,

    /// Comma-separated emails that register with the admin role.
    #[arg(long, env = "DESKHUB_ADMIN_EMAILS", value_delimiter = ',')]
    admin_emails: Vec<String>,

    /// Largest accepted project archive in bytes.
    #[arg(long, env = "DESKHUB_MAX_UPLOAD_BYTES", default_value_t = MAX_ARCHIVE_BYTES)]
    max_upload_bytes: usize,

    /// Requests allowed per client per minute.
    #[arg(long, env = "DESKHUB_RATE_LIMIT", default_value_t = 60)]
    rate_limit: u64,

    /// Postgres URL for users and tokens. In-memory only when unset.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
}

impl Cli {
    fn into_config(self) -> AppConfig {
        let admin_emails = self
            .admin_emails
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        AppConfig {
            port: self.port,
            storage_dir: self.storage_dir,
            project_root: self.project_root,
            admin_emails,
            max_upload_bytes: self.max_upload_bytes,
            rate_limit: RateLimitConfig {
                max_requests: self.rate_limit,
                window_secs: 60,
            },
            database_url: self.database_url,
            ..AppConfig::default()
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Cli::parse().into_config();
    tracing::info!(?config, "configuration loaded");

    let db_pool = deskhub_api::db::init_pool(config.database_url.as_deref())
        .await
        .context("database initialization failed")?;

    let chat = match ChatApiConfig::from_env() {
        Ok(chat_config) => {
            let client = ChatClient::new(chat_config).context("failed to create chat client")?;
            tracing::info!(model = client.model(), "chat completion client configured");
            Some(client)
        }
        Err(e) => {
            tracing::warn!("chat completion API not configured: {e}. /chat will return 500.");
            None
        }
    };

    let port = config.port;
    let state = AppState::from_config(config, chat, db_pool)
        .context("failed to open project storage")?;

    state
        .hydrate_from_db()
        .await
        .context("database hydration failed")?;

    let app = deskhub_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("DeskHub API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
