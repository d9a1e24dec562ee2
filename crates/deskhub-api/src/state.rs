//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - **Users / access tokens**: in-memory [`Store`]s, written through to
//!   Postgres when a pool is configured and hydrated from it at startup.
//! - **Project**: the [`ProjectFileStore`] holding the single project tree.
//!   It keeps its own upload lock; there is no other project state here.
//! - **Chat client**: present only when the completion API is configured.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use deskhub_chat_client::ChatClient;
use deskhub_core::archive::MAX_DECOMPRESSED_BYTES;
use deskhub_core::{
    LocalBlobStore, MemoryBlobStore, ProjectFileStore, StorageError, DEFAULT_PROJECT_ROOT,
    MAX_ARCHIVE_BYTES,
};
use parking_lot::RwLock;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Role, DEFAULT_PASSWORD_ITERATIONS};
use crate::middleware::rate_limit::RateLimitConfig;

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous (the RwLock is `parking_lot`, not `tokio::sync`)
/// because we never hold the lock across `.await` points.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Insert a record unless an existing record conflicts with it.
    ///
    /// The conflict check and the insert run under one write lock. Returns
    /// `false` (and stores nothing) on conflict.
    pub fn insert_unless(&self, id: Uuid, value: T, conflicts: impl Fn(&T) -> bool) -> bool {
        let mut guard = self.data.write();
        if guard.values().any(conflicts) {
            return false;
        }
        guard.insert(id, value);
        true
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// First record matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.data.read().values().find(|v| predicate(v)).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Record Types -------------------------------------------------------------

/// A registered user.
///
/// The password digest is never serialized.
#[derive(Clone, Serialize, ToSchema)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip)]
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("password_digest", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// An issued bearer token. Only the SHA-256 digest of the secret is kept.
#[derive(Debug, Clone)]
pub struct AccessTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Hex SHA-256 of the token secret.
    pub secret_digest: String,
    pub created_at: DateTime<Utc>,
}

// -- Configuration ------------------------------------------------------------

/// Application configuration.
///
/// Custom `Debug` redacts the database URL, which may carry credentials.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Directory for the local blob store. `None` keeps files in memory.
    pub storage_dir: Option<PathBuf>,
    /// Storage key of the project root.
    pub project_root: String,
    /// Emails (lowercase) that register with the admin role.
    pub admin_emails: Vec<String>,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
    /// SHA-256 rounds for new password digests.
    pub password_iterations: u32,
    /// Request rate limit.
    pub rate_limit: RateLimitConfig,
    /// Postgres connection URL. `None` runs in-memory only.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("project_root", &self.project_root)
            .field("admin_emails", &self.admin_emails)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("password_iterations", &self.password_iterations)
            .field("rate_limit", &self.rate_limit)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            storage_dir: None,
            project_root: DEFAULT_PROJECT_ROOT.to_string(),
            admin_emails: Vec::new(),
            max_upload_bytes: MAX_ARCHIVE_BYTES,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
            rate_limit: RateLimitConfig::default(),
            database_url: None,
        }
    }
}

impl AppConfig {
    /// Whether `email` is configured to register as an admin.
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }
}

// -- Application State --------------------------------------------------------

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub users: Store<UserRecord>,
    pub tokens: Store<AccessTokenRecord>,
    pub project: ProjectFileStore,
    pub chat: Option<ChatClient>,
    pub db_pool: Option<PgPool>,
    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration and no chat client.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// In-memory state with the given configuration. `storage_dir` is ignored.
    pub fn with_config(config: AppConfig, chat: Option<ChatClient>) -> Self {
        let project = project_store(Arc::new(MemoryBlobStore::new()), &config);
        Self::assemble(config, project, chat, None)
    }

    /// State for a running server: files on disk when `storage_dir` is set,
    /// optional database write-through.
    pub fn from_config(
        config: AppConfig,
        chat: Option<ChatClient>,
        db_pool: Option<PgPool>,
    ) -> Result<Self, StorageError> {
        let project = match &config.storage_dir {
            Some(dir) => {
                tracing::info!(dir = %dir.display(), "using local blob store");
                project_store(Arc::new(LocalBlobStore::new(dir)?), &config)
            }
            None => {
                tracing::warn!("no storage directory configured; project files are kept in memory");
                project_store(Arc::new(MemoryBlobStore::new()), &config)
            }
        };
        Ok(Self::assemble(config, project, chat, db_pool))
    }

    fn assemble(
        config: AppConfig,
        project: ProjectFileStore,
        chat: Option<ChatClient>,
        db_pool: Option<PgPool>,
    ) -> Self {
        Self {
            users: Store::new(),
            tokens: Store::new(),
            project,
            chat,
            db_pool,
            config,
        }
    }

    /// Look up a user by email, ignoring case.
    pub fn find_user_by_email(&self, email: &str) -> Option<UserRecord> {
        let email = email.trim();
        self.users.find(|u| u.email.eq_ignore_ascii_case(email))
    }

    /// Load users and tokens from the database into the in-memory stores.
    pub async fn hydrate_from_db(&self) -> Result<(), sqlx::Error> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let users = crate::db::users::load_all(pool).await?;
        let user_count = users.len();
        for record in users {
            self.users.insert(record.id, record);
        }

        let tokens = crate::db::tokens::load_all(pool).await?;
        let token_count = tokens.len();
        for record in tokens {
            self.tokens.insert(record.id, record);
        }

        tracing::info!(
            users = user_count,
            tokens = token_count,
            "hydrated in-memory stores from database"
        );
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn project_store(
    blob: Arc<dyn deskhub_core::BlobStore>,
    config: &AppConfig,
) -> ProjectFileStore {
    ProjectFileStore::new(blob, config.project_root.clone())
        .with_limits(config.max_upload_bytes, MAX_DECOMPRESSED_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: email.into(),
            role: Role::User,
            password_digest: "sha256$1$00$00".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn store_insert_get_remove() {
        let store: Store<UserRecord> = Store::new();
        let record = user("ada@example.com");
        let id = record.id;
        assert!(store.insert(id, record).is_none());
        assert_eq!(store.get(&id).unwrap().email, "ada@example.com");
        assert_eq!(store.len(), 1);
        assert!(store.remove(&id).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn insert_unless_rejects_conflicts() {
        let store: Store<UserRecord> = Store::new();
        let first = user("ada@example.com");
        assert!(store.insert_unless(first.id, first, |_| false));
        let second = user("ADA@example.com");
        let inserted = store.insert_unless(second.id, second, |u| {
            u.email.eq_ignore_ascii_case("ADA@example.com")
        });
        assert!(!inserted);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn find_user_by_email_ignores_case() {
        let state = AppState::new();
        let record = user("Ada@Example.com");
        state.users.insert(record.id, record);
        assert!(state.find_user_by_email("ada@example.COM").is_some());
        assert!(state.find_user_by_email("bob@example.com").is_none());
    }

    #[test]
    fn user_serialization_omits_digest() {
        let json = serde_json::to_value(user("ada@example.com")).unwrap();
        assert!(json.get("password_digest").is_none());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = AppConfig {
            database_url: Some("postgres://app:hunter2@db/deskhub".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        let debug = format!("{:?}", user("ada@example.com"));
        assert!(!debug.contains("sha256$"));
    }

    #[test]
    fn admin_emails_match_case_insensitively() {
        let config = AppConfig {
            admin_emails: vec!["root@example.com".into()],
            ..AppConfig::default()
        };
        assert!(config.is_admin_email(" Root@Example.com "));
        assert!(!config.is_admin_email("user@example.com"));
    }

    #[test]
    fn project_store_uses_configured_root_and_limit() {
        let config = AppConfig {
            project_root: "projects/current".into(),
            max_upload_bytes: 4096,
            ..AppConfig::default()
        };
        let state = AppState::with_config(config, None);
        assert_eq!(state.project.root(), "projects/current");
        assert_eq!(state.project.max_archive_bytes(), 4096);
    }
}
