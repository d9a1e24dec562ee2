//! User persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `users` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::Role;
use crate::state::UserRecord;

/// Insert a new user record.
pub async fn insert(pool: &PgPool, record: &UserRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, name, email, role, password_digest, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(&record.email)
    .bind(record.role.as_str())
    .bind(&record.password_digest)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load all users (for startup hydration).
pub async fn load_all(pool: &PgPool) -> Result<Vec<UserRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, name, email, role, password_digest, created_at
         FROM users ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(UserRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    password_digest: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_record(self) -> UserRecord {
        let role = self.role.parse().unwrap_or_else(|err| {
            tracing::warn!(user_id = %self.id, error = %err, "unknown role in database; using 'user'");
            Role::User
        });
        UserRecord {
            id: self.id,
            name: self.name,
            email: self.email,
            role,
            password_digest: self.password_digest,
            created_at: self.created_at,
        }
    }
}
