//! Access token persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `access_tokens` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::state::AccessTokenRecord;

/// Insert a new access token.
pub async fn insert(pool: &PgPool, record: &AccessTokenRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO access_tokens (id, user_id, secret_digest, created_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(&record.secret_digest)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a token. Returns whether a row was removed.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM access_tokens WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all tokens (for startup hydration).
pub async fn load_all(pool: &PgPool) -> Result<Vec<AccessTokenRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TokenRow>(
        "SELECT id, user_id, secret_digest, created_at FROM access_tokens",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(TokenRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    secret_digest: String,
    created_at: DateTime<Utc>,
}

impl TokenRow {
    fn into_record(self) -> AccessTokenRecord {
        AccessTokenRecord {
            id: self.id,
            user_id: self.user_id,
            secret_digest: self.secret_digest,
            created_at: self.created_at,
        }
    }
}
