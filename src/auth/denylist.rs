use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::Result;

/// Revoked bearer tokens, shared by every instance through the database.
#[async_trait]
pub trait TokenDenylist: Send + Sync {
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()>;
    async fn is_revoked(&self, token: &str) -> Result<bool>;
    async fn purge_expired(&self) -> Result<u64>;
}

pub struct SqliteTokenDenylist {
    pool: SqlitePool,
}

impl SqliteTokenDenylist {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenDenylist for SqliteTokenDenylist {
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_hash, expires_at, revoked_at)
            VALUES (?, ?, ?)
            ON CONFLICT(token_hash) DO UPDATE SET expires_at = excluded.expires_at
            "#,
        )
        .bind(hash_token(token))
        .bind(expires_at.naive_utc())
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM revoked_tokens WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(hash_token(token))
        .bind(Utc::now().naive_utc())
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?")
            .bind(Utc::now().naive_utc())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Only digests are stored, never the tokens themselves.
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable_hex() {
        let digest = hash_token("secret-token");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("secret-token"));
        assert_ne!(digest, hash_token("other-token"));
        assert!(!digest.contains("secret"));
    }
}
