use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Bearer-token sessions for the payment endpoints. Login and member
/// management live elsewhere in the platform; this service only issues and
/// validates the opaque tokens the poller and checkout endpoints require.
/// Tokens are stored hashed, never in the clear.
pub struct AuthService {
    pool: SqlitePool,
    session_duration_hours: i64,
}

impl AuthService {
    pub fn new(pool: SqlitePool, session_duration_hours: i64) -> Self {
        Self {
            pool,
            session_duration_hours,
        }
    }

    /// Issues a session token for a member and returns it. Only the SHA-256
    /// hash is persisted.
    pub async fn create_session(&self, member_id: Uuid) -> Result<String> {
        let token = generate_random_token();
        let token_hash = hash_token(&token);
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.session_duration_hours);

        sqlx::query(
            r#"
            INSERT INTO api_sessions (id, member_id, token_hash, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(member_id.to_string())
        .bind(&token_hash)
        .bind(expires_at.naive_utc())
        .bind(now.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(token)
    }

    /// Resolves a bearer token to a member id, if the session exists and has
    /// not expired.
    pub async fn validate_token(&self, token: &str) -> Result<Option<Uuid>> {
        let token_hash = hash_token(token);

        let member_id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT member_id FROM api_sessions
            WHERE token_hash = ? AND expires_at > ?
            "#,
        )
        .bind(&token_hash)
        .bind(Utc::now().naive_utc())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        member_id
            .map(|s| Uuid::parse_str(&s).map_err(|e| AppError::Database(e.to_string())))
            .transpose()
    }

    /// Cleanup expired sessions.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM api_sessions WHERE expires_at <= ?")
            .bind(Utc::now().naive_utc())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

fn generate_random_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
