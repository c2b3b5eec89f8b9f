/// Single-use, time-boxed secrets
///
/// Activation and password-reset tokens are stored as SHA-256 hashes of the
/// secret mailed to the user (see [`crate::auth::tokens`]). Phone
/// verifications are keyed by the phone number and hold a 6-digit code.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE activation_tokens (
///     token_hash VARCHAR(64) PRIMARY KEY,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     expires_at TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE password_reset_tokens (
///     token_hash VARCHAR(64) PRIMARY KEY,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     expires_at TIMESTAMPTZ NOT NULL,
///     used BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE phone_verifications (
///     phone VARCHAR(32) PRIMARY KEY,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     code VARCHAR(6) NOT NULL,
///     expires_at TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivationToken {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ActivationToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub async fn create(
        pool: &PgPool,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ActivationToken>(
            r#"
            INSERT INTO activation_tokens (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING token_hash, user_id, expires_at, created_at
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    /// Deletes and returns the token in one statement, so it can only be
    /// redeemed once even under concurrent requests
    pub async fn take(
        conn: &mut PgConnection,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ActivationToken>(
            r#"
            DELETE FROM activation_tokens
            WHERE token_hash = $1
            RETURNING token_hash, user_id, expires_at, created_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(conn)
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasswordResetToken {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    /// Usable tokens are unused and not yet expired
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }

    pub async fn create(
        pool: &PgPool,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING token_hash, user_id, expires_at, used, created_at
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    /// Locks the row for the remainder of the transaction
    pub async fn find_for_update(
        conn: &mut PgConnection,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT token_hash, user_id, expires_at, used, created_at
            FROM password_reset_tokens
            WHERE token_hash = $1
            FOR UPDATE
            "#,
        )
        .bind(token_hash)
        .fetch_optional(conn)
        .await
    }

    pub async fn mark_used(conn: &mut PgConnection, token_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE token_hash = $1")
            .bind(token_hash)
            .execute(conn)
            .await?;

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhoneVerification {
    pub phone: String,
    pub user_id: Uuid,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PhoneVerification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Issues a code for `phone`, replacing any outstanding one
    pub async fn issue(
        pool: &PgPool,
        phone: &str,
        user_id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PhoneVerification>(
            r#"
            INSERT INTO phone_verifications (phone, user_id, code, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (phone)
            DO UPDATE SET user_id = EXCLUDED.user_id, code = EXCLUDED.code,
                          expires_at = EXCLUDED.expires_at, created_at = NOW()
            RETURNING phone, user_id, code, expires_at, created_at
            "#,
        )
        .bind(phone)
        .bind(user_id)
        .bind(code)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    pub async fn take(
        conn: &mut PgConnection,
        phone: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PhoneVerification>(
            r#"
            DELETE FROM phone_verifications
            WHERE phone = $1
            RETURNING phone, user_id, code, expires_at, created_at
            "#,
        )
        .bind(phone)
        .fetch_optional(conn)
        .await
    }
}
