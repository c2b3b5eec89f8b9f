/// Family model and database operations
///
/// A family is the top-level tenant. Every family carries a unique 8-character
/// invite code that outsiders redeem to join it.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE families (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(100) NOT NULL,
///     invite_code VARCHAR(8) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT families_invite_code_key UNIQUE (invite_code)
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use kinship_shared::models::family::Family;
/// use kinship_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let mut tx = pool.begin().await?;
///
/// let family = Family::create(&mut tx, "The Okafors", "K7MQ2XPA").await?;
/// tx.commit().await?;
///
/// let found = Family::find_by_invite_code(&pool, "K7MQ2XPA").await?;
/// assert_eq!(found.map(|f| f.id), Some(family.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Family {
    pub id: Uuid,
    pub name: String,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Family {
    /// Creates a family with an already generated invite code
    ///
    /// # Errors
    ///
    /// Returns a unique violation on `families_invite_code_key` if the code is
    /// taken by a concurrent writer.
    pub async fn create(
        conn: &mut PgConnection,
        name: &str,
        invite_code: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Family>(
            r#"
            INSERT INTO families (name, invite_code)
            VALUES ($1, $2)
            RETURNING id, name, invite_code, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(invite_code)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Family>(
            "SELECT id, name, invite_code, created_at, updated_at FROM families WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Exact, case-sensitive code lookup
    pub async fn find_by_invite_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Family>(
            "SELECT id, name, invite_code, created_at, updated_at FROM families WHERE invite_code = $1",
        )
        .bind(code)
        .fetch_optional(pool)
        .await
    }

    pub async fn code_exists(pool: &PgPool, code: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM families WHERE invite_code = $1)")
            .bind(code)
            .fetch_one(pool)
            .await
    }

    /// Overwrites the invite code; the previous code stops resolving immediately
    pub async fn set_invite_code(
        conn: &mut PgConnection,
        id: Uuid,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Family>(
            r#"
            UPDATE families
            SET invite_code = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, invite_code, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(code)
        .fetch_optional(conn)
        .await
    }

    pub async fn rename(pool: &PgPool, id: Uuid, name: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Family>(
            r#"
            UPDATE families
            SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, invite_code, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .fetch_optional(pool)
        .await
    }
}
