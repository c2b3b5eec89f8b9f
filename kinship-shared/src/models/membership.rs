/// Historical family membership
///
/// A user may belong to several families over time but has exactly one
/// active family (`users.family_id`). This table records every family the
/// user has joined so they can switch back later.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE family_memberships (
///     family_id UUID NOT NULL REFERENCES families(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (family_id, user_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FamilyMembership {
    pub family_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

/// Membership joined with the family name, for listings
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MembershipWithFamily {
    pub family_id: Uuid,
    pub family_name: String,
    pub joined_at: DateTime<Utc>,
}

impl FamilyMembership {
    /// Records membership; joining the same family twice is a no-op
    pub async fn record(
        conn: &mut PgConnection,
        family_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO family_memberships (family_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (family_id, user_id) DO NOTHING
            "#,
        )
        .bind(family_id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn is_member(
        pool: &PgPool,
        family_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM family_memberships WHERE family_id = $1 AND user_id = $2)",
        )
        .bind(family_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<MembershipWithFamily>, sqlx::Error> {
        sqlx::query_as::<_, MembershipWithFamily>(
            r#"
            SELECT m.family_id, f.name AS family_name, m.joined_at
            FROM family_memberships m
            JOIN families f ON f.id = m.family_id
            WHERE m.user_id = $1
            ORDER BY m.joined_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
