/// User model and database operations
///
/// A user holds exactly one *active* family and at most one active group
/// (`family_id` / `group_id`). Historical family membership lives in
/// `family_memberships`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     handle VARCHAR(40) NOT NULL,          -- unique on LOWER(handle)
///     email VARCHAR(255),                   -- unique on LOWER(email)
///     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     password_hash VARCHAR(255) NOT NULL,
///     display_name VARCHAR(100) NOT NULL,
///     avatar_url VARCHAR(512),
///     role user_role NOT NULL DEFAULT 'member',
///     approved BOOLEAN NOT NULL DEFAULT FALSE,
///     family_id UUID REFERENCES families(id) ON DELETE SET NULL,
///     group_id UUID REFERENCES groups(id) ON DELETE SET NULL,
///     theme theme_preference NOT NULL DEFAULT 'system',
///     notification_preference notification_preference NOT NULL DEFAULT 'email',
///     default_location VARCHAR(255),
///     phone VARCHAR(32),
///     phone_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::context::ActiveContext;

/// Application-wide role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Approves signups, manages roles, rotates family codes
    Admin,

    /// Regular family member
    Member,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Member => "member",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// UI theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "theme_preference", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    System,
    Light,
    Dark,
}

/// Channel used for event notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_preference", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationPreference {
    Email,
    Sms,
    None,
}

/// User account row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Login handle, unique case-insensitively
    pub handle: String,

    pub email: Option<String>,

    pub email_verified: bool,

    /// Argon2id hash, never serialized to clients
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub display_name: String,

    pub avatar_url: Option<String>,

    pub role: UserRole,

    /// Pending users cannot sign in until an admin approves them
    pub approved: bool,

    /// Active family
    pub family_id: Option<Uuid>,

    /// Active group; always belongs to `family_id`
    pub group_id: Option<Uuid>,

    pub theme: ThemePreference,

    pub notification_preference: NotificationPreference,

    pub default_location: Option<String>,

    pub phone: Option<String>,

    pub phone_verified: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Advisory lock key serializing signups, so only one can see an empty table
pub const SIGNUP_LOCK_KEY: i64 = 0x6b69_6e73_6869_7001;

const USER_COLUMNS: &str = "id, handle, email, email_verified, password_hash, display_name, \
    avatar_url, role, approved, family_id, group_id, theme, notification_preference, \
    default_location, phone, phone_verified, created_at, updated_at";

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub handle: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub display_name: String,
    pub role: UserRole,
    pub approved: bool,
    pub family_id: Option<Uuid>,
}

/// Profile fields editable from settings. `None` leaves a field unchanged;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub display_name: Option<String>,
    pub avatar_url: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub default_location: Option<Option<String>>,
}

/// Compact view used in member listings
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberSummary {
    pub id: Uuid,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub group_id: Option<Uuid>,
}

impl User {
    /// Active family/group pointers as an explicit value
    pub fn context(&self) -> ActiveContext {
        ActiveContext {
            family_id: self.family_id,
            group_id: self.group_id,
        }
    }

    pub async fn create(conn: &mut PgConnection, data: CreateUser) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO users (handle, email, password_hash, display_name, role, approved, family_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(data.handle)
            .bind(data.email)
            .bind(data.password_hash)
            .bind(data.display_name)
            .bind(data.role)
            .bind(data.approved)
            .bind(data.family_id)
            .fetch_one(conn)
            .await
    }

    /// Whether any user exists yet; the first signup becomes admin
    pub async fn any_exist(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users)")
            .fetch_one(conn)
            .await
    }

    /// Takes the signup lock for the rest of the transaction
    ///
    /// Must run on a transaction; the lock is released on commit or rollback.
    pub async fn lock_signups(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SIGNUP_LOCK_KEY)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_handle(pool: &PgPool, handle: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(handle) = LOWER($1)");
        sqlx::query_as::<_, User>(&sql)
            .bind(handle)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Members whose active family is `family_id`
    pub async fn list_by_family(
        pool: &PgPool,
        family_id: Uuid,
    ) -> Result<Vec<MemberSummary>, sqlx::Error> {
        sqlx::query_as::<_, MemberSummary>(
            r#"
            SELECT id, handle, display_name, avatar_url, role, group_id
            FROM users
            WHERE family_id = $1 AND approved = TRUE
            ORDER BY display_name ASC
            "#,
        )
        .bind(family_id)
        .fetch_all(pool)
        .await
    }

    /// How many of `user_ids` are approved members of `family_id`
    pub async fn count_in_family(
        pool: &PgPool,
        family_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE family_id = $1 AND approved = TRUE AND id = ANY($2)",
        )
        .bind(family_id)
        .bind(user_ids)
        .fetch_one(pool)
        .await
    }

    pub async fn list_pending(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE approved = FALSE ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, User>(&sql).fetch_all(pool).await
    }

    /// Writes the active family/group pointers
    pub async fn set_context(
        conn: &mut PgConnection,
        user_id: Uuid,
        context: ActiveContext,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET family_id = $2, group_id = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(context.family_id)
        .bind(context.group_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn update_profile(
        pool: &PgPool,
        user_id: Uuid,
        data: UpdateProfile,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(current) = Self::find_by_id(pool, user_id).await? else {
            return Ok(None);
        };

        let email_changed = matches!(&data.email, Some(new) if *new != current.email);
        let display_name = data.display_name.unwrap_or(current.display_name);
        let avatar_url = data.avatar_url.unwrap_or(current.avatar_url);
        let email = data.email.unwrap_or(current.email);
        let default_location = data.default_location.unwrap_or(current.default_location);
        let email_verified = current.email_verified && !email_changed;

        let sql = format!(
            "UPDATE users
             SET display_name = $2, avatar_url = $3, email = $4, default_location = $5,
                 email_verified = $6, updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(display_name)
            .bind(avatar_url)
            .bind(email)
            .bind(default_location)
            .bind(email_verified)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_theme(
        pool: &PgPool,
        user_id: Uuid,
        theme: ThemePreference,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET theme = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(theme)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_notification_preference(
        pool: &PgPool,
        user_id: Uuid,
        preference: NotificationPreference,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET notification_preference = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(preference)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_password_hash(
        conn: &mut PgConnection,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn mark_email_verified(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn set_verified_phone(
        conn: &mut PgConnection,
        user_id: Uuid,
        phone: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET phone = $2, phone_verified = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(phone)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Approves a pending user
    pub async fn approve(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET approved = TRUE, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Hard-deletes a user who is still pending approval
    pub async fn delete_pending(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND approved = FALSE")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_role(
        pool: &PgPool,
        user_id: Uuid,
        role: UserRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(role)
            .fetch_optional(pool)
            .await
    }

    /// Clears the group pointer of every user in `group_id`
    pub async fn clear_group(conn: &mut PgConnection, group_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET group_id = NULL, updated_at = NOW() WHERE group_id = $1",
        )
        .bind(group_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
