/// Group model and database operations
///
/// Groups form a per-family tree stored as parent pointers in a flat table.
/// Tree resolution happens in memory through [`crate::hierarchy::GroupForest`];
/// this module only reads and writes rows.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE groups (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     family_id UUID NOT NULL REFERENCES families(id) ON DELETE CASCADE,
///     nickname VARCHAR(60) NOT NULL,
///     parent_id UUID REFERENCES groups(id) ON DELETE SET NULL,
///     invite_code VARCHAR(8),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT groups_family_nickname_key UNIQUE (family_id, nickname),
///     CONSTRAINT groups_invite_code_key UNIQUE (invite_code)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use uuid::Uuid;

use super::family::Family;
use super::user::User;
use crate::hierarchy::{GroupForest, HierarchyError};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub family_id: Uuid,
    pub nickname: String,
    pub parent_id: Option<Uuid>,
    pub invite_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const GROUP_COLUMNS: &str =
    "id, family_id, nickname, parent_id, invite_code, created_at, updated_at";

/// Reasons a group move is refused
#[derive(Debug, Error)]
pub enum ReparentError {
    #[error("Group not found")]
    GroupNotFound,

    #[error("Parent group not found")]
    ParentNotFound,

    #[error("The root group cannot be moved")]
    RootImmovable,

    #[error("A group cannot be moved under itself or one of its subgroups")]
    WouldCreateCycle,

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct CreateGroup {
    pub family_id: Uuid,
    pub nickname: String,
    pub parent_id: Option<Uuid>,
}

impl Group {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub async fn create(conn: &mut PgConnection, data: CreateGroup) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO groups (family_id, nickname, parent_id) VALUES ($1, $2, $3) RETURNING {GROUP_COLUMNS}"
        );
        sqlx::query_as::<_, Group>(&sql)
            .bind(data.family_id)
            .bind(data.nickname)
            .bind(data.parent_id)
            .fetch_one(conn)
            .await
    }

    /// Returns the family's root group, creating it on first access
    ///
    /// The root is the oldest parentless group. When none exists a group named
    /// after the family is inserted; the insert is guarded by the
    /// `(family_id, nickname)` uniqueness constraint so concurrent callers
    /// converge on the same row.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use kinship_shared::models::{family::Family, group::Group};
    /// # async fn example(pool: sqlx::PgPool, family: Family) -> Result<(), sqlx::Error> {
    /// let root = Group::ensure_root(&pool, &family).await?;
    /// assert!(root.is_root());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn ensure_root(pool: &PgPool, family: &Family) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::ensure_root_in(&mut conn, family).await
    }

    /// Same as [`Group::ensure_root`], on an existing connection or transaction
    pub async fn ensure_root_in(
        conn: &mut PgConnection,
        family: &Family,
    ) -> Result<Self, sqlx::Error> {
        if let Some(root) = Self::find_root(&mut *conn, family.id).await? {
            return Ok(root);
        }

        let sql = format!(
            "INSERT INTO groups (family_id, nickname) VALUES ($1, $2)
             ON CONFLICT (family_id, nickname) DO NOTHING
             RETURNING {GROUP_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Group>(&sql)
            .bind(family.id)
            .bind(&family.name)
            .fetch_optional(&mut *conn)
            .await?;

        if let Some(root) = inserted {
            tracing::info!(family_id = %family.id, group_id = %root.id, "Provisioned root group");
            return Ok(root);
        }

        // Lost the race, or a group already carries the family name
        match Self::find_by_nickname(&mut *conn, family.id, &family.name).await? {
            Some(group) => Ok(group),
            None => Err(sqlx::Error::RowNotFound),
        }
    }

    pub async fn find_root(
        conn: &mut PgConnection,
        family_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM groups
             WHERE family_id = $1 AND parent_id IS NULL
             ORDER BY created_at ASC, id ASC
             LIMIT 1"
        );
        sqlx::query_as::<_, Group>(&sql)
            .bind(family_id)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_nickname(
        conn: &mut PgConnection,
        family_id: Uuid,
        nickname: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql =
            format!("SELECT {GROUP_COLUMNS} FROM groups WHERE family_id = $1 AND nickname = $2");
        sqlx::query_as::<_, Group>(&sql)
            .bind(family_id)
            .bind(nickname)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1");
        sqlx::query_as::<_, Group>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Every group of a family, in creation order
    pub async fn list_by_family(pool: &PgPool, family_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE family_id = $1 ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Group>(&sql)
            .bind(family_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_invite_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE invite_code = $1");
        sqlx::query_as::<_, Group>(&sql)
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    pub async fn code_exists(pool: &PgPool, code: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM groups WHERE invite_code = $1)")
            .bind(code)
            .fetch_one(pool)
            .await
    }

    pub async fn set_invite_code(
        conn: &mut PgConnection,
        id: Uuid,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "UPDATE groups SET invite_code = $2, updated_at = NOW() WHERE id = $1 RETURNING {GROUP_COLUMNS}"
        );
        sqlx::query_as::<_, Group>(&sql)
            .bind(id)
            .bind(code)
            .fetch_optional(conn)
            .await
    }

    pub async fn rename(pool: &PgPool, id: Uuid, nickname: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "UPDATE groups SET nickname = $2, updated_at = NOW() WHERE id = $1 RETURNING {GROUP_COLUMNS}"
        );
        sqlx::query_as::<_, Group>(&sql)
            .bind(id)
            .bind(nickname)
            .fetch_optional(pool)
            .await
    }

    /// Moves a group under a new parent inside its family
    ///
    /// The family's group rows are locked with `FOR UPDATE` before the cycle
    /// check, so concurrent moves are serialized and each one checks against
    /// the tree the previous one committed.
    ///
    /// # Errors
    ///
    /// - `GroupNotFound` / `ParentNotFound`: id not in `family_id`
    /// - `RootImmovable`: the group is a root
    /// - `WouldCreateCycle`: `parent_id` is the group or one of its descendants
    pub async fn reparent(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
        parent_id: Uuid,
    ) -> Result<Self, ReparentError> {
        let mut tx = pool.begin().await?;

        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE family_id = $1 ORDER BY created_at ASC, id ASC FOR UPDATE"
        );
        let rows = sqlx::query_as::<_, Group>(&sql)
            .bind(family_id)
            .fetch_all(&mut *tx)
            .await?;
        let forest = GroupForest::new(rows);

        let group = forest.get(id).ok_or(ReparentError::GroupNotFound)?;
        if group.is_root() {
            return Err(ReparentError::RootImmovable);
        }
        if !forest.contains(parent_id) {
            return Err(ReparentError::ParentNotFound);
        }
        if forest.would_create_cycle(id, parent_id)? {
            return Err(ReparentError::WouldCreateCycle);
        }

        let sql = format!(
            "UPDATE groups SET parent_id = $2, updated_at = NOW() WHERE id = $1 RETURNING {GROUP_COLUMNS}"
        );
        let moved = sqlx::query_as::<_, Group>(&sql)
            .bind(id)
            .bind(parent_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(group_id = %id, parent_id = %parent_id, "Moved group");

        Ok(moved)
    }

    /// Deletes a non-root group
    ///
    /// Children are moved to the deleted group's parent and members lose their
    /// active group pointer. All three writes share one transaction.
    ///
    /// # Returns
    ///
    /// `false` if the group does not exist or is a root.
    pub async fn delete(pool: &PgPool, group: &Group) -> Result<bool, sqlx::Error> {
        let Some(parent_id) = group.parent_id else {
            return Ok(false);
        };

        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE groups SET parent_id = $2, updated_at = NOW() WHERE parent_id = $1")
            .bind(group.id)
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;

        let cleared = User::clear_group(&mut tx, group.id).await?;

        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(group_id = %group.id, members_cleared = cleared, "Deleted group");

        Ok(result.rows_affected() > 0)
    }
}
