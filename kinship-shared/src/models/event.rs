/// Event model and database operations
///
/// Events belong to one family and are hosted by one user. Only the host may
/// edit or delete an event. Holiday-generated events carry `is_holiday` and a
/// `holiday_key` used for deduplication (see [`crate::holidays`]).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE events (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     family_id UUID NOT NULL REFERENCES families(id) ON DELETE CASCADE,
///     host_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     title VARCHAR(200) NOT NULL,
///     description TEXT,
///     location VARCHAR(255),
///     link VARCHAR(512),
///     start_at TIMESTAMPTZ NOT NULL,
///     end_at TIMESTAMPTZ,
///     is_holiday BOOLEAN NOT NULL DEFAULT FALSE,
///     holiday_key VARCHAR(120),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE event_cohosts (
///     event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     PRIMARY KEY (event_id, user_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::holidays::HolidayDraft;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub family_id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub link: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub is_holiday: bool,
    pub holiday_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const EVENT_COLUMNS: &str = "id, family_id, host_id, title, description, location, link, \
    start_at, end_at, is_holiday, holiday_key, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub family_id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub link: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

/// Partial update. `None` leaves a field unchanged; `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub link: Option<Option<String>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<Option<DateTime<Utc>>>,
}

impl UpdateEvent {
    /// Applies the update to a copy of `event`
    pub fn apply_to(self, event: &Event) -> Event {
        let mut next = event.clone();
        if let Some(title) = self.title {
            next.title = title;
        }
        if let Some(description) = self.description {
            next.description = description;
        }
        if let Some(location) = self.location {
            next.location = location;
        }
        if let Some(link) = self.link {
            next.link = link;
        }
        if let Some(start_at) = self.start_at {
            next.start_at = start_at;
        }
        if let Some(end_at) = self.end_at {
            next.end_at = end_at;
        }
        next
    }
}

impl Event {
    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.host_id == user_id
    }

    /// Whether the event's time range is well formed
    pub fn has_valid_range(&self) -> bool {
        self.end_at.map_or(true, |end| end >= self.start_at)
    }

    pub async fn create(conn: &mut PgConnection, data: CreateEvent) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO events (family_id, host_id, title, description, location, link, start_at, end_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&sql)
            .bind(data.family_id)
            .bind(data.host_id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.location)
            .bind(data.link)
            .bind(data.start_at)
            .bind(data.end_at)
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, Event>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Family events ordered by start time, optionally bounded
    pub async fn list_by_family(
        pool: &PgPool,
        family_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE family_id = $1
               AND ($2::timestamptz IS NULL OR start_at >= $2)
               AND ($3::timestamptz IS NULL OR start_at < $3)
             ORDER BY start_at ASC, id ASC"
        );
        sqlx::query_as::<_, Event>(&sql)
            .bind(family_id)
            .bind(from)
            .bind(to)
            .fetch_all(pool)
            .await
    }

    /// Writes a full replacement of the mutable fields
    pub async fn save(conn: &mut PgConnection, event: &Event) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "UPDATE events
             SET title = $2, description = $3, location = $4, link = $5,
                 start_at = $6, end_at = $7, updated_at = NOW()
             WHERE id = $1
             RETURNING {EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&sql)
            .bind(event.id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.location)
            .bind(&event.link)
            .bind(event.start_at)
            .bind(event.end_at)
            .fetch_optional(conn)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn cohost_ids(pool: &PgPool, event_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT user_id FROM event_cohosts WHERE event_id = $1 ORDER BY user_id")
            .bind(event_id)
            .fetch_all(pool)
            .await
    }

    /// Replaces the co-host set
    pub async fn set_cohosts(
        conn: &mut PgConnection,
        event_id: Uuid,
        cohosts: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM event_cohosts WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *conn)
            .await?;

        if cohosts.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO event_cohosts (event_id, user_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(cohosts)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Family events starting within `[from, to)`, used for holiday dedup
    pub async fn list_in_range(
        pool: &PgPool,
        family_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        Self::list_by_family(pool, family_id, Some(from), Some(to)).await
    }

    /// Bulk-inserts holiday drafts in one transaction
    ///
    /// Rows that hit the `(family_id, holiday_key)` unique index are skipped,
    /// so a concurrent generation run cannot produce duplicates.
    ///
    /// # Returns
    ///
    /// The rows actually inserted.
    pub async fn insert_holidays(
        pool: &PgPool,
        family_id: Uuid,
        host_id: Uuid,
        drafts: &[HolidayDraft],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut inserted = Vec::with_capacity(drafts.len());

        let sql = format!(
            "INSERT INTO events (family_id, host_id, title, description, start_at, is_holiday, holiday_key)
             VALUES ($1, $2, $3, $4, $5, TRUE, $6)
             ON CONFLICT (family_id, holiday_key) WHERE holiday_key IS NOT NULL DO NOTHING
             RETURNING {EVENT_COLUMNS}"
        );

        for draft in drafts {
            let row = sqlx::query_as::<_, Event>(&sql)
                .bind(family_id)
                .bind(host_id)
                .bind(&draft.title)
                .bind(&draft.description)
                .bind(draft.start_at())
                .bind(&draft.key)
                .fetch_optional(&mut *tx)
                .await?;

            if let Some(event) = row {
                inserted.push(event);
            }
        }

        tx.commit().await?;

        Ok(inserted)
    }
}
