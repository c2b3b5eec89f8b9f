/// RSVP model and database operations
///
/// One row per (event, user) pair, enforced by the primary key and used as
/// the upsert key for every write.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE rsvp_status AS ENUM ('approved', 'declined', 'maybe', 'pending');
///
/// CREATE TABLE rsvps (
///     event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     status rsvp_status NOT NULL DEFAULT 'pending',
///     note TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (event_id, user_id)
/// );
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::rsvp_batch::{BatchOutcome, BatchPlan};

/// Attendance response
///
/// Serialized uppercase on the wire (`"APPROVED"`), stored lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rsvp_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum RsvpStatus {
    /// Attending
    Approved,
    Declined,
    /// Tentative
    Maybe,
    /// Not yet responded
    Pending,
}

impl RsvpStatus {
    pub const ALL: [RsvpStatus; 4] = [
        RsvpStatus::Approved,
        RsvpStatus::Declined,
        RsvpStatus::Maybe,
        RsvpStatus::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Approved => "APPROVED",
            RsvpStatus::Declined => "DECLINED",
            RsvpStatus::Maybe => "MAYBE",
            RsvpStatus::Pending => "PENDING",
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown RSVP status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for RsvpStatus {
    type Err = UnknownStatus;

    /// Case-insensitive match against the four statuses
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RsvpStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rsvp {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub status: RsvpStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// RSVP joined with the attendee's display name
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RsvpWithUser {
    pub user_id: Uuid,
    pub display_name: String,
    pub status: RsvpStatus,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Per-status counts for an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpSummary {
    pub approved: usize,
    pub declined: usize,
    pub maybe: usize,
    pub pending: usize,
}

impl RsvpSummary {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a RsvpStatus>) -> Self {
        let mut summary = Self::default();
        for status in statuses {
            match status {
                RsvpStatus::Approved => summary.approved += 1,
                RsvpStatus::Declined => summary.declined += 1,
                RsvpStatus::Maybe => summary.maybe += 1,
                RsvpStatus::Pending => summary.pending += 1,
            }
        }
        summary
    }
}

impl Rsvp {
    /// Inserts or replaces the caller's response for one event
    pub async fn upsert(
        conn: &mut PgConnection,
        event_id: Uuid,
        user_id: Uuid,
        status: RsvpStatus,
        note: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Rsvp>(
            r#"
            INSERT INTO rsvps (event_id, user_id, status, note)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id, user_id)
            DO UPDATE SET status = EXCLUDED.status, note = EXCLUDED.note, updated_at = NOW()
            RETURNING event_id, user_id, status, note, created_at, updated_at
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(status)
        .bind(note)
        .fetch_one(conn)
        .await
    }

    pub async fn find(
        pool: &PgPool,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Rsvp>(
            r#"
            SELECT event_id, user_id, status, note, created_at, updated_at
            FROM rsvps
            WHERE event_id = $1 AND user_id = $2
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_event(
        pool: &PgPool,
        event_id: Uuid,
    ) -> Result<Vec<RsvpWithUser>, sqlx::Error> {
        sqlx::query_as::<_, RsvpWithUser>(
            r#"
            SELECT r.user_id, u.display_name, r.status, r.note, r.updated_at
            FROM rsvps r
            JOIN users u ON u.id = r.user_id
            WHERE r.event_id = $1
            ORDER BY u.display_name ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for_event(pool: &PgPool, event_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM rsvps WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(pool)
            .await
    }

    /// Applies a planned batch atomically
    ///
    /// Every upsert and delete runs inside one transaction. If any statement
    /// fails the transaction is dropped without commit and nothing is written.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use kinship_shared::models::rsvp::Rsvp;
    /// use kinship_shared::rsvp_batch::BatchPlan;
    /// # async fn example(pool: sqlx::PgPool, event_id: uuid::Uuid, plan: BatchPlan) -> Result<(), sqlx::Error> {
    /// let outcome = Rsvp::apply_batch(&pool, event_id, &plan).await?;
    /// println!("updated={} removed={} skipped={}", outcome.updated, outcome.removed, outcome.skipped);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn apply_batch(
        pool: &PgPool,
        event_id: Uuid,
        plan: &BatchPlan,
    ) -> Result<BatchOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        for entry in &plan.upserts {
            Self::upsert(&mut tx, event_id, entry.user_id, entry.status, entry.note.as_deref())
                .await?;
        }

        if !plan.removals.is_empty() {
            sqlx::query("DELETE FROM rsvps WHERE event_id = $1 AND user_id = ANY($2)")
                .bind(event_id)
                .bind(&plan.removals)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            event_id = %event_id,
            updated = plan.upserts.len(),
            removed = plan.removals.len(),
            skipped = plan.skipped,
            "Applied RSVP batch"
        );

        Ok(plan.outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("APPROVED".parse::<RsvpStatus>(), Ok(RsvpStatus::Approved));
        assert_eq!("maybe".parse::<RsvpStatus>(), Ok(RsvpStatus::Maybe));
        assert_eq!(" Declined ".parse::<RsvpStatus>(), Ok(RsvpStatus::Declined));
        let err = "ATTENDING".parse::<RsvpStatus>().unwrap_err();
        assert_eq!(err, UnknownStatus("ATTENDING".to_string()));
        assert_eq!(err.to_string(), "unknown RSVP status: ATTENDING");
        let _: &dyn std::error::Error = &err;
        assert!("".parse::<RsvpStatus>().is_err());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&RsvpStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        let status: RsvpStatus = serde_json::from_str("\"MAYBE\"").unwrap();
        assert_eq!(status, RsvpStatus::Maybe);
    }

    #[test]
    fn test_summary_tally() {
        let statuses = [
            RsvpStatus::Approved,
            RsvpStatus::Approved,
            RsvpStatus::Maybe,
            RsvpStatus::Pending,
        ];
        let summary = RsvpSummary::tally(statuses.iter());
        assert_eq!(
            summary,
            RsvpSummary {
                approved: 2,
                declined: 0,
                maybe: 1,
                pending: 1
            }
        );
    }
}
