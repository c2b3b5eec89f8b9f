/// RSVP endpoints
///
/// - `PUT  /v1/events/:id/rsvp` - Set the caller's own response
/// - `GET  /v1/events/:id/rsvps` - Responses with display names and a summary
/// - `POST /v1/events/:id/rsvps` - Batch update on behalf of others
///
/// The batch endpoint never fails on individual entries. Targets outside the
/// caller's scope and unknown statuses are counted in `skipped`, and the
/// accepted writes land in a single transaction.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::events::visible_event,
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use kinship_shared::{
    auth::middleware::AuthContext,
    models::{
        rsvp::{Rsvp, RsvpStatus, RsvpSummary, RsvpWithUser},
        user::User,
    },
    rsvp_batch::{plan_batch, BatchOutcome, BatchRequest, PermittedScope, ScopeKind},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_NOTE_LENGTH: usize = 500;

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub status: String,

    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RsvpListResponse {
    pub summary: RsvpSummary,

    pub rsvps: Vec<RsvpWithUser>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    #[serde(flatten)]
    pub outcome: BatchOutcome,

    pub scope: ScopeKind,
}

fn clean_note(note: Option<String>) -> ApiResult<Option<String>> {
    let note = note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    if matches!(&note, Some(n) if n.chars().count() > MAX_NOTE_LENGTH) {
        return Err(ApiError::invalid_field("note", "Note is too long"));
    }

    Ok(note)
}

/// Set the caller's own RSVP
///
/// ```text
/// PUT /v1/events/:id/rsvp
///
/// { "status": "MAYBE", "note": "Might be late" }
/// ```
///
/// Repeating the same request leaves exactly one row.
pub async fn respond(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Json<Rsvp>> {
    let status: RsvpStatus = req
        .status
        .parse()
        .map_err(|_| ApiError::invalid_field("status", "Unknown RSVP status"))?;
    let note = clean_note(req.note)?;

    let event = visible_event(&state, &auth, event_id).await?;

    let mut conn = state.db.acquire().await?;
    let rsvp = Rsvp::upsert(&mut conn, event.id, auth.user_id, status, note.as_deref()).await?;

    tracing::debug!(event_id = %event.id, user_id = %auth.user_id, status = %status, "RSVP recorded");

    Ok(Json(rsvp))
}

pub async fn list_rsvps(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<RsvpListResponse>> {
    let event = visible_event(&state, &auth, event_id).await?;
    let rsvps = Rsvp::list_for_event(&state.db, event.id).await?;

    Ok(Json(RsvpListResponse {
        summary: RsvpSummary::tally(rsvps.iter().map(|r| &r.status)),
        rsvps,
    }))
}

/// Batch RSVP update
///
/// # Endpoint
///
/// ```text
/// POST /v1/events/:id/rsvps
///
/// {
///   "updates": [{ "user_id": "...", "status": "APPROVED", "note": null }],
///   "remove": ["..."]
/// }
/// ```
///
/// # Response
///
/// ```json
/// { "updated": 2, "removed": 1, "skipped": 1, "scope": "group" }
/// ```
///
/// The host and family admins may write for every family member; anyone
/// else for themselves and members of their active group.
pub async fn batch_update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<Json<BatchResponse>> {
    let event = visible_event(&state, &auth, event_id).await?;

    let members = User::list_by_family(&state.db, event.family_id).await?;
    let scope = PermittedScope::resolve(
        &auth,
        &event,
        members.iter().map(|member| (member.id, member.group_id)),
    );

    let plan = plan_batch(&scope, &req);
    let outcome = if plan.is_empty() {
        plan.outcome()
    } else {
        Rsvp::apply_batch(&state.db, event.id, &plan).await?
    };

    tracing::info!(
        event_id = %event.id,
        caller = %auth.user_id,
        scope = ?scope.kind,
        updated = outcome.updated,
        removed = outcome.removed,
        skipped = outcome.skipped,
        "RSVP batch applied"
    );

    Ok(Json(BatchResponse {
        outcome,
        scope: scope.kind,
    }))
}
