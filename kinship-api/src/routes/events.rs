/// Event endpoints
///
/// Events belong to the caller's active family. Any approved member may
/// create one and becomes its host; only the host may change or delete it.
/// Events of other families are reported as not found.
///
/// - `POST   /v1/events` - Create an event
/// - `GET    /v1/events?from=&to=` - Events of the active family by start time
/// - `GET    /v1/events/:id` - Event with co-hosts and RSVP summary
/// - `PATCH  /v1/events/:id` - Update (host only)
/// - `DELETE /v1/events/:id` - Delete (host only)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::double_option,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use kinship_shared::{
    auth::{
        authorization::{
            require_active_family, require_event_visible, require_family_members, require_host,
        },
        middleware::AuthContext,
    },
    models::{
        event::{CreateEvent, Event, UpdateEvent},
        rsvp::{Rsvp, RsvpSummary},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

const MAX_TITLE_LENGTH: usize = 200;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 5000, message = "Description is too long"))]
    pub description: Option<String>,

    #[validate(length(max = 300, message = "Location is too long"))]
    pub location: Option<String>,

    #[validate(url(message = "Link must be a valid URL"))]
    pub link: Option<String>,

    pub start_at: DateTime<Utc>,

    pub end_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub cohost_ids: Vec<Uuid>,
}

/// Partial update; `null` clears an optional field, an absent key keeps it
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub location: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub link: Option<Option<String>>,

    pub start_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "double_option")]
    pub end_at: Option<Option<DateTime<Utc>>>,

    /// Replaces the co-host set when present
    pub cohost_ids: Option<Vec<Uuid>>,
}

impl UpdateEventRequest {
    fn into_update(self) -> ApiResult<(UpdateEvent, Option<Vec<Uuid>>)> {
        let title = match self.title {
            Some(title) => {
                let title = title.trim().to_string();
                if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
                    return Err(ApiError::invalid_field(
                        "title",
                        "Title must be 1-200 characters",
                    ));
                }
                Some(title)
            }
            None => None,
        };

        Ok((
            UpdateEvent {
                title,
                description: self.description.map(blank_to_none),
                location: self.location.map(blank_to_none),
                link: self.link.map(blank_to_none),
                start_at: self.start_at,
                end_at: self.end_at,
            },
            self.cohost_ids,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsQuery {
    pub from: Option<DateTime<Utc>>,

    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,

    pub cohost_ids: Vec<Uuid>,

    pub rsvp_summary: RsvpSummary,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Co-hosts minus the host, deduplicated
fn normalize_cohosts(host_id: Uuid, mut cohosts: Vec<Uuid>) -> Vec<Uuid> {
    cohosts.retain(|id| *id != host_id);
    cohosts.sort_unstable();
    cohosts.dedup();
    cohosts
}

/// Loads an event visible to the caller
pub(crate) async fn visible_event(
    state: &AppState,
    auth: &AuthContext,
    id: Uuid,
) -> ApiResult<Event> {
    let event = Event::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;
    require_event_visible(auth, &event)?;

    Ok(event)
}

async fn detail(state: &AppState, event: Event) -> ApiResult<EventDetail> {
    let cohost_ids = Event::cohost_ids(&state.db, event.id).await?;
    let rsvps = Rsvp::list_for_event(&state.db, event.id).await?;
    let rsvp_summary = RsvpSummary::tally(rsvps.iter().map(|r| &r.status));

    Ok(EventDetail {
        event,
        cohost_ids,
        rsvp_summary,
    })
}

/// Create an event in the active family
///
/// # Endpoint
///
/// ```text
/// POST /v1/events
///
/// {
///   "title": "Sunday lunch",
///   "start_at": "2025-07-06T12:00:00Z",
///   "end_at": "2025-07-06T15:00:00Z",
///   "location": "Nana's",
///   "cohost_ids": ["..."]
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: ends before it starts, or a co-host outside the family
/// - `422 Unprocessable Entity`: validation failed
pub async fn create_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<EventDetail>)> {
    req.validate()?;
    let family_id = require_active_family(&auth)?;

    if matches!(req.end_at, Some(end) if end < req.start_at) {
        return Err(ApiError::BadRequest(
            "Event must not end before it starts".to_string(),
        ));
    }

    let cohosts = normalize_cohosts(auth.user_id, req.cohost_ids);
    require_family_members(&state.db, family_id, &cohosts).await?;

    let mut tx = state.db.begin().await?;
    let event = Event::create(
        &mut tx,
        CreateEvent {
            family_id,
            host_id: auth.user_id,
            title: req.title.trim().to_string(),
            description: blank_to_none(req.description),
            location: blank_to_none(req.location),
            link: blank_to_none(req.link),
            start_at: req.start_at,
            end_at: req.end_at,
        },
    )
    .await?;
    Event::set_cohosts(&mut tx, event.id, &cohosts).await?;
    tx.commit().await?;

    tracing::info!(event_id = %event.id, family_id = %family_id, host_id = %auth.user_id, "Event created");

    Ok((StatusCode::CREATED, Json(detail(&state, event).await?)))
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Json<Vec<Event>>> {
    let family_id = require_active_family(&auth)?;

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::BadRequest("`from` must not be after `to`".to_string()));
        }
    }

    Ok(Json(
        Event::list_by_family(&state.db, family_id, query.from, query.to).await?,
    ))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EventDetail>> {
    let event = visible_event(&state, &auth, id).await?;
    Ok(Json(detail(&state, event).await?))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEventRequest>,
) -> ApiResult<Json<EventDetail>> {
    let event = visible_event(&state, &auth, id).await?;
    require_host(&auth, &event)?;

    let (update, cohosts) = req.into_update()?;
    let next = update.apply_to(&event);
    if !next.has_valid_range() {
        return Err(ApiError::BadRequest(
            "Event must not end before it starts".to_string(),
        ));
    }

    let cohosts = cohosts.map(|ids| normalize_cohosts(event.host_id, ids));
    if let Some(ids) = &cohosts {
        require_family_members(&state.db, event.family_id, ids).await?;
    }

    let mut tx = state.db.begin().await?;
    let saved = Event::save(&mut tx, &next)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;
    if let Some(ids) = &cohosts {
        Event::set_cohosts(&mut tx, saved.id, ids).await?;
    }
    tx.commit().await?;

    tracing::info!(event_id = %saved.id, "Event updated");

    Ok(Json(detail(&state, saved).await?))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let event = visible_event(&state, &auth, id).await?;
    require_host(&auth, &event)?;

    if !Event::delete(&state.db, event.id).await? {
        return Err(ApiError::NotFound("Event not found".to_string()));
    }

    tracing::info!(event_id = %event.id, deleted_by = %auth.user_id, "Event deleted");

    Ok(StatusCode::NO_CONTENT)
}
