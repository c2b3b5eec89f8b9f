/// Calendar export endpoints
///
/// - `GET /v1/calendar/events/:id.ics` - One event as an `.ics` attachment (public)
/// - `GET /v1/calendar/feed/:token` - Signed personal feed of the active family (public)
/// - `GET /v1/calendar/feed-url` - The caller's personal feed URL
///
/// Feed tokens carry the user id and an HMAC, so calendar apps can poll the
/// feed without a bearer token. A token that fails verification looks like a
/// missing feed.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use kinship_shared::{
    auth::{
        feed_token::{sign_feed_token, verify_feed_token},
        middleware::AuthContext,
    },
    ics,
    models::{event::Event, user::User},
};
use serde::Serialize;
use uuid::Uuid;

const FEED_FILENAME: &str = "kinship.ics";

#[derive(Debug, Serialize)]
pub struct FeedUrlResponse {
    pub url: String,
}

fn ics_attachment(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, ics::CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

/// Event id from `<uuid>.ics` (the suffix is optional)
fn parse_event_file(file: &str) -> Option<Uuid> {
    Uuid::parse_str(file.strip_suffix(".ics").unwrap_or(file)).ok()
}

pub async fn event_ics(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    let event_id =
        parse_event_file(&file).ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    let event = Event::find_by_id(&state.db, event_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    let body = ics::render_calendar(std::iter::once(&event), Utc::now());

    Ok(ics_attachment(&ics::filename_for(&event.title), body))
}

/// Personal feed: every event of the token owner's active family
pub async fn personal_feed(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Response> {
    let token = token.strip_suffix(".ics").unwrap_or(&token);
    let user_id = verify_feed_token(token, state.feed_secret())?;

    let user = User::find_by_id(&state.db, user_id)
        .await?
        .filter(|user| user.approved)
        .ok_or_else(|| ApiError::NotFound("Feed not found".to_string()))?;

    let events = match user.family_id {
        Some(family_id) => Event::list_by_family(&state.db, family_id, None, None).await?,
        None => Vec::new(),
    };

    tracing::debug!(user_id = %user.id, events = events.len(), "Serving calendar feed");

    let body = ics::render_calendar(&events, Utc::now());

    Ok(ics_attachment(FEED_FILENAME, body))
}

pub async fn feed_url(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<FeedUrlResponse>> {
    let token = sign_feed_token(auth.user_id, state.feed_secret());

    Ok(Json(FeedUrlResponse {
        url: state
            .config
            .public_url(&format!("v1/calendar/feed/{token}.ics")),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_file() {
        let id = Uuid::new_v4();
        assert_eq!(parse_event_file(&format!("{id}.ics")), Some(id));
        assert_eq!(parse_event_file(&id.to_string()), Some(id));
        assert_eq!(parse_event_file("dinner.ics"), None);
        assert_eq!(parse_event_file(""), None);
    }

    #[test]
    fn test_ics_attachment_headers() {
        let response = ics_attachment("sunday-dinner.ics", "BEGIN:VCALENDAR\r\n".to_string());
        let headers = response.headers();

        assert_eq!(headers[header::CONTENT_TYPE], ics::CONTENT_TYPE);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"sunday-dinner.ics\""
        );
    }
}
