/// Holiday generation
///
/// `POST /v1/holidays/generate` pulls one year of public holidays from the
/// configured provider and inserts the ones the active family does not
/// already have. Running it again for the same year inserts nothing.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, NaiveDate, Utc};
use kinship_shared::{
    auth::{
        authorization::{require_active_family, require_family_admin},
        middleware::AuthContext,
    },
    holidays::plan_holiday_events,
    models::event::Event,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRequest {
    #[validate(range(min = 1900, max = 2200, message = "Year must be between 1900 and 2200"))]
    pub year: i32,

    /// ISO 3166 alpha-2; falls back to the configured default
    #[validate(length(equal = 2, message = "Country must be a two-letter code"))]
    pub country: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub year: i32,

    pub country: String,

    /// Holidays returned by the provider
    pub fetched: usize,

    pub created: usize,

    /// Already present in the family calendar
    pub skipped: usize,

    pub events: Vec<Event>,
}

/// `[Jan 1 of year, Jan 1 of year + 1)` in UTC
fn year_bounds(year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;

    Some((
        start.and_time(chrono::NaiveTime::MIN).and_utc(),
        end.and_time(chrono::NaiveTime::MIN).and_utc(),
    ))
}

/// Generate holiday events for a year (family admin)
///
/// # Errors
///
/// - `403 Forbidden`: caller is not an admin of the active family
/// - `502 Bad Gateway`: the provider failed; nothing is written
/// - `503 Service Unavailable`: no provider API key configured
pub async fn generate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    req.validate()?;
    let family_id = require_active_family(&auth)?;
    require_family_admin(&auth, family_id)?;

    let country = req
        .country
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or_else(|| state.config.holidays.default_country.clone());
    let (from, to) = year_bounds(req.year)
        .ok_or_else(|| ApiError::invalid_field("year", "Year is out of range"))?;

    let drafts = state.holidays.fetch_year(&country, req.year).await?;
    let fetched = drafts.len();

    let existing = Event::list_in_range(&state.db, family_id, from, to).await?;
    let planned = plan_holiday_events(&existing, drafts);

    let events = if planned.is_empty() {
        Vec::new()
    } else {
        Event::insert_holidays(&state.db, family_id, auth.user_id, &planned).await?
    };

    tracing::info!(
        family_id = %family_id,
        year = req.year,
        country = %country,
        fetched,
        created = events.len(),
        "Holiday events generated"
    );

    Ok(Json(GenerateResponse {
        year: req.year,
        country,
        fetched,
        created: events.len(),
        skipped: fetched.saturating_sub(events.len()),
        events,
    }))
}
