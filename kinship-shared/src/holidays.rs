//! Public holiday ingestion
//!
//! Holidays come from a Calendarific-style HTTP API, one country and year
//! per request. Only entries whose type list mentions "holiday" are kept.
//! Before insertion, drafts are deduplicated against the family's existing
//! events: a draft is dropped when an event on the same calendar date has the
//! same normalized title or the same holiday key. Running generation twice
//! for one year therefore inserts nothing the second time.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::models::event::Event;

#[derive(Debug, Error)]
pub enum HolidayError {
    #[error("Holiday API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Holiday API returned HTTP {status}")]
    Status { status: u16 },

    #[error("Holiday API is not configured")]
    NotConfigured,
}

/// A holiday ready to become an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayDraft {
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub key: String,
}

impl HolidayDraft {
    pub fn new(title: &str, description: Option<String>, date: NaiveDate) -> Self {
        Self {
            title: title.trim().to_string(),
            description: description.filter(|d| !d.trim().is_empty()),
            key: holiday_key(title, date),
            date,
        }
    }

    /// Midnight UTC on the holiday's date
    pub fn start_at(&self) -> DateTime<Utc> {
        self.date.and_time(chrono::NaiveTime::MIN).and_utc()
    }
}

/// Lowercases and collapses every run of non-alphanumerics into one space
pub fn normalize_title(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"<yyyy>-<slug>"`, e.g. `2025-new-year-s-day`
pub fn holiday_key(title: &str, date: NaiveDate) -> String {
    format!("{}-{}", date.year(), normalize_title(title).replace(' ', "-"))
}

/// Drafts that do not duplicate `existing` or each other
pub fn plan_holiday_events(existing: &[Event], drafts: Vec<HolidayDraft>) -> Vec<HolidayDraft> {
    let mut titles: HashSet<(NaiveDate, String)> = HashSet::new();
    let mut keys: HashSet<(NaiveDate, String)> = HashSet::new();

    for event in existing {
        let date = event.start_at.date_naive();
        titles.insert((date, normalize_title(&event.title)));
        if let Some(key) = &event.holiday_key {
            keys.insert((date, key.clone()));
        }
    }

    drafts
        .into_iter()
        .filter(|draft| {
            let title = (draft.date, normalize_title(&draft.title));
            let key = (draft.date, draft.key.clone());
            if titles.contains(&title) || keys.contains(&key) {
                return false;
            }
            titles.insert(title);
            keys.insert(key);
            true
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct CalendarificResponse {
    pub response: CalendarificBody,
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarificBody {
    #[serde(default)]
    pub holidays: Vec<CalendarificHoliday>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarificHoliday {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: CalendarificDate,
    #[serde(default, rename = "type")]
    pub kinds: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarificDate {
    /// `2025-01-01`, or a full timestamp for time-specific entries
    pub iso: String,
}

impl CalendarificHoliday {
    pub fn is_holiday(&self) -> bool {
        self.kinds
            .iter()
            .any(|kind| kind.to_ascii_lowercase().contains("holiday"))
    }

    fn date(&self) -> Option<NaiveDate> {
        let day = self.date.iso.get(..10)?;
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }
}

/// Keeps holiday-typed entries with a parseable date
pub fn drafts_from_response(body: CalendarificResponse) -> Vec<HolidayDraft> {
    body.response
        .holidays
        .into_iter()
        .filter(CalendarificHoliday::is_holiday)
        .filter_map(|holiday| {
            let Some(date) = holiday.date() else {
                tracing::debug!(name = %holiday.name, iso = %holiday.date.iso, "Skipping holiday with unparseable date");
                return None;
            };
            Some(HolidayDraft::new(&holiday.name, holiday.description, date))
        })
        .collect()
}

/// HTTP client for the holiday API
#[derive(Debug, Clone)]
pub struct HolidayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HolidayClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, HolidayError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kinship/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Fetches one year of holidays. Not retried on failure.
    pub async fn fetch_year(&self, country: &str, year: i32) -> Result<Vec<HolidayDraft>, HolidayError> {
        let api_key = self.api_key.as_deref().ok_or(HolidayError::NotConfigured)?;
        let year = year.to_string();

        let response = self
            .http
            .get(&self.base_url)
            .query(&[("api_key", api_key), ("country", country), ("year", year.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), country, "Holiday API error");
            return Err(HolidayError::Status {
                status: status.as_u16(),
            });
        }

        let body: CalendarificResponse = response.json().await?;
        let drafts = drafts_from_response(body);

        tracing::info!(country, year = %year, count = drafts.len(), "Fetched holidays");

        Ok(drafts)
    }
}
