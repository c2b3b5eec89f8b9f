/// API route handlers, one module per resource
///
/// - `health`: liveness and database status
/// - `auth`: signup, login, token refresh, activation, password reset
/// - `families`: families, membership and invite redemption
/// - `groups`: the group tree of the active family
/// - `events`: event CRUD
/// - `rsvps`: single and batch RSVPs
/// - `calendar`: `.ics` export and personal feeds
/// - `holidays`: holiday generation
/// - `settings`: account settings and phone verification
/// - `admin`: approvals and roles

pub mod admin;
pub mod auth;
pub mod calendar;
pub mod events;
pub mod families;
pub mod groups;
pub mod health;
pub mod holidays;
pub mod rsvps;
pub mod settings;

use serde::{Deserialize, Deserializer};

/// Keeps `null` apart from an absent key in PATCH bodies. Pair with
/// `#[serde(default)]`: absent is `None`, `null` is `Some(None)`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
