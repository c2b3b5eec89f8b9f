//! RSVP batch planning
//!
//! A batch request is resolved in two pure steps before anything touches the
//! database:
//!
//! 1. [`PermittedScope::resolve`] computes which users the caller may target.
//! 2. [`plan_batch`] filters the request against that scope and the status
//!    enumeration, producing a [`BatchPlan`].
//!
//! Rejected entries are not errors; they are counted in `skipped`. The plan is
//! then written atomically by [`crate::models::rsvp::Rsvp::apply_batch`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::AuthContext;
use crate::models::event::Event;
use crate::models::rsvp::RsvpStatus;

/// One requested upsert. `status` stays a string so unknown values can be
/// counted instead of failing the whole request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateEntry {
    pub user_id: Uuid,
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub updates: Vec<BatchUpdateEntry>,
    #[serde(default)]
    pub remove: Vec<Uuid>,
}

impl BatchRequest {
    pub fn submitted(&self) -> usize {
        self.updates.len() + self.remove.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// Host or family admin: every family member
    Family,
    /// Everyone else: self plus members of the caller's group
    Group,
}

/// Users a caller may write RSVPs for
#[derive(Debug, Clone)]
pub struct PermittedScope {
    pub kind: ScopeKind,
    users: HashSet<Uuid>,
}

impl PermittedScope {
    /// Resolves the caller's scope for one event
    ///
    /// `members` yields `(user_id, group_id)` for every member of the event's
    /// family.
    pub fn resolve<I>(caller: &AuthContext, event: &Event, members: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, Option<Uuid>)>,
    {
        let privileged = event.is_host(caller.user_id)
            || (caller.is_admin() && caller.family_id == Some(event.family_id));

        if privileged {
            let mut users: HashSet<Uuid> = members.into_iter().map(|(id, _)| id).collect();
            users.insert(caller.user_id);
            return Self {
                kind: ScopeKind::Family,
                users,
            };
        }

        let mut users = HashSet::from([caller.user_id]);
        if let Some(own_group) = caller.group_id {
            users.extend(
                members
                    .into_iter()
                    .filter(|(_, group)| *group == Some(own_group))
                    .map(|(id, _)| id),
            );
        }

        Self {
            kind: ScopeKind::Group,
            users,
        }
    }

    pub fn permits(&self, user_id: Uuid) -> bool {
        self.users.contains(&user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpsert {
    pub user_id: Uuid,
    pub status: RsvpStatus,
    pub note: Option<String>,
}

/// Accepted writes plus the rejected count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    pub upserts: Vec<PlannedUpsert>,
    pub removals: Vec<Uuid>,
    pub skipped: usize,
}

impl BatchPlan {
    pub fn accepted(&self) -> usize {
        self.upserts.len() + self.removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted() == 0
    }

    /// Every user id the plan writes to
    pub fn touched_users(&self) -> HashSet<Uuid> {
        self.upserts
            .iter()
            .map(|u| u.user_id)
            .chain(self.removals.iter().copied())
            .collect()
    }

    pub fn outcome(&self) -> BatchOutcome {
        BatchOutcome {
            updated: self.upserts.len(),
            removed: self.removals.len(),
            skipped: self.skipped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
}

/// Filters a request down to the writes the caller is allowed to make
///
/// Rules:
/// - targets outside `scope` are skipped
/// - statuses outside the four-value enumeration are skipped
/// - for repeated user ids the last entry wins, earlier ones are skipped
/// - a user both updated and removed is removed; the update is skipped
///
/// `skipped` always equals `request.submitted() - plan.accepted()`.
pub fn plan_batch(scope: &PermittedScope, request: &BatchRequest) -> BatchPlan {
    let mut removals = Vec::new();
    let mut removed = HashSet::new();
    for user_id in &request.remove {
        if scope.permits(*user_id) && removed.insert(*user_id) {
            removals.push(*user_id);
        }
    }

    let last_index: HashMap<Uuid, usize> = request
        .updates
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.user_id, index))
        .collect();

    let upserts: Vec<PlannedUpsert> = request
        .updates
        .iter()
        .enumerate()
        .filter(|(index, entry)| last_index.get(&entry.user_id) == Some(index))
        .filter(|(_, entry)| scope.permits(entry.user_id) && !removed.contains(&entry.user_id))
        .filter_map(|(_, entry)| {
            let status = entry.status.parse::<RsvpStatus>().ok()?;
            Some(PlannedUpsert {
                user_id: entry.user_id,
                status,
                note: entry
                    .note
                    .as_deref()
                    .map(str::trim)
                    .filter(|note| !note.is_empty())
                    .map(str::to_string),
            })
        })
        .collect();

    let accepted = upserts.len() + removals.len();

    BatchPlan {
        upserts,
        removals,
        skipped: request.submitted() - accepted,
    }
}
