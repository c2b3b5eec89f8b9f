//! Active family/group pointer
//!
//! Each user has one active family and at most one active group, stored on
//! the user row. All changes go through the transitions below so the
//! "group belongs to the active family" invariant is checked in one place.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::group::Group;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Group {group_id} does not belong to the active family")]
    GroupOutsideFamily { group_id: Uuid },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveContext {
    pub family_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

impl ActiveContext {
    /// Makes `family_id` active. The group pointer is always cleared since
    /// group membership does not carry across families.
    pub fn switch_family(self, family_id: Uuid) -> Self {
        Self {
            family_id: Some(family_id),
            group_id: None,
        }
    }

    /// Makes `group` active within the current family
    pub fn switch_group(self, group: &Group) -> Result<Self, ContextError> {
        if self.family_id != Some(group.family_id) {
            return Err(ContextError::GroupOutsideFamily { group_id: group.id });
        }

        Ok(Self {
            group_id: Some(group.id),
            ..self
        })
    }

    /// Switches family when needed, then group; used by group-code redemption
    pub fn join_group(self, group: &Group) -> Self {
        let base = if self.family_id == Some(group.family_id) {
            self
        } else {
            self.switch_family(group.family_id)
        };

        Self {
            group_id: Some(group.id),
            ..base
        }
    }

    pub fn leave_group(self) -> Self {
        Self {
            group_id: None,
            ..self
        }
    }
}
