/// Authorization checks
///
/// Two roles exist: `admin` and `member`. On top of the role, events have a
/// host who alone may edit or delete them, and every family-scoped resource
/// is only visible from the caller's active family.
///
/// Resources belonging to another family are reported as
/// [`AuthzError::OutsideFamily`], which the API maps to 404 so ids from other
/// families are not confirmed to exist.
///
/// # Example
///
/// ```no_run
/// use kinship_shared::auth::authorization::{require_event_visible, require_host};
/// use kinship_shared::auth::middleware::AuthContext;
/// use kinship_shared::models::event::Event;
///
/// fn check(auth: &AuthContext, event: &Event) -> Result<(), Box<dyn std::error::Error>> {
///     require_event_visible(auth, event)?;
///     require_host(auth, event)?;
///     Ok(())
/// }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::event::Event;
use crate::models::user::User;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Join or create a family first")]
    NoActiveFamily,

    #[error("Admin role required")]
    AdminRequired,

    #[error("Only the host can change this event")]
    NotHost,

    #[error("Resource {0} is not in the active family")]
    OutsideFamily(Uuid),

    #[error("Every co-host must be a member of the family")]
    ForeignCohost,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    if !auth.is_admin() {
        return Err(AuthzError::AdminRequired);
    }
    Ok(())
}

/// Returns the active family id
pub fn require_active_family(auth: &AuthContext) -> Result<Uuid, AuthzError> {
    auth.require_family().ok_or(AuthzError::NoActiveFamily)
}

/// Family-scoped resources are only reachable from the active family
pub fn require_in_family(auth: &AuthContext, family_id: Uuid) -> Result<(), AuthzError> {
    if auth.family_id != Some(family_id) {
        return Err(AuthzError::OutsideFamily(family_id));
    }
    Ok(())
}

pub fn require_event_visible(auth: &AuthContext, event: &Event) -> Result<(), AuthzError> {
    require_in_family(auth, event.family_id).map_err(|_| AuthzError::OutsideFamily(event.id))
}

pub fn require_host(auth: &AuthContext, event: &Event) -> Result<(), AuthzError> {
    if !event.is_host(auth.user_id) {
        return Err(AuthzError::NotHost);
    }
    Ok(())
}

/// Admin acting on their own active family
pub fn require_family_admin(auth: &AuthContext, family_id: Uuid) -> Result<(), AuthzError> {
    require_admin(auth)?;
    require_in_family(auth, family_id)
}

/// Every id in `user_ids` must be an approved member of `family_id`
pub async fn require_family_members(
    pool: &PgPool,
    family_id: Uuid,
    user_ids: &[Uuid],
) -> Result<(), AuthzError> {
    if user_ids.is_empty() {
        return Ok(());
    }

    let mut unique = user_ids.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let found = User::count_in_family(pool, family_id, &unique).await?;
    if found != unique.len() as i64 {
        return Err(AuthzError::ForeignCohost);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use chrono::Utc;

    fn auth(role: UserRole, family_id: Option<Uuid>) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
            family_id,
            group_id: None,
            approved: true,
        }
    }

    fn event(family_id: Uuid, host_id: Uuid) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            family_id,
            host_id,
            title: "Sunday lunch".to_string(),
            description: None,
            location: None,
            link: None,
            start_at: now,
            end_at: None,
            is_holiday: false,
            holiday_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&auth(UserRole::Admin, None)).is_ok());
        assert!(matches!(
            require_admin(&auth(UserRole::Member, None)),
            Err(AuthzError::AdminRequired)
        ));
    }

    #[test]
    fn test_require_active_family() {
        let family_id = Uuid::new_v4();
        assert_eq!(
            require_active_family(&auth(UserRole::Member, Some(family_id))).unwrap(),
            family_id
        );
        assert!(matches!(
            require_active_family(&auth(UserRole::Member, None)),
            Err(AuthzError::NoActiveFamily)
        ));
    }

    #[test]
    fn test_event_in_other_family_is_hidden() {
        let caller = auth(UserRole::Admin, Some(Uuid::new_v4()));
        let foreign = event(Uuid::new_v4(), caller.user_id);

        match require_event_visible(&caller, &foreign) {
            Err(AuthzError::OutsideFamily(id)) => assert_eq!(id, foreign.id),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_only_host_may_edit() {
        let family_id = Uuid::new_v4();
        let host = auth(UserRole::Member, Some(family_id));
        let admin = auth(UserRole::Admin, Some(family_id));
        let ev = event(family_id, host.user_id);

        assert!(require_host(&host, &ev).is_ok());
        assert!(matches!(require_host(&admin, &ev), Err(AuthzError::NotHost)));
    }

    #[test]
    fn test_family_admin_needs_both() {
        let family_id = Uuid::new_v4();
        assert!(require_family_admin(&auth(UserRole::Admin, Some(family_id)), family_id).is_ok());
        assert!(require_family_admin(&auth(UserRole::Member, Some(family_id)), family_id).is_err());
        assert!(require_family_admin(&auth(UserRole::Admin, Some(Uuid::new_v4())), family_id).is_err());
    }
}
