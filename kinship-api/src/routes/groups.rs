/// Group endpoints
///
/// Groups form a tree inside the active family. Every family has a root
/// group, created on first access, which cannot be deleted or reparented.
///
/// - `GET    /v1/groups` - Nested group tree of the active family
/// - `POST   /v1/groups` - Create a group (defaults to under the root)
/// - `PATCH  /v1/groups/:id` - Rename and/or reparent
/// - `DELETE /v1/groups/:id` - Delete; children move up, members lose the group
/// - `GET    /v1/groups/:id/members` - Members of the group and its subgroups
/// - `POST   /v1/groups/:id/invite-code` - Rotate the group code
/// - `POST   /v1/groups/:id/switch` - Make the group active
/// - `POST   /v1/group/leave` - Clear the active group

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use kinship_shared::{
    auth::{authorization::require_active_family, middleware::AuthContext},
    context::ActiveContext,
    hierarchy::{GroupForest, GroupNode},
    invite,
    models::{
        family::Family,
        group::{CreateGroup, Group},
        user::{MemberSummary, User},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct GroupTreeResponse {
    pub active_group_id: Option<Uuid>,

    pub groups: Vec<GroupNode>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 60, message = "Nickname must be 1-60 characters"))]
    pub nickname: String,

    /// Defaults to the family's root group
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGroupRequest {
    #[validate(length(min = 1, max = 60, message = "Nickname must be 1-60 characters"))]
    pub nickname: Option<String>,

    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub context: ActiveContext,
}

/// Loads the active family's groups into a validated forest, making sure the
/// root exists first
async fn load_forest(state: &AppState, family_id: Uuid) -> ApiResult<GroupForest> {
    let family = Family::find_by_id(&state.db, family_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Family not found".to_string()))?;
    Group::ensure_root(&state.db, &family).await?;

    let forest = GroupForest::new(Group::list_by_family(&state.db, family_id).await?);
    forest.validate()?;

    Ok(forest)
}

/// Group by id, hidden unless it belongs to the caller's active family
async fn group_in_family(state: &AppState, auth: &AuthContext, id: Uuid) -> ApiResult<Group> {
    let family_id = require_active_family(auth)?;

    Group::find_by_id(&state.db, id)
        .await?
        .filter(|group| group.family_id == family_id)
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))
}

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<GroupTreeResponse>> {
    let family_id = require_active_family(&auth)?;
    let forest = load_forest(&state, family_id).await?;

    Ok(Json(GroupTreeResponse {
        active_group_id: auth.group_id,
        groups: forest.tree(),
    }))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    req.validate()?;
    let family_id = require_active_family(&auth)?;
    let forest = load_forest(&state, family_id).await?;

    let parent_id = match req.parent_id {
        Some(parent_id) if forest.contains(parent_id) => parent_id,
        Some(_) => return Err(ApiError::NotFound("Parent group not found".to_string())),
        None => forest
            .roots()
            .next()
            .map(|root| root.id)
            .ok_or_else(|| ApiError::InternalError("Family has no root group".to_string()))?,
    };

    let mut conn = state.db.acquire().await?;
    let group = Group::create(
        &mut conn,
        CreateGroup {
            family_id,
            nickname: req.nickname.trim().to_string(),
            parent_id: Some(parent_id),
        },
    )
    .await?;

    tracing::info!(group_id = %group.id, family_id = %family_id, parent_id = %parent_id, "Group created");

    Ok((StatusCode::CREATED, Json(group)))
}

/// Rename and/or move a group
///
/// # Errors
///
/// - `400 Bad Request`: moving the root, or a move that would create a cycle
/// - `404 Not Found`: group or new parent outside the active family
pub async fn update_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateGroupRequest>,
) -> ApiResult<Json<Group>> {
    req.validate()?;
    let mut group = group_in_family(&state, &auth, id).await?;

    if let Some(parent_id) = req.parent_id {
        group = Group::reparent(&state.db, group.family_id, group.id, parent_id).await?;
    }

    if let Some(nickname) = req.nickname {
        group = Group::rename(&state.db, group.id, nickname.trim())
            .await?
            .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))?;
    }

    Ok(Json(group))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let group = group_in_family(&state, &auth, id).await?;

    if group.is_root() {
        return Err(ApiError::BadRequest("The root group cannot be deleted".to_string()));
    }

    if !Group::delete(&state.db, &group).await? {
        return Err(ApiError::NotFound("Group not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Members of the group and of every group beneath it
pub async fn list_subtree_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<MemberSummary>>> {
    let group = group_in_family(&state, &auth, id).await?;
    let forest = load_forest(&state, group.family_id).await?;
    let members = User::list_by_family(&state.db, group.family_id).await?;

    let in_subtree = forest.members_in_subtree(
        group.id,
        members.iter().map(|member| (member.id, member.group_id)),
    )?;

    Ok(Json(
        members
            .into_iter()
            .filter(|member| in_subtree.contains(&member.id))
            .collect(),
    ))
}

/// Replace a group's invite code; any member of the family may do this
pub async fn rotate_group_code(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Group>> {
    let group = group_in_family(&state, &auth, id).await?;

    let group = invite::rotate_group_code(&state.db, group.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))?;

    tracing::info!(group_id = %group.id, rotated_by = %auth.user_id, "Group invite code rotated");

    Ok(Json(group))
}

pub async fn switch_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ContextResponse>> {
    let group = group_in_family(&state, &auth, id).await?;

    let context = auth.active_context().switch_group(&group)?;
    let mut conn = state.db.acquire().await?;
    User::set_context(&mut conn, auth.user_id, context).await?;

    Ok(Json(ContextResponse { context }))
}

pub async fn leave_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ContextResponse>> {
    let context = auth.active_context().leave_group();
    let mut conn = state.db.acquire().await?;
    User::set_context(&mut conn, auth.user_id, context).await?;

    Ok(Json(ContextResponse { context }))
}
