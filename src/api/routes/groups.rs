use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{parse_group_id, ApiError};
use crate::engine::Leaderboard;
use crate::models::{GroupDocument, GroupId, PlayerId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub player_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddMemberResponse {
    pub added: bool,
}

#[derive(Debug, Serialize)]
pub struct GroupListResponse {
    pub groups: Vec<GroupId>,
}

pub async fn list_groups(
    State(state): State<AppState>,
) -> Result<Json<GroupListResponse>, ApiError> {
    let groups = state
        .engine
        .store()
        .list()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(GroupListResponse { groups }))
}

pub async fn create_group(
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupDocument>), ApiError> {
    let id = request.id.as_deref().map(parse_group_id).transpose()?;
    let doc = state
        .engine
        .create_group(
            id,
            &request.name,
            PlayerId::from(request.owner),
            request.members.into_iter().map(PlayerId::from).collect(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GroupDocument>, ApiError> {
    let id = parse_group_id(&id)?;
    Ok(Json(state.engine.get_group(&id).await?))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AddMemberRequest>,
) -> Result<Json<AddMemberResponse>, ApiError> {
    let id = parse_group_id(&id)?;
    let added = state
        .engine
        .add_member(&id, PlayerId::from(request.player_id), request.display_name)
        .await?;
    Ok(Json(AddMemberResponse { added }))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Leaderboard>, ApiError> {
    let id = parse_group_id(&id)?;
    Ok(Json(state.engine.leaderboard(&id).await?))
}
