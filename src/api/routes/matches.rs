use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::api::{parse_group_id, ApiError, Pagination, PaginationMeta};
use crate::engine::MatchReceipt;
use crate::models::{DraftMatch, MatchRecord, MatchSubmission};

#[derive(Debug, Deserialize)]
pub struct ListMatchesParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MatchListResponse {
    pub matches: Vec<MatchRecord>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Deserialize)]
pub struct FinishDraftParams {
    pub draft_id: Option<Uuid>,
}

pub async fn record_match(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(submission): Json<MatchSubmission>,
) -> Result<(StatusCode, Json<MatchReceipt>), ApiError> {
    let id = parse_group_id(&id)?;
    let receipt = state.engine.record_match(&id, submission).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Match log, newest first.
pub async fn list_matches(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ListMatchesParams>,
) -> Result<Json<MatchListResponse>, ApiError> {
    let id = parse_group_id(&id)?;
    let mut matches = state.engine.list_matches(&id).await?;
    matches.reverse();

    let pagination = Pagination::new(params.page, params.page_size);
    let meta = PaginationMeta::new(&pagination, matches.len() as u32);
    Ok(Json(MatchListResponse {
        matches: pagination.apply(matches),
        pagination: meta,
    }))
}

pub async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DraftMatch>, ApiError> {
    let id = parse_group_id(&id)?;
    state
        .engine
        .load_draft(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no draft match in group {}", id)))
}

pub async fn save_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(submission): Json<MatchSubmission>,
) -> Result<Json<DraftMatch>, ApiError> {
    let id = parse_group_id(&id)?;
    Ok(Json(state.engine.save_draft(&id, submission).await?))
}

pub async fn discard_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_group_id(&id)?;
    if state.engine.discard_draft(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no draft match in group {}", id)))
    }
}

pub async fn finish_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<FinishDraftParams>,
) -> Result<(StatusCode, Json<MatchReceipt>), ApiError> {
    let id = parse_group_id(&id)?;
    let receipt = state.engine.finish_draft(&id, params.draft_id).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
