use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{parse_group_id, ApiError};
use crate::engine::{CountdownState, FinalizeOutcome};
use crate::models::{Season, SeasonEdit, SeasonScope};
use crate::parse_duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSeasonRequest {
    pub scope: SeasonScope,
    pub name: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Length instead of an end time, e.g. "7d"
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownResponse {
    #[serde(flatten)]
    pub state: CountdownState,
    pub display: String,
}

pub async fn start_season(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<StartSeasonRequest>,
) -> Result<(StatusCode, Json<Season>), ApiError> {
    let id = parse_group_id(&id)?;

    let end_time = match (&request.end_time, &request.duration) {
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "give either endTime or duration, not both".to_string(),
            ))
        }
        (Some(end), None) => Some(*end),
        (None, Some(duration)) => {
            let length = parse_duration(duration)
                .and_then(|d| chrono::Duration::from_std(d).ok())
                .ok_or_else(|| ApiError::BadRequest(format!("invalid duration: {:?}", duration)))?;
            let start = request
                .start_time
                .unwrap_or_else(|| state.engine.clock().now());
            Some(
                Season::end_after(start, length)
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?,
            )
        }
        (None, None) => None,
    };

    let season = state
        .engine
        .start_season(&id, request.scope, &request.name, request.start_time, end_time)
        .await?;
    Ok((StatusCode::CREATED, Json(season)))
}

pub async fn edit_season(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(edit): Json<SeasonEdit>,
) -> Result<Json<Season>, ApiError> {
    let id = parse_group_id(&id)?;
    Ok(Json(state.engine.edit_season(&id, edit).await?))
}

pub async fn countdown(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CountdownResponse>, ApiError> {
    let id = parse_group_id(&id)?;
    let countdown = state.engine.countdown(&id).await?;
    Ok(Json(CountdownResponse {
        display: countdown.display(),
        state: countdown,
    }))
}

/// Finalize if expired. Safe to call repeatedly.
pub async fn finalize(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FinalizeOutcome>, ApiError> {
    let id = parse_group_id(&id)?;
    Ok(Json(state.engine.finalize_season(&id).await?))
}
