//! REST API endpoints.
//!
//! Axum-based HTTP API for groups, matches, drafts and seasons.

pub mod routes;
pub mod state;

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::engine::EngineError;
use crate::models::{GroupId, SeasonError};
use state::AppState;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let message = e.to_string();
        match e {
            EngineError::InvalidMatch(_) | EngineError::Validation(_) => {
                ApiError::BadRequest(message)
            }
            EngineError::Season(
                SeasonError::EmptyName
                | SeasonError::InvalidBounds { .. }
                | SeasonError::LengthOutOfRange { .. },
            ) => ApiError::BadRequest(message),
            EngineError::Season(_)
            | EngineError::GroupExists(_)
            | EngineError::DraftNotFound(_) => ApiError::Conflict(message),
            EngineError::GroupNotFound(_) | EngineError::NoSeason(_) => ApiError::NotFound(message),
            EngineError::Contention { .. } | EngineError::Storage(_) => {
                error!("Request failed: {}", message);
                ApiError::Internal(message)
            }
        }
    }
}

/// Parse a group id taken from a URL path.
pub fn parse_group_id(raw: &str) -> Result<GroupId, ApiError> {
    let id = GroupId::from(raw);
    if !id.is_valid_key() || raw.contains(['/', '\\']) {
        return Err(ApiError::BadRequest(format!("invalid group id: {:?}", raw)));
    }
    Ok(id)
}

/// Pagination parameters.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
        }
    }
}

impl Pagination {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(50).clamp(1, 100),
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// The slice of `items` on this page.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.page_size as usize)
            .collect()
    }
}

/// Pagination metadata in responses.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(pagination: &Pagination, total_items: u32) -> Self {
        let total_pages = total_items.div_ceil(pagination.page_size);
        Self {
            page: pagination.page,
            page_size: pagination.page_size,
            total_items,
            total_pages,
            has_next: pagination.page < total_pages,
            has_prev: pagination.page > 1,
        }
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    use routes::{groups, matches, season};

    let cors = match state.config.server.cors_origin.as_str() {
        "*" => CorsLayer::new().allow_origin(Any),
        origin => match HeaderValue::from_str(origin) {
            Ok(origin) => CorsLayer::new().allow_origin(origin),
            Err(_) => CorsLayer::new(),
        },
    }
    .allow_methods(Any)
    .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/groups",
            get(groups::list_groups).post(groups::create_group),
        )
        .route("/api/groups/:id", get(groups::get_group))
        .route("/api/groups/:id/members", post(groups::add_member))
        .route("/api/groups/:id/leaderboard", get(groups::leaderboard))
        .route(
            "/api/groups/:id/matches",
            get(matches::list_matches).post(matches::record_match),
        )
        .route(
            "/api/groups/:id/draft",
            get(matches::get_draft)
                .put(matches::save_draft)
                .delete(matches::discard_draft),
        )
        .route("/api/groups/:id/draft/finish", post(matches::finish_draft))
        .route(
            "/api/groups/:id/season",
            post(season::start_season).patch(season::edit_season),
        )
        .route("/api/groups/:id/season/countdown", get(season::countdown))
        .route("/api/groups/:id/season/finalize", post(season::finalize))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::util::ServiceExt;

    use super::*;
    use crate::config::AppConfig;
    use crate::engine::SeasonEngine;
    use crate::notify::MockNotifier;
    use crate::storage::{MemoryMatchLog, MemoryStore};

    pub fn test_state() -> AppState {
        let engine = SeasonEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryMatchLog::new()),
            Arc::new(MockNotifier::new()),
        );
        AppState::new(Arc::new(engine), AppConfig::default())
    }

    pub async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        send(app, "GET", uri, None).await
    }

    pub async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
        send(app, "POST", uri, Some(body)).await
    }

    /// Create group `g1` owned by `owner` with members p1 and p2.
    pub async fn seed_group(app: Router) {
        let (status, _) = post_json(
            app,
            "/api/groups",
            r#"{"id": "g1", "name": "Thursday Football", "owner": "owner", "members": ["p1", "p2"]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}
