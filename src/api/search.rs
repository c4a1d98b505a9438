//! Search API endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::{error, success, ApiResult};
use crate::domain::SearchContents;
use crate::models::RecentSearchQuery;
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentSearchParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecordSearchRequest {
    pub query: String,
}

/// GET /api/search - Search topics and news.
pub async fn search_contents(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchContents> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.views.get_search_contents(&params.q).await {
        Ok(contents) => success(contents, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/recent-searches - Most recent queries first.
pub async fn list_recent_searches(
    State(state): State<AppState>,
    Query(params): Query<RecentSearchParams>,
) -> ApiResult<Vec<RecentSearchQuery>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.views.get_recent_search_queries(params.limit).await {
        Ok(queries) => success(queries, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/recent-searches - Record a submitted query.
pub async fn record_recent_search(
    State(state): State<AppState>,
    Json(request): Json<RecordSearchRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.views.record_search_query(&request.query).await {
        Ok(()) => success((), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/recent-searches
pub async fn clear_recent_searches(State(state): State<AppState>) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.views.clear_recent_searches().await {
        Ok(()) => success((), revision_id),
        Err(e) => error(e, revision_id),
    }
}
