//! News API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{error, split_ids, success, ApiResult};
use crate::models::{NewsResourceQuery, UserData, UserNewsResource};
use crate::AppState;

/// Filters for GET /api/news. Each is a comma-separated id list.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsListQuery {
    pub topic_ids: Option<String>,
    pub news_ids: Option<String>,
}

impl NewsListQuery {
    fn to_query(&self) -> NewsResourceQuery {
        let mut query = NewsResourceQuery::all();
        if let Some(ids) = &self.topic_ids {
            query = query.with_topic_ids(split_ids(ids));
        }
        if let Some(ids) = &self.news_ids {
            query = query.with_news_ids(split_ids(ids));
        }
        query
    }
}

#[derive(Debug, Deserialize)]
pub struct BookmarkRequest {
    pub bookmarked: bool,
}

#[derive(Debug, Deserialize)]
pub struct ViewedRequest {
    pub viewed: bool,
}

/// GET /api/news - News resources, newest first.
pub async fn list_news(
    State(state): State<AppState>,
    Query(params): Query<NewsListQuery>,
) -> ApiResult<Vec<UserNewsResource>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.views.observe_all(&params.to_query()).await {
        Ok(news) => success(news, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/news/for-you - News under followed topics.
pub async fn for_you(State(state): State<AppState>) -> ApiResult<Vec<UserNewsResource>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.views.observe_all_for_followed_topics().await {
        Ok(news) => success(news, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/bookmarks - Bookmarked news.
pub async fn list_bookmarks(State(state): State<AppState>) -> ApiResult<Vec<UserNewsResource>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.views.observe_all_bookmarked().await {
        Ok(news) => success(news, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/news/:id/bookmark
pub async fn set_bookmarked(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<BookmarkRequest>,
) -> ApiResult<UserData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = state
        .prefs
        .set_news_resource_bookmarked(&id, request.bookmarked)
        .await
    {
        return error(e, revision_id);
    }
    match state.prefs.user_data().await {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/news/:id/viewed
pub async fn set_viewed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ViewedRequest>,
) -> ApiResult<UserData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = state
        .prefs
        .set_news_resources_viewed([&id], request.viewed)
        .await
    {
        return error(e, revision_id);
    }
    match state.prefs.user_data().await {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}
