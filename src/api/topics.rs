//! Topic API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{error, success, ApiResult};
use crate::models::{FollowableTopic, TopicSortField};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TopicListQuery {
    #[serde(default)]
    pub sort: TopicSortField,
}

#[derive(Debug, Deserialize)]
pub struct FollowTopicRequest {
    pub followed: bool,
}

/// GET /api/topics - List all topics with their followed flag.
pub async fn list_topics(
    State(state): State<AppState>,
    Query(params): Query<TopicListQuery>,
) -> ApiResult<Vec<FollowableTopic>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.views.get_followable_topics(params.sort).await {
        Ok(topics) => success(topics, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/topics/:id - Get a single topic.
pub async fn get_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<FollowableTopic> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.views.get_followable_topic(&id).await {
        Ok(topic) => success(topic, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/topics/:id/follow - Follow or unfollow a topic.
pub async fn follow_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FollowTopicRequest>,
) -> ApiResult<FollowableTopic> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    // Unknown topics 404 before touching preferences
    if let Err(e) = state.views.get_followable_topic(&id).await {
        return error(e, revision_id);
    }
    if let Err(e) = state.prefs.set_topic_id_followed(&id, request.followed).await {
        return error(e, revision_id);
    }

    match state.views.get_followable_topic(&id).await {
        Ok(topic) => success(topic, revision_id),
        Err(e) => error(e, revision_id),
    }
}
