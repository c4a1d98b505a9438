//! User data API endpoints.

use axum::{extract::State, Json};

use super::{error, success, ApiResult};
use crate::models::{UpdatePreferencesRequest, UserData};
use crate::AppState;

/// GET /api/user-data
pub async fn get_user_data(State(state): State<AppState>) -> ApiResult<UserData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.prefs.user_data().await {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/user-data/preferences - Update presentation settings.
pub async fn update_preferences(
    State(state): State<AppState>,
    Json(request): Json<UpdatePreferencesRequest>,
) -> ApiResult<UserData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.prefs.apply_preferences(&request).await {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}
