//! Sync control endpoints.

use axum::extract::State;
use serde::Serialize;

use super::{success, ApiResult};
use crate::sync::{EnqueueResult, SyncStatus};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestResponse {
    pub result: EnqueueResult,
    pub status: SyncStatus,
}

/// GET /api/sync/status
pub async fn sync_status(State(state): State<AppState>) -> ApiResult<SyncStatus> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    success(state.scheduler.status(), revision_id)
}

/// POST /api/sync - Request the unique sync job.
pub async fn request_sync(State(state): State<AppState>) -> ApiResult<SyncRequestResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = state.scheduler.request_sync();
    success(
        SyncRequestResponse {
            result,
            status: state.scheduler.status(),
        },
        revision_id,
    )
}
