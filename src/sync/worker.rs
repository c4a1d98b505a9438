use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{cancellable, SyncSession, Syncable};
use crate::db::PreferencesStore;
use crate::errors::AppError;
use crate::search::SearchContentsRepository;

/// Result of one sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Success,
    /// At least one collection failed; run again later.
    Retry,
}

/// A unit of work the scheduler can run.
#[async_trait]
pub trait SyncJob: Send + Sync {
    /// Run once. Only cancellation is reported as `Err`.
    async fn run(&self, cancel: CancellationToken) -> Result<SyncOutcome, AppError>;
}

/// Syncs every collection concurrently and refreshes the search index when
/// all of them succeed.
pub struct SyncWorker {
    prefs: PreferencesStore,
    topics: Arc<dyn Syncable>,
    news: Arc<dyn Syncable>,
    search: SearchContentsRepository,
}

impl SyncWorker {
    pub fn new(
        prefs: PreferencesStore,
        topics: Arc<dyn Syncable>,
        news: Arc<dyn Syncable>,
        search: SearchContentsRepository,
    ) -> Self {
        Self {
            prefs,
            topics,
            news,
            search,
        }
    }

    pub async fn do_work(&self, cancel: CancellationToken) -> Result<SyncOutcome, AppError> {
        let session = SyncSession::new(self.prefs.clone(), cancel.clone());
        tracing::info!("Sync started");

        let (topics, news) = tokio::join!(
            self.topics.sync_with(&session),
            self.news.sync_with(&session),
        );
        let topics_synced = topics?;
        let news_synced = news?;

        if !(topics_synced && news_synced) {
            tracing::warn!(topics_synced, news_synced, "Sync incomplete, will retry");
            return Ok(SyncOutcome::Retry);
        }

        match cancellable(&cancel, self.search.populate_fts_data()).await {
            Ok(()) => {
                tracing::info!("Sync finished");
                Ok(SyncOutcome::Success)
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                tracing::warn!(code = err.error_code(), "Search index refresh failed: {}", err);
                Ok(SyncOutcome::Retry)
            }
        }
    }
}

#[async_trait]
impl SyncJob for SyncWorker {
    async fn run(&self, cancel: CancellationToken) -> Result<SyncOutcome, AppError> {
        self.do_work(cancel).await
    }
}
