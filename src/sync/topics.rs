use std::sync::Arc;

use async_trait::async_trait;

use super::{cancellable, ChangeListModel, SyncPass};
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{NetworkChangeList, SyncCollection, Topic};
use crate::network::NetworkDataSource;

/// Keeps the local topics table in step with the remote topic feed.
pub struct TopicsSyncer {
    repo: Repository,
    network: Arc<dyn NetworkDataSource>,
    batch_size: usize,
}

impl TopicsSyncer {
    pub fn new(repo: Repository, network: Arc<dyn NetworkDataSource>, batch_size: usize) -> Self {
        Self {
            repo,
            network,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl ChangeListModel for TopicsSyncer {
    fn collection(&self) -> SyncCollection {
        SyncCollection::Topics
    }

    async fn fetch_change_list(&self, after: i64) -> Result<Vec<NetworkChangeList>, AppError> {
        self.network.get_topic_change_list(Some(after)).await
    }

    async fn delete_models(&self, ids: &[String]) -> Result<(), AppError> {
        let deleted = self.repo.delete_topics(ids).await?;
        tracing::debug!(requested = ids.len(), deleted, "Deleted topics");
        Ok(())
    }

    async fn update_models(&self, ids: &[String], pass: &SyncPass) -> Result<(), AppError> {
        for chunk in ids.chunks(self.batch_size) {
            let network_topics =
                cancellable(&pass.cancel, self.network.get_topics(Some(chunk))).await?;
            let topics: Vec<Topic> = network_topics.iter().map(|t| t.as_entity()).collect();
            cancellable(&pass.cancel, self.repo.upsert_topics(&topics)).await?;
            tracing::debug!(requested = chunk.len(), stored = topics.len(), "Stored topic batch");
        }
        Ok(())
    }
}
