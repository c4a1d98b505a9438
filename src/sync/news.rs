use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{cancellable, ChangeListModel, SyncPass};
use crate::db::{PreferencesStore, Repository};
use crate::errors::AppError;
use crate::models::{NetworkChangeList, NewsResourceQuery, SyncCollection};
use crate::network::NetworkDataSource;
use crate::notifications::Notifier;

/// Keeps the local news resources in step with the remote news feed and
/// notifies about news added under followed topics.
pub struct NewsSyncer {
    repo: Repository,
    prefs: PreferencesStore,
    network: Arc<dyn NetworkDataSource>,
    notifier: Arc<dyn Notifier>,
    batch_size: usize,
}

impl NewsSyncer {
    pub fn new(
        repo: Repository,
        prefs: PreferencesStore,
        network: Arc<dyn NetworkDataSource>,
        notifier: Arc<dyn Notifier>,
        batch_size: usize,
    ) -> Self {
        Self {
            repo,
            prefs,
            network,
            notifier,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl ChangeListModel for NewsSyncer {
    fn collection(&self) -> SyncCollection {
        SyncCollection::NewsResources
    }

    async fn fetch_change_list(&self, after: i64) -> Result<Vec<NetworkChangeList>, AppError> {
        self.network.get_news_resource_change_list(Some(after)).await
    }

    async fn delete_models(&self, ids: &[String]) -> Result<(), AppError> {
        let deleted = self.repo.delete_news_resources(ids).await?;
        tracing::debug!(requested = ids.len(), deleted, "Deleted news resources");
        Ok(())
    }

    async fn update_models(&self, ids: &[String], pass: &SyncPass) -> Result<(), AppError> {
        let user_data = self.prefs.user_data().await?;
        let first_sync = pass.is_first_sync();
        let notify = user_data.should_hide_onboarding && !first_sync;
        let followed = user_data.followed_topics;

        // Snapshot before writing: anything already stored under a followed
        // topic is not news to the user.
        let existing: BTreeSet<String> = if notify {
            self.repo
                .get_news_resource_ids(
                    &NewsResourceQuery::all()
                        .with_topic_ids(followed.iter().cloned())
                        .with_news_ids(ids.iter().cloned()),
                )
                .await?
                .into_iter()
                .collect()
        } else {
            BTreeSet::new()
        };

        if first_sync {
            // Everything is new on a fresh install; don't flag it as unread.
            self.prefs.set_news_resources_viewed(ids, true).await?;
        }

        for chunk in ids.chunks(self.batch_size) {
            let resources =
                cancellable(&pass.cancel, self.network.get_news_resources(Some(chunk))).await?;
            cancellable(&pass.cancel, self.repo.apply_news_batch(&resources)).await?;
            tracing::debug!(
                requested = chunk.len(),
                stored = resources.len(),
                "Stored news batch"
            );
        }

        if notify {
            let added: Vec<String> = ids
                .iter()
                .filter(|id| !existing.contains(*id))
                .cloned()
                .collect();
            let added_news = self
                .repo
                .get_news_resources(
                    &NewsResourceQuery::all()
                        .with_topic_ids(followed.iter().cloned())
                        .with_news_ids(added),
                )
                .await?;
            if !added_news.is_empty() {
                self.notifier.post_news_notifications(&added_news);
            }
        }
        Ok(())
    }
}
