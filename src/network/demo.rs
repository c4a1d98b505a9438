//! Change feed backed by bundled JSON assets, for development and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::NetworkDataSource;
use crate::errors::AppError;
use crate::models::{NetworkChangeList, NetworkNewsResource, NetworkTopic};

const TOPICS_ASSET: &str = "topics.json";
const NEWS_ASSET: &str = "news.json";

/// Serves `topics.json` and `news.json` from a directory.
///
/// The change list is synthesized from file order: the item at index `i`
/// has version `i`, and nothing is ever deleted.
pub struct DemoNetworkDataSource {
    assets_dir: PathBuf,
}

impl DemoNetworkDataSource {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    async fn read_asset<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>, AppError> {
        let path = self.assets_dir.join(file_name);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            AppError::Network(format!("Failed to read asset {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn filter_by_ids<T>(items: Vec<T>, ids: Option<&[String]>, id_of: impl Fn(&T) -> &str) -> Vec<T> {
    match ids {
        None => items,
        Some(ids) => items
            .into_iter()
            .filter(|item| ids.iter().any(|id| id == id_of(item)))
            .collect(),
    }
}

fn map_to_change_list<T>(
    items: &[T],
    after: Option<i64>,
    id_of: impl Fn(&T) -> &str,
) -> Vec<NetworkChangeList> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| NetworkChangeList {
            id: id_of(item).to_string(),
            change_list_version: index as i64,
            is_delete: false,
        })
        .filter(|change| after.map_or(true, |after| change.change_list_version > after))
        .collect()
}

#[async_trait]
impl NetworkDataSource for DemoNetworkDataSource {
    async fn get_topics(&self, ids: Option<&[String]>) -> Result<Vec<NetworkTopic>, AppError> {
        let topics = self.read_asset(TOPICS_ASSET).await?;
        Ok(filter_by_ids(topics, ids, |t: &NetworkTopic| t.id.as_str()))
    }

    async fn get_news_resources(
        &self,
        ids: Option<&[String]>,
    ) -> Result<Vec<NetworkNewsResource>, AppError> {
        let news = self.read_asset(NEWS_ASSET).await?;
        Ok(filter_by_ids(news, ids, |n: &NetworkNewsResource| {
            n.id.as_str()
        }))
    }

    async fn get_topic_change_list(
        &self,
        after: Option<i64>,
    ) -> Result<Vec<NetworkChangeList>, AppError> {
        let topics: Vec<NetworkTopic> = self.read_asset(TOPICS_ASSET).await?;
        Ok(map_to_change_list(&topics, after, |t| t.id.as_str()))
    }

    async fn get_news_resource_change_list(
        &self,
        after: Option<i64>,
    ) -> Result<Vec<NetworkChangeList>, AppError> {
        let news: Vec<NetworkNewsResource> = self.read_asset(NEWS_ASSET).await?;
        Ok(map_to_change_list(&news, after, |n| n.id.as_str()))
    }
}
