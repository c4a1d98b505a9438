//! Remote change-feed clients.
//!
//! The sync pipeline only sees [`NetworkDataSource`]; the binary picks the
//! HTTP client or the bundled demo assets from configuration.

mod demo;
mod http;

pub use demo::DemoNetworkDataSource;
pub use http::HttpNetworkDataSource;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{NetworkChangeList, NetworkNewsResource, NetworkTopic, SyncCollection};

/// Interface to the remote content source.
#[async_trait]
pub trait NetworkDataSource: Send + Sync {
    /// Topics with the given ids, or every topic when `ids` is `None`.
    async fn get_topics(&self, ids: Option<&[String]>) -> Result<Vec<NetworkTopic>, AppError>;

    /// News resources with the given ids, or every one when `ids` is `None`.
    async fn get_news_resources(
        &self,
        ids: Option<&[String]>,
    ) -> Result<Vec<NetworkNewsResource>, AppError>;

    /// Topic changes after version `after`.
    async fn get_topic_change_list(
        &self,
        after: Option<i64>,
    ) -> Result<Vec<NetworkChangeList>, AppError>;

    /// News resource changes after version `after`.
    async fn get_news_resource_change_list(
        &self,
        after: Option<i64>,
    ) -> Result<Vec<NetworkChangeList>, AppError>;

    /// Change list for `collection` after version `after`.
    async fn get_change_list(
        &self,
        collection: SyncCollection,
        after: Option<i64>,
    ) -> Result<Vec<NetworkChangeList>, AppError> {
        match collection {
            SyncCollection::Topics => self.get_topic_change_list(after).await,
            SyncCollection::NewsResources => self.get_news_resource_change_list(after).await,
        }
    }
}
