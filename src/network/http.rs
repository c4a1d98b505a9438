//! HTTP change-feed client.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::NetworkDataSource;
use crate::errors::AppError;
use crate::models::{NetworkChangeList, NetworkNewsResource, NetworkResponse, NetworkTopic};

/// Change-feed client speaking JSON over HTTP.
///
/// Entity endpoints wrap their payload as `{"data": [...]}`; change-list
/// endpoints return bare arrays.
pub struct HttpNetworkDataSource {
    client: Client,
    base_url: String,
}

impl HttpNetworkDataSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Network(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        Ok(response.json().await?)
    }
}

fn id_params(ids: Option<&[String]>) -> Vec<(&'static str, String)> {
    ids.unwrap_or_default()
        .iter()
        .map(|id| ("id", id.clone()))
        .collect()
}

fn after_params(after: Option<i64>) -> Vec<(&'static str, String)> {
    after
        .map(|v| vec![("after", v.to_string())])
        .unwrap_or_default()
}

#[async_trait]
impl NetworkDataSource for HttpNetworkDataSource {
    async fn get_topics(&self, ids: Option<&[String]>) -> Result<Vec<NetworkTopic>, AppError> {
        let response: NetworkResponse<Vec<NetworkTopic>> =
            self.get_json("topics", &id_params(ids)).await?;
        Ok(response.data)
    }

    async fn get_news_resources(
        &self,
        ids: Option<&[String]>,
    ) -> Result<Vec<NetworkNewsResource>, AppError> {
        let response: NetworkResponse<Vec<NetworkNewsResource>> =
            self.get_json("newsresources", &id_params(ids)).await?;
        Ok(response.data)
    }

    async fn get_topic_change_list(
        &self,
        after: Option<i64>,
    ) -> Result<Vec<NetworkChangeList>, AppError> {
        self.get_json("changelists/topics", &after_params(after))
            .await
    }

    async fn get_news_resource_change_list(
        &self,
        after: Option<i64>,
    ) -> Result<Vec<NetworkChangeList>, AppError> {
        self.get_json("changelists/newsresources", &after_params(after))
            .await
    }
}
