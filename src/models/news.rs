//! News resource models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FollowableTopic, Topic, UserData};

/// A stored news resource row, without its topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsResourceEntity {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub header_image_url: Option<String>,
    pub publish_date: DateTime<Utc>,
    pub resource_type: String,
}

/// Join row linking one news resource to one topic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NewsResourceTopicCrossRef {
    pub news_resource_id: String,
    pub topic_id: String,
}

/// A news resource with its topics populated.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewsResource {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub header_image_url: Option<String>,
    pub publish_date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub topics: Vec<Topic>,
}

impl NewsResource {
    pub fn from_entity(entity: NewsResourceEntity, topics: Vec<Topic>) -> Self {
        Self {
            id: entity.id,
            title: entity.title,
            content: entity.content,
            url: entity.url,
            header_image_url: entity.header_image_url,
            publish_date: entity.publish_date,
            resource_type: entity.resource_type,
            topics,
        }
    }
}

/// Filters for news resource reads.
///
/// `None` disables a filter; `Some` of an empty set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsResourceQuery {
    pub filter_topic_ids: Option<BTreeSet<String>>,
    pub filter_news_ids: Option<BTreeSet<String>>,
}

impl NewsResourceQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_topic_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.filter_topic_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_news_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.filter_news_ids = Some(ids.into_iter().collect());
        self
    }

    /// True when a filter is present but empty, so no row can match.
    pub fn matches_nothing(&self) -> bool {
        self.filter_topic_ids.as_ref().is_some_and(|ids| ids.is_empty())
            || self.filter_news_ids.as_ref().is_some_and(|ids| ids.is_empty())
    }
}

/// A news resource decorated with the user's state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserNewsResource {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub header_image_url: Option<String>,
    pub publish_date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub followable_topics: Vec<FollowableTopic>,
    pub is_saved: bool,
    pub has_been_viewed: bool,
}

impl UserNewsResource {
    pub fn new(news: NewsResource, user_data: &UserData) -> Self {
        let followable_topics = news
            .topics
            .into_iter()
            .map(|topic| FollowableTopic {
                is_followed: user_data.followed_topics.contains(&topic.id),
                topic,
            })
            .collect();

        Self {
            is_saved: user_data.bookmarked_news_resources.contains(&news.id),
            has_been_viewed: user_data.viewed_news_resources.contains(&news.id),
            id: news.id,
            title: news.title,
            content: news.content,
            url: news.url,
            header_image_url: news.header_image_url,
            publish_date: news.publish_date,
            resource_type: news.resource_type,
            followable_topics,
        }
    }
}

pub fn map_to_user_news_resources(
    news: Vec<NewsResource>,
    user_data: &UserData,
) -> Vec<UserNewsResource> {
    news.into_iter()
        .map(|n| UserNewsResource::new(n, user_data))
        .collect()
}
