//! Search result models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{FollowableTopic, NewsResource, Topic, UserNewsResource};

/// Raw search hits resolved against the entity tables.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub topics: Vec<Topic>,
    pub news_resources: Vec<NewsResource>,
}

/// Search hits decorated with the user's state.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchResult {
    pub topics: Vec<FollowableTopic>,
    pub news_resources: Vec<UserNewsResource>,
}

/// A previously submitted search query.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecentSearchQuery {
    pub query: String,
    pub queried_date: DateTime<Utc>,
}
