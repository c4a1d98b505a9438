//! Read models combining stored content with the user's state.
//!
//! Every view is a snapshot. Callers that need live updates hold a
//! [`ViewWatcher`] and re-read after each change it reports.

use serde::Serialize;
use tokio::sync::watch;

use crate::db::{PreferencesStore, Repository};
use crate::errors::AppError;
use crate::models::{
    map_to_user_news_resources, FollowableTopic, NewsResourceQuery, RecentSearchQuery,
    TopicSortField, UserData, UserNewsResource, UserSearchResult,
};
use crate::search::SearchContentsRepository;

/// Queries shorter than this (after trimming) are not searched.
pub const SEARCH_QUERY_MIN_LENGTH: usize = 2;
/// Search is unavailable until at least this many documents are indexed.
pub const SEARCH_MIN_FTS_ENTITY_COUNT: u64 = 1;
pub const DEFAULT_RECENT_SEARCH_LIMIT: i64 = 10;

/// Outcome of a search request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "camelCase")]
pub enum SearchContents {
    EmptyQuery,
    /// The index has not been populated by a successful sync yet.
    SearchNotReady,
    Success(UserSearchResult),
}

#[derive(Clone)]
pub struct ContentViews {
    repo: Repository,
    prefs: PreferencesStore,
    search: SearchContentsRepository,
}

impl ContentViews {
    pub fn new(repo: Repository, prefs: PreferencesStore, search: SearchContentsRepository) -> Self {
        Self {
            repo,
            prefs,
            search,
        }
    }

    // ==================== TOPICS ====================

    /// Every topic with its followed flag.
    pub async fn get_followable_topics(
        &self,
        sort_by: TopicSortField,
    ) -> Result<Vec<FollowableTopic>, AppError> {
        let user_data = self.prefs.user_data().await?;
        let mut topics: Vec<FollowableTopic> = self
            .repo
            .list_topics()
            .await?
            .into_iter()
            .map(|topic| FollowableTopic {
                is_followed: user_data.followed_topics.contains(&topic.id),
                topic,
            })
            .collect();

        if sort_by == TopicSortField::Name {
            topics.sort_by(|a, b| a.topic.name.cmp(&b.topic.name));
        }
        Ok(topics)
    }

    pub async fn get_followable_topic(&self, id: &str) -> Result<FollowableTopic, AppError> {
        let topic = self
            .repo
            .get_topic(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Topic not found: {}", id)))?;
        let user_data = self.prefs.user_data().await?;
        Ok(FollowableTopic {
            is_followed: user_data.followed_topics.contains(&topic.id),
            topic,
        })
    }

    // ==================== NEWS ====================

    pub async fn observe_all(
        &self,
        query: &NewsResourceQuery,
    ) -> Result<Vec<UserNewsResource>, AppError> {
        let user_data = self.prefs.user_data().await?;
        self.user_news(query, &user_data).await
    }

    /// News under any followed topic; empty when nothing is followed.
    pub async fn observe_all_for_followed_topics(&self) -> Result<Vec<UserNewsResource>, AppError> {
        let user_data = self.prefs.user_data().await?;
        let query = NewsResourceQuery::all().with_topic_ids(user_data.followed_topics.iter().cloned());
        self.user_news(&query, &user_data).await
    }

    /// Bookmarked news; empty when nothing is bookmarked.
    pub async fn observe_all_bookmarked(&self) -> Result<Vec<UserNewsResource>, AppError> {
        let user_data = self.prefs.user_data().await?;
        let query = NewsResourceQuery::all()
            .with_news_ids(user_data.bookmarked_news_resources.iter().cloned());
        self.user_news(&query, &user_data).await
    }

    async fn user_news(
        &self,
        query: &NewsResourceQuery,
        user_data: &UserData,
    ) -> Result<Vec<UserNewsResource>, AppError> {
        let news = self.repo.get_news_resources(query).await?;
        Ok(map_to_user_news_resources(news, user_data))
    }

    // ==================== SEARCH ====================

    pub async fn get_search_contents(&self, query: &str) -> Result<SearchContents, AppError> {
        if self.search.search_contents_count() < SEARCH_MIN_FTS_ENTITY_COUNT {
            return Ok(SearchContents::SearchNotReady);
        }
        let query = query.trim();
        if query.chars().count() < SEARCH_QUERY_MIN_LENGTH {
            return Ok(SearchContents::EmptyQuery);
        }

        let result = self.search.search_contents(query).await?;
        let user_data = self.prefs.user_data().await?;
        let topics = result
            .topics
            .into_iter()
            .map(|topic| FollowableTopic {
                is_followed: user_data.followed_topics.contains(&topic.id),
                topic,
            })
            .collect();

        Ok(SearchContents::Success(UserSearchResult {
            topics,
            news_resources: map_to_user_news_resources(result.news_resources, &user_data),
        }))
    }

    pub async fn get_recent_search_queries(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<RecentSearchQuery>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_SEARCH_LIMIT);
        if limit <= 0 {
            return Err(AppError::Validation("limit must be positive".to_string()));
        }
        self.repo.recent_search_queries(limit).await
    }

    pub async fn record_search_query(&self, query: &str) -> Result<(), AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("query must not be empty".to_string()));
        }
        self.repo.insert_or_replace_recent_search(query).await
    }

    pub async fn clear_recent_searches(&self) -> Result<(), AppError> {
        self.repo.clear_recent_searches().await
    }

    pub fn watch(&self) -> ViewWatcher {
        ViewWatcher {
            revision: self.repo.subscribe(),
            user_data: self.prefs.subscribe(),
        }
    }
}

/// Signals when any view may have changed: an entity write or a user data
/// change.
pub struct ViewWatcher {
    revision: watch::Receiver<i64>,
    user_data: watch::Receiver<UserData>,
}

impl ViewWatcher {
    /// Wait for the next change.
    pub async fn changed(&mut self) -> Result<(), AppError> {
        let result = tokio::select! {
            r = self.revision.changed() => r,
            r = self.user_data.changed() => r,
        };
        result.map_err(|_| AppError::Internal("Change source closed".to_string()))
    }
}
