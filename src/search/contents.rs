//! Search contents repository: populates the index and resolves hits.

use std::sync::Arc;

use super::SearchIndex;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{NewsResourceQuery, SearchResult};

/// Maximum number of hits resolved per entity type.
const SEARCH_RESULT_LIMIT: usize = 100;

#[derive(Clone)]
pub struct SearchContentsRepository {
    repo: Repository,
    index: Arc<SearchIndex>,
}

impl SearchContentsRepository {
    pub fn new(repo: Repository, index: Arc<SearchIndex>) -> Self {
        Self { repo, index }
    }

    /// Rewrite both full-text indexes from the entity tables.
    pub async fn populate_fts_data(&self) -> Result<(), AppError> {
        let topics = self.repo.list_topics().await?;
        let news = self
            .repo
            .get_news_resources(&NewsResourceQuery::all())
            .await?;
        self.index.rebuild(&topics, &news).await
    }

    /// Topics and news matching `query`, read back from the entity tables.
    pub async fn search_contents(&self, query: &str) -> Result<SearchResult, AppError> {
        let topic_ids: Vec<String> = self
            .index
            .search_topics(query, SEARCH_RESULT_LIMIT)?
            .into_iter()
            .map(|hit| hit.id)
            .collect();
        let news_ids: Vec<String> = self
            .index
            .search_news(query, SEARCH_RESULT_LIMIT)?
            .into_iter()
            .map(|hit| hit.id)
            .collect();

        let topics = if topic_ids.is_empty() {
            Vec::new()
        } else {
            self.repo.get_topics_by_ids(&topic_ids).await?
        };
        let news_resources = if news_ids.is_empty() {
            Vec::new()
        } else {
            self.repo
                .get_news_resources(&NewsResourceQuery::all().with_news_ids(news_ids))
                .await?
        };

        Ok(SearchResult {
            topics,
            news_resources,
        })
    }

    /// Number of indexed documents across both entity types.
    pub fn search_contents_count(&self) -> u64 {
        self.index.count()
    }
}
