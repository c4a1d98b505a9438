//! Tantivy-based full-text search.
//!
//! Two side indexes, one per entity type, rebuilt wholesale from the entity
//! tables after every successful sync.

mod contents;

pub use contents::*;

use std::path::Path;
use std::sync::Arc;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, RegexQuery};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{NewsResource, Topic};

/// Field boosts for topic matches.
const BOOST_TOPIC_NAME: f32 = 10.0;
const BOOST_TOPIC_SHORT_DESCRIPTION: f32 = 7.0;
const BOOST_TOPIC_LONG_DESCRIPTION: f32 = 5.0;

/// Field boosts for news matches.
const BOOST_NEWS_TITLE: f32 = 10.0;
const BOOST_NEWS_CONTENT: f32 = 5.0;

const WRITER_MEMORY_BYTES: usize = 20_000_000;

/// Search hit with entity id and relevance score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// One full-text side table.
struct FtsTable {
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    id_field: Field,
    /// Searchable fields with their boosts.
    fields: Vec<(Field, f32)>,
}

impl FtsTable {
    fn open(dir: &Path, schema: Schema, id_field: Field, fields: Vec<(Field, f32)>) -> Result<Self, AppError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        // Try to open existing index or create new one
        let index = Index::open_in_dir(dir)
            .or_else(|_| Index::create_in_dir(dir, schema))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            reader,
            writer: Arc::new(RwLock::new(writer)),
            id_field,
            fields,
        })
    }

    /// Replace every document with `docs`.
    async fn rewrite(&self, docs: Vec<TantivyDocument>) -> Result<usize, AppError> {
        let mut writer = self.writer.write().await;
        writer.delete_all_documents()?;
        let count = docs.len();
        for doc in docs {
            writer.add_document(doc)?;
        }
        writer.commit()?;

        // Reload reader to see new documents
        self.reader.reload()?;
        Ok(count)
    }

    fn count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchHit>, AppError> {
        let Some(query) = self.build_query(query_str) else {
            return Ok(Vec::new());
        };

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        Ok(top_docs
            .into_iter()
            .filter_map(|(score, address)| {
                let doc: TantivyDocument = searcher.doc(address).ok()?;
                let id = doc.get_first(self.id_field)?.as_str()?.to_string();
                Some(SearchHit { id, score })
            })
            .collect())
    }

    /// Every query term must match some field, anywhere inside a token.
    fn build_query(&self, query_str: &str) -> Option<Box<dyn Query>> {
        let mut per_term: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for term in query_terms(query_str) {
            let pattern = format!(".*{}.*", term);
            let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();
            for &(field, boost) in &self.fields {
                if let Ok(regex) = RegexQuery::from_pattern(&pattern, field) {
                    per_field.push((Occur::Should, Box::new(BoostQuery::new(Box::new(regex), boost))));
                }
            }
            if !per_field.is_empty() {
                per_term.push((Occur::Must, Box::new(BooleanQuery::new(per_field))));
            }
        }

        if per_term.is_empty() {
            None
        } else {
            Some(Box::new(BooleanQuery::new(per_term)))
        }
    }
}

/// Lowercased alphanumeric terms, matching what the default tokenizer indexes.
fn query_terms(query_str: &str) -> Vec<String> {
    query_str
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .collect()
}

struct TopicFields {
    id: Field,
    name: Field,
    short_description: Field,
    long_description: Field,
}

struct NewsFields {
    id: Field,
    title: Field,
    content: Field,
}

/// Full-text index over topics and news resources.
pub struct SearchIndex {
    topics: FtsTable,
    topic_fields: TopicFields,
    news: FtsTable,
    news_fields: NewsFields,
}

impl SearchIndex {
    /// Create or open the search indexes under `index_path`.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        let mut topic_schema = Schema::builder();
        let topic_fields = TopicFields {
            id: topic_schema.add_text_field("topic_id", STRING | STORED),
            name: topic_schema.add_text_field("name", TEXT),
            short_description: topic_schema.add_text_field("short_description", TEXT),
            long_description: topic_schema.add_text_field("long_description", TEXT),
        };
        let topics = FtsTable::open(
            &index_path.join("topics"),
            topic_schema.build(),
            topic_fields.id,
            vec![
                (topic_fields.name, BOOST_TOPIC_NAME),
                (topic_fields.short_description, BOOST_TOPIC_SHORT_DESCRIPTION),
                (topic_fields.long_description, BOOST_TOPIC_LONG_DESCRIPTION),
            ],
        )?;

        let mut news_schema = Schema::builder();
        let news_fields = NewsFields {
            id: news_schema.add_text_field("news_resource_id", STRING | STORED),
            title: news_schema.add_text_field("title", TEXT),
            content: news_schema.add_text_field("content", TEXT),
        };
        let news = FtsTable::open(
            &index_path.join("news"),
            news_schema.build(),
            news_fields.id,
            vec![
                (news_fields.title, BOOST_NEWS_TITLE),
                (news_fields.content, BOOST_NEWS_CONTENT),
            ],
        )?;

        Ok(Self {
            topics,
            topic_fields,
            news,
            news_fields,
        })
    }

    /// Rebuild both indexes from scratch.
    pub async fn rebuild(&self, topics: &[Topic], news: &[NewsResource]) -> Result<(), AppError> {
        let topic_docs = topics
            .iter()
            .map(|topic| {
                doc!(
                    self.topic_fields.id => topic.id.clone(),
                    self.topic_fields.name => topic.name.clone(),
                    self.topic_fields.short_description => topic.short_description.clone(),
                    self.topic_fields.long_description => topic.long_description.clone()
                )
            })
            .collect();
        let news_docs = news
            .iter()
            .map(|resource| {
                doc!(
                    self.news_fields.id => resource.id.clone(),
                    self.news_fields.title => resource.title.clone(),
                    self.news_fields.content => resource.content.clone()
                )
            })
            .collect();

        let topic_count = self.topics.rewrite(topic_docs).await?;
        let news_count = self.news.rewrite(news_docs).await?;

        tracing::info!(
            topics = topic_count,
            news = news_count,
            "Search index rebuilt"
        );
        Ok(())
    }

    pub fn search_topics(&self, query_str: &str, limit: usize) -> Result<Vec<SearchHit>, AppError> {
        self.topics.search(query_str, limit)
    }

    pub fn search_news(&self, query_str: &str, limit: usize) -> Result<Vec<SearchHit>, AppError> {
        self.news.search(query_str, limit)
    }

    /// Total number of indexed documents across both indexes.
    pub fn count(&self) -> u64 {
        self.topics.count() + self.news.count()
    }

    /// Whether a topic document with `id` is indexed.
    pub fn contains_topic(&self, id: &str) -> bool {
        let searcher = self.topics.reader.searcher();
        let term = Term::from_field_text(self.topic_fields.id, id);
        searcher
            .doc_freq(&term)
            .map(|freq| freq > 0)
            .unwrap_or(false)
    }
}
