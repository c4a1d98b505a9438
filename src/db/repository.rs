//! Database repository for the entity tables.
//!
//! Every write runs in a transaction that also bumps the store revision, and
//! the new revision is published to subscribers after commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::watch;

use crate::errors::AppError;
use crate::models::{
    NetworkNewsResource, NewsResource, NewsResourceEntity, NewsResourceQuery,
    NewsResourceTopicCrossRef, RecentSearchQuery, Topic,
};

/// Upper bound on bound ids per statement, well under SQLite's variable limit.
const MAX_IDS_PER_STATEMENT: usize = 500;

const NEWS_COLUMNS: &str = "id, title, content, url, header_image_url, publish_date, type";

/// Database repository for all entity operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    revision: Arc<watch::Sender<i64>>,
}

impl Repository {
    /// Open the repository, seeding subscribers with the stored revision.
    pub async fn open(pool: SqlitePool) -> Result<Self, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&pool)
            .await?;
        let (revision, _) = watch::channel(row.get::<i64, _>("revision_id"));
        Ok(Self {
            pool,
            revision: Arc::new(revision),
        })
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Subscribe to entity-table changes. The value is the latest revision;
    /// readers re-run their queries whenever it changes.
    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.revision.subscribe()
    }

    /// Bump the revision inside `tx`, commit, then notify subscribers.
    async fn commit_write(&self, mut tx: Transaction<'_, Sqlite>) -> Result<i64, AppError> {
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?;
        let revision: i64 = row.get("revision_id");

        tx.commit().await?;
        self.revision.send_replace(revision);
        Ok(revision)
    }

    // ==================== TOPIC OPERATIONS ====================

    /// List all topics.
    pub async fn list_topics(&self) -> Result<Vec<Topic>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, short_description, long_description, url, image_url FROM topics ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(topic_from_row).collect())
    }

    /// Get a topic by ID.
    pub async fn get_topic(&self, id: &str) -> Result<Option<Topic>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, short_description, long_description, url, image_url FROM topics WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(topic_from_row))
    }

    /// Get the topics whose ids are in `ids`.
    pub async fn get_topics_by_ids<'a, I>(&self, ids: I) -> Result<Vec<Topic>, AppError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let ids: Vec<&String> = ids.into_iter().collect();
        let mut topics = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "SELECT id, name, short_description, long_description, url, image_url FROM topics WHERE id IN (",
            );
            push_id_list(&mut builder, chunk.iter().copied());
            builder.push(" ORDER BY rowid");
            let rows = builder.build().fetch_all(&self.pool).await?;
            topics.extend(rows.iter().map(topic_from_row));
        }
        Ok(topics)
    }

    /// Insert or replace topics. Remote data wins on conflict.
    pub async fn upsert_topics(&self, topics: &[Topic]) -> Result<(), AppError> {
        if topics.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        upsert_topics_in(&mut tx, topics).await?;
        self.commit_write(tx).await?;
        Ok(())
    }

    /// Delete topics by id. Join rows referencing them cascade.
    pub async fn delete_topics(&self, ids: &[String]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let deleted = delete_by_ids_in(&mut tx, "topics", ids).await?;
        self.commit_write(tx).await?;
        Ok(deleted)
    }

    // ==================== NEWS OPERATIONS ====================

    /// News resources matching `query` with their topics, newest first.
    pub async fn get_news_resources(
        &self,
        query: &NewsResourceQuery,
    ) -> Result<Vec<NewsResource>, AppError> {
        if query.matches_nothing() {
            return Ok(Vec::new());
        }

        let entities = self.news_entities(query).await?;

        let ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
        let mut topics = self.topics_for_news(&ids).await?;

        Ok(entities
            .into_iter()
            .map(|entity| {
                let related = topics.remove(&entity.id).unwrap_or_default();
                NewsResource::from_entity(entity, related)
            })
            .collect())
    }

    /// Ids of news resources matching `query`, newest first.
    pub async fn get_news_resource_ids(
        &self,
        query: &NewsResourceQuery,
    ) -> Result<Vec<String>, AppError> {
        if query.matches_nothing() {
            return Ok(Vec::new());
        }

        Ok(self
            .news_entities(query)
            .await?
            .into_iter()
            .map(|entity| entity.id)
            .collect())
    }

    /// Rows matching `query`, newest first. Large id filters are split across
    /// statements and the partial results merged.
    async fn news_entities(
        &self,
        query: &NewsResourceQuery,
    ) -> Result<Vec<NewsResourceEntity>, AppError> {
        let news_ids = query
            .filter_news_ids
            .as_ref()
            .map(|ids| ids.iter().collect::<Vec<_>>());
        let topic_ids = query
            .filter_topic_ids
            .as_ref()
            .map(|ids| ids.iter().collect::<Vec<_>>());

        let mut by_id: HashMap<String, NewsResourceEntity> = HashMap::new();
        for news_chunk in id_chunks(news_ids.as_deref()) {
            for topic_chunk in id_chunks(topic_ids.as_deref()) {
                let mut builder = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT {} FROM news_resources",
                    NEWS_COLUMNS
                ));
                push_news_filters(&mut builder, news_chunk, topic_chunk);
                let rows = builder.build().fetch_all(&self.pool).await?;
                for entity in rows.iter().map(news_from_row) {
                    by_id.insert(entity.id.clone(), entity);
                }
            }
        }

        let mut entities: Vec<NewsResourceEntity> = by_id.into_values().collect();
        entities.sort_by(|a, b| {
            b.publish_date
                .cmp(&a.publish_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entities)
    }

    /// Delete news resources by id. Join rows referencing them cascade.
    pub async fn delete_news_resources(&self, ids: &[String]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let deleted = delete_by_ids_in(&mut tx, "news_resources", ids).await?;
        self.commit_write(tx).await?;
        Ok(deleted)
    }

    /// Store one fetched batch of news resources as a single transaction.
    ///
    /// Topic shells go in first (existing topics win), then the news rows
    /// (remote wins), then the join rows, so both sides of every join row
    /// exist when it is written.
    pub async fn apply_news_batch(&self, resources: &[NetworkNewsResource]) -> Result<(), AppError> {
        if resources.is_empty() {
            return Ok(());
        }

        let shells: Vec<Topic> = resources
            .iter()
            .flat_map(NetworkNewsResource::topic_entity_shells)
            .map(|shell| (shell.id.clone(), shell))
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect();
        let entities: Vec<NewsResourceEntity> =
            resources.iter().map(NetworkNewsResource::as_entity).collect();
        let mut cross_refs: Vec<NewsResourceTopicCrossRef> = resources
            .iter()
            .flat_map(NetworkNewsResource::topic_cross_references)
            .collect();
        cross_refs.sort();
        cross_refs.dedup();

        let mut tx = self.pool.begin().await?;
        let new_topics = insert_or_ignore_topics_in(&mut tx, &shells).await?;
        upsert_news_in(&mut tx, &entities).await?;
        insert_or_ignore_cross_refs_in(&mut tx, &cross_refs).await?;
        self.commit_write(tx).await?;

        tracing::debug!(
            news = entities.len(),
            topic_shells = new_topics,
            cross_refs = cross_refs.len(),
            "Applied news batch"
        );
        Ok(())
    }

    /// All join rows.
    pub async fn list_cross_refs(&self) -> Result<Vec<NewsResourceTopicCrossRef>, AppError> {
        let rows = sqlx::query(
            "SELECT news_resource_id, topic_id FROM news_resources_topics ORDER BY news_resource_id, topic_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| NewsResourceTopicCrossRef {
                news_resource_id: row.get("news_resource_id"),
                topic_id: row.get("topic_id"),
            })
            .collect())
    }

    async fn topics_for_news(
        &self,
        news_ids: &[String],
    ) -> Result<HashMap<String, Vec<Topic>>, AppError> {
        let mut by_news: HashMap<String, Vec<Topic>> = HashMap::new();
        for chunk in news_ids.chunks(MAX_IDS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                r#"SELECT nrt.news_resource_id, t.id, t.name, t.short_description,
                    t.long_description, t.url, t.image_url
                FROM news_resources_topics nrt
                JOIN topics t ON t.id = nrt.topic_id
                WHERE nrt.news_resource_id IN ("#,
            );
            push_id_list(&mut builder, chunk.iter());
            builder.push(" ORDER BY t.rowid");
            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                let news_id: String = row.get("news_resource_id");
                by_news.entry(news_id).or_default().push(topic_from_row(row));
            }
        }
        Ok(by_news)
    }

    // ==================== RECENT SEARCH OPERATIONS ====================

    /// Most recent search queries first.
    pub async fn recent_search_queries(
        &self,
        limit: i64,
    ) -> Result<Vec<RecentSearchQuery>, AppError> {
        let rows = sqlx::query(
            "SELECT query, queried_date FROM recent_search_queries ORDER BY queried_date DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RecentSearchQuery {
                query: row.get("query"),
                queried_date: millis_to_datetime(row.get("queried_date")),
            })
            .collect())
    }

    /// Record a search; re-running a query refreshes its date.
    pub async fn insert_or_replace_recent_search(&self, query: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO recent_search_queries (query, queried_date) VALUES (?, ?)
            ON CONFLICT(query) DO UPDATE SET queried_date = excluded.queried_date"#,
        )
        .bind(query)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_recent_searches(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM recent_search_queries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// Statement helpers shared by standalone writes and batch transactions

async fn upsert_topics_in(conn: &mut SqliteConnection, topics: &[Topic]) -> Result<(), AppError> {
    for topic in topics {
        sqlx::query(
            r#"INSERT INTO topics (id, name, short_description, long_description, url, image_url)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                short_description = excluded.short_description,
                long_description = excluded.long_description,
                url = excluded.url,
                image_url = excluded.image_url"#,
        )
        .bind(&topic.id)
        .bind(&topic.name)
        .bind(&topic.short_description)
        .bind(&topic.long_description)
        .bind(&topic.url)
        .bind(&topic.image_url)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_or_ignore_topics_in(
    conn: &mut SqliteConnection,
    topics: &[Topic],
) -> Result<u64, AppError> {
    let mut inserted = 0;
    for topic in topics {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO topics (id, name, short_description, long_description, url, image_url)
            VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&topic.id)
        .bind(&topic.name)
        .bind(&topic.short_description)
        .bind(&topic.long_description)
        .bind(&topic.url)
        .bind(&topic.image_url)
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

// ON CONFLICT DO UPDATE rather than REPLACE: REPLACE deletes the old row and
// would cascade away its join rows.
async fn upsert_news_in(
    conn: &mut SqliteConnection,
    entities: &[NewsResourceEntity],
) -> Result<(), AppError> {
    for entity in entities {
        sqlx::query(
            r#"INSERT INTO news_resources (id, title, content, url, header_image_url, publish_date, type)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                url = excluded.url,
                header_image_url = excluded.header_image_url,
                publish_date = excluded.publish_date,
                type = excluded.type"#,
        )
        .bind(&entity.id)
        .bind(&entity.title)
        .bind(&entity.content)
        .bind(&entity.url)
        .bind(&entity.header_image_url)
        .bind(entity.publish_date.timestamp_millis())
        .bind(&entity.resource_type)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_or_ignore_cross_refs_in(
    conn: &mut SqliteConnection,
    cross_refs: &[NewsResourceTopicCrossRef],
) -> Result<u64, AppError> {
    let mut inserted = 0;
    for cross_ref in cross_refs {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO news_resources_topics (news_resource_id, topic_id) VALUES (?, ?)",
        )
        .bind(&cross_ref.news_resource_id)
        .bind(&cross_ref.topic_id)
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

async fn delete_by_ids_in(
    conn: &mut SqliteConnection,
    table: &'static str,
    ids: &[String],
) -> Result<u64, AppError> {
    let mut deleted = 0;
    for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE id IN (", table));
        push_id_list(&mut builder, chunk.iter());
        deleted += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(deleted)
}

/// Push `?, ?, ...)` binding every id; the caller has already pushed `(`.
fn push_id_list<'a, I>(builder: &mut QueryBuilder<'_, Sqlite>, ids: I)
where
    I: IntoIterator<Item = &'a String>,
{
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
}

/// `None` is one unfiltered pass; `Some` yields statement-sized chunks.
fn id_chunks<'a>(ids: Option<&'a [&'a String]>) -> Vec<Option<&'a [&'a String]>> {
    match ids {
        Some(ids) => ids.chunks(MAX_IDS_PER_STATEMENT).map(Some).collect(),
        None => vec![None],
    }
}

fn push_news_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    news_ids: Option<&[&String]>,
    topic_ids: Option<&[&String]>,
) {
    builder.push(" WHERE 1 = 1");
    if let Some(news_ids) = news_ids {
        builder.push(" AND id IN (");
        push_id_list(builder, news_ids.iter().copied());
    }
    if let Some(topic_ids) = topic_ids {
        builder.push(
            " AND id IN (SELECT news_resource_id FROM news_resources_topics WHERE topic_id IN (",
        );
        push_id_list(builder, topic_ids.iter().copied());
        builder.push(")");
    }
}

// Helper functions for row conversion

fn topic_from_row(row: &SqliteRow) -> Topic {
    Topic {
        id: row.get("id"),
        name: row.get("name"),
        short_description: row.get("short_description"),
        long_description: row.get("long_description"),
        url: row.get("url"),
        image_url: row.get("image_url"),
    }
}

fn news_from_row(row: &SqliteRow) -> NewsResourceEntity {
    NewsResourceEntity {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        url: row.get("url"),
        header_image_url: row.get("header_image_url"),
        publish_date: millis_to_datetime(row.get("publish_date")),
        resource_type: row.get("type"),
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}
