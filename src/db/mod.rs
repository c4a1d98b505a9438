//! Database module for SQLite persistence.
//!
//! SQLite holds the entity tables, the recent search history and the
//! preferences blob (version ledger and user data).

mod preferences;
mod repository;

pub use preferences::*;
pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id)
        VALUES (1, 1, 0);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS preferences (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            data TEXT NOT NULL
        );

        INSERT OR IGNORE INTO preferences (id, data) VALUES (1, '{}');
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topics (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            short_description TEXT NOT NULL,
            long_description TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            image_url TEXT NOT NULL DEFAULT ''
        );
        "#,
    )
    .execute(pool)
    .await?;

    // publish_date is stored as epoch milliseconds
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS news_resources (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            url TEXT NOT NULL,
            header_image_url TEXT,
            publish_date INTEGER NOT NULL,
            type TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS news_resources_topics (
            news_resource_id TEXT NOT NULL
                REFERENCES news_resources(id) ON DELETE CASCADE,
            topic_id TEXT NOT NULL
                REFERENCES topics(id) ON DELETE CASCADE,
            PRIMARY KEY (news_resource_id, topic_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recent_search_queries (
            query TEXT PRIMARY KEY NOT NULL,
            queried_date INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_news_resources_publish_date ON news_resources(publish_date);
        CREATE INDEX IF NOT EXISTS idx_news_resources_topics_news ON news_resources_topics(news_resource_id);
        CREATE INDEX IF NOT EXISTS idx_news_resources_topics_topic ON news_resources_topics(topic_id);
        CREATE INDEX IF NOT EXISTS idx_recent_search_queries_date ON recent_search_queries(queried_date);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
