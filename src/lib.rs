//! Now in Android sync client
//!
//! Offline-first news client core: a local SQLite store kept in step with a
//! remote change feed, a Tantivy search index over the synced content, and a
//! small REST API for reading it and recording user actions.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod models;
pub mod network;
pub mod notifications;
pub mod search;
pub mod sync;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::{PreferencesStore, Repository};
use domain::ContentViews;
use sync::SyncScheduler;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub prefs: PreferencesStore,
    pub views: ContentViews,
    pub scheduler: SyncScheduler,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Topics
        .route("/topics", get(api::list_topics))
        .route("/topics/{id}", get(api::get_topic))
        .route("/topics/{id}/follow", put(api::follow_topic))
        // News
        .route("/news", get(api::list_news))
        .route("/news/for-you", get(api::for_you))
        .route("/news/{id}/bookmark", put(api::set_bookmarked))
        .route("/news/{id}/viewed", put(api::set_viewed))
        .route("/bookmarks", get(api::list_bookmarks))
        // Search
        .route("/search", get(api::search_contents))
        .route(
            "/recent-searches",
            get(api::list_recent_searches)
                .post(api::record_recent_search)
                .delete(api::clear_recent_searches),
        )
        // User data
        .route("/user-data", get(api::get_user_data))
        .route("/user-data/preferences", put(api::update_preferences))
        // Sync
        .route("/sync", post(api::request_sync))
        .route("/sync/status", get(api::sync_status));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
