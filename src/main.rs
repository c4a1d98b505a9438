//! Now in Android sync client
//!
//! Runs the background sync scheduler and serves the local REST API.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nia_sync::config::Config;
use nia_sync::db::{self, PreferencesStore, Repository};
use nia_sync::domain::ContentViews;
use nia_sync::network::{DemoNetworkDataSource, HttpNetworkDataSource, NetworkDataSource};
use nia_sync::notifications::TracingNotifier;
use nia_sync::search::{SearchContentsRepository, SearchIndex};
use nia_sync::sync::{
    AlwaysOnline, NewsSyncer, SchedulePolicy, SyncScheduler, SyncWorker, TopicsSyncer,
};
use nia_sync::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Now in Android sync client");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Repository::open(pool.clone()).await?;
    let prefs = PreferencesStore::open(pool).await?;

    // Initialize search index; it is rebuilt after every successful sync
    let index = Arc::new(SearchIndex::open(&config.index_path)?);
    let search = SearchContentsRepository::new(repo.clone(), index);

    let network: Arc<dyn NetworkDataSource> = match &config.remote_url {
        Some(url) => {
            tracing::info!("Change feed: {}", url);
            Arc::new(HttpNetworkDataSource::new(url.clone())?)
        }
        None => {
            tracing::warn!(
                "NIA_REMOTE_URL not set, serving demo assets from {:?}",
                config.demo_assets_path
            );
            Arc::new(DemoNetworkDataSource::new(config.demo_assets_path.clone()))
        }
    };

    let topics = TopicsSyncer::new(repo.clone(), network.clone(), config.sync_batch_size);
    let news = NewsSyncer::new(
        repo.clone(),
        prefs.clone(),
        network,
        Arc::new(TracingNotifier),
        config.sync_batch_size,
    );
    let worker = SyncWorker::new(
        prefs.clone(),
        Arc::new(topics),
        Arc::new(news),
        search.clone(),
    );
    let scheduler = SyncScheduler::start(
        Arc::new(worker),
        Arc::new(AlwaysOnline),
        SchedulePolicy::with_interval(config.sync_interval),
    );

    let state = AppState {
        views: ContentViews::new(repo.clone(), prefs.clone(), search),
        repo,
        prefs,
        scheduler: scheduler.clone(),
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
