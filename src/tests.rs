//! Integration tests: the sync pipeline against an in-memory change feed,
//! and the REST API against a live server.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::{init_database, PreferencesStore, Repository};
use crate::domain::ContentViews;
use crate::errors::AppError;
use crate::models::{
    NetworkChangeList, NetworkNewsResource, NetworkTopic, NewsResourceQuery, SyncCollection,
    NEVER_SYNCED,
};
use crate::network::NetworkDataSource;
use crate::notifications::RecordingNotifier;
use crate::search::{SearchContentsRepository, SearchIndex};
use crate::sync::{
    AlwaysOnline, NewsSyncer, SchedulePolicy, SyncOutcome, SyncScheduler, SyncSession,
    SyncWorker, Syncable, TopicsSyncer,
};
use crate::{create_router, AppState};

// ==================== FAKE CHANGE FEED ====================

#[derive(Default)]
struct FeedState {
    topics: BTreeMap<String, NetworkTopic>,
    news: BTreeMap<String, NetworkNewsResource>,
    topic_changes: Vec<NetworkChangeList>,
    news_changes: Vec<NetworkChangeList>,
}

/// One change-list request: the `after` argument and how many changes came
/// back, or `None` if the request failed.
#[derive(Debug, Clone, PartialEq)]
struct ChangeListRequest {
    after: Option<i64>,
    returned: Option<usize>,
}

impl ChangeListRequest {
    fn new(after: i64, returned: Option<usize>) -> Self {
        Self {
            after: Some(after),
            returned,
        }
    }
}

/// In-memory change feed with call counting and failure injection.
#[derive(Default)]
struct FakeNetworkDataSource {
    state: Mutex<FeedState>,
    fail_topics: AtomicBool,
    fail_news: AtomicBool,
    topic_change_list_calls: AtomicUsize,
    news_change_list_calls: AtomicUsize,
    topic_change_list_requests: Mutex<Vec<ChangeListRequest>>,
    news_change_list_requests: Mutex<Vec<ChangeListRequest>>,
    topic_fetches: AtomicUsize,
    news_fetches: AtomicUsize,
}

impl FakeNetworkDataSource {
    fn put_topic(&self, id: &str, name: &str, version: i64) {
        let mut state = self.state.lock().unwrap();
        state.topics.insert(
            id.to_string(),
            NetworkTopic {
                id: id.to_string(),
                name: name.to_string(),
                short_description: format!("About {}", name),
                long_description: String::new(),
                url: String::new(),
                image_url: String::new(),
                followed: false,
            },
        );
        state.topic_changes.push(change(id, version, false));
    }

    fn delete_topic(&self, id: &str, version: i64) {
        let mut state = self.state.lock().unwrap();
        state.topics.remove(id);
        state.topic_changes.push(change(id, version, true));
    }

    fn put_news(&self, id: &str, title: &str, topics: &[&str], day: u32, version: i64) {
        let mut state = self.state.lock().unwrap();
        state.news.insert(
            id.to_string(),
            NetworkNewsResource {
                id: id.to_string(),
                title: title.to_string(),
                content: format!("{} content", title),
                url: format!("https://example.com/{}", id),
                header_image_url: None,
                publish_date: Utc.with_ymd_and_hms(2022, 1, day, 12, 0, 0).unwrap(),
                resource_type: "Article".to_string(),
                topics: topics.iter().map(|t| t.to_string()).collect(),
            },
        );
        state.news_changes.push(change(id, version, false));
    }

    fn delete_news(&self, id: &str, version: i64) {
        let mut state = self.state.lock().unwrap();
        state.news.remove(id);
        state.news_changes.push(change(id, version, true));
    }

    fn push_news_change(&self, id: &str, version: i64, is_delete: bool) {
        self.state
            .lock()
            .unwrap()
            .news_changes
            .push(change(id, version, is_delete));
    }

    fn push_topic_change(&self, id: &str, version: i64, is_delete: bool) {
        self.state
            .lock()
            .unwrap()
            .topic_changes
            .push(change(id, version, is_delete));
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn requests(log: &Mutex<Vec<ChangeListRequest>>) -> Vec<ChangeListRequest> {
        log.lock().unwrap().clone()
    }
}

fn change(id: &str, version: i64, is_delete: bool) -> NetworkChangeList {
    NetworkChangeList {
        id: id.to_string(),
        change_list_version: version,
        is_delete,
    }
}

fn after_version(changes: &[NetworkChangeList], after: Option<i64>) -> Vec<NetworkChangeList> {
    changes
        .iter()
        .filter(|c| after.map_or(true, |after| c.change_list_version > after))
        .cloned()
        .collect()
}

#[async_trait]
impl NetworkDataSource for FakeNetworkDataSource {
    async fn get_topics(&self, ids: Option<&[String]>) -> Result<Vec<NetworkTopic>, AppError> {
        self.topic_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_topics.load(Ordering::SeqCst) {
            return Err(AppError::Network("topics unavailable".to_string()));
        }
        let state = self.state.lock().unwrap();
        Ok(match ids {
            Some(ids) => ids.iter().filter_map(|id| state.topics.get(id).cloned()).collect(),
            None => state.topics.values().cloned().collect(),
        })
    }

    async fn get_news_resources(
        &self,
        ids: Option<&[String]>,
    ) -> Result<Vec<NetworkNewsResource>, AppError> {
        self.news_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_news.load(Ordering::SeqCst) {
            return Err(AppError::Network("news unavailable".to_string()));
        }
        let state = self.state.lock().unwrap();
        Ok(match ids {
            Some(ids) => ids.iter().filter_map(|id| state.news.get(id).cloned()).collect(),
            None => state.news.values().cloned().collect(),
        })
    }

    async fn get_topic_change_list(
        &self,
        after: Option<i64>,
    ) -> Result<Vec<NetworkChangeList>, AppError> {
        self.topic_change_list_calls.fetch_add(1, Ordering::SeqCst);
        let mut log = self.topic_change_list_requests.lock().unwrap();
        if self.fail_topics.load(Ordering::SeqCst) {
            log.push(ChangeListRequest { after, returned: None });
            return Err(AppError::Network("topics unavailable".to_string()));
        }
        let changes = after_version(&self.state.lock().unwrap().topic_changes, after);
        log.push(ChangeListRequest {
            after,
            returned: Some(changes.len()),
        });
        Ok(changes)
    }

    async fn get_news_resource_change_list(
        &self,
        after: Option<i64>,
    ) -> Result<Vec<NetworkChangeList>, AppError> {
        self.news_change_list_calls.fetch_add(1, Ordering::SeqCst);
        let mut log = self.news_change_list_requests.lock().unwrap();
        if self.fail_news.load(Ordering::SeqCst) {
            log.push(ChangeListRequest { after, returned: None });
            return Err(AppError::Network("news unavailable".to_string()));
        }
        let changes = after_version(&self.state.lock().unwrap().news_changes, after);
        log.push(ChangeListRequest {
            after,
            returned: Some(changes.len()),
        });
        Ok(changes)
    }
}

// ==================== SYNC HARNESS ====================

struct SyncHarness {
    repo: Repository,
    prefs: PreferencesStore,
    search: SearchContentsRepository,
    network: Arc<FakeNetworkDataSource>,
    notifier: Arc<RecordingNotifier>,
    topics: Arc<TopicsSyncer>,
    news: Arc<NewsSyncer>,
    worker: Arc<SyncWorker>,
    temp_dir: TempDir,
}

impl SyncHarness {
    async fn new() -> Self {
        Self::with_batch_size(crate::config::DEFAULT_SYNC_BATCH_SIZE).await
    }

    async fn with_batch_size(batch_size: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .expect("Failed to init DB");
        let repo = Repository::open(pool.clone()).await.unwrap();
        let prefs = PreferencesStore::open(pool).await.unwrap();
        let index =
            Arc::new(SearchIndex::open(&temp_dir.path().join("index")).expect("Failed to init search"));
        let search = SearchContentsRepository::new(repo.clone(), index);

        let network = Arc::new(FakeNetworkDataSource::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let topics = Arc::new(TopicsSyncer::new(repo.clone(), network.clone(), batch_size));
        let news = Arc::new(NewsSyncer::new(
            repo.clone(),
            prefs.clone(),
            network.clone(),
            notifier.clone(),
            batch_size,
        ));
        let worker = Arc::new(SyncWorker::new(
            prefs.clone(),
            topics.clone(),
            news.clone(),
            search.clone(),
        ));

        SyncHarness {
            repo,
            prefs,
            search,
            network,
            notifier,
            topics,
            news,
            worker,
            temp_dir,
        }
    }

    fn session(&self) -> SyncSession {
        SyncSession::new(self.prefs.clone(), CancellationToken::new())
    }

    async fn sync_topics(&self) -> bool {
        self.topics.sync_with(&self.session()).await.unwrap()
    }

    async fn sync_news(&self) -> bool {
        self.news.sync_with(&self.session()).await.unwrap()
    }

    async fn run(&self) -> SyncOutcome {
        self.worker.do_work(CancellationToken::new()).await.unwrap()
    }

    async fn topic_ids(&self) -> Vec<String> {
        self.repo
            .list_topics()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect()
    }

    async fn news_ids(&self) -> Vec<String> {
        self.repo
            .get_news_resource_ids(&NewsResourceQuery::all())
            .await
            .unwrap()
    }

    async fn version(&self, collection: SyncCollection) -> i64 {
        self.prefs.version(collection).await.unwrap()
    }

    /// Every join row points at rows that exist.
    async fn assert_referential_integrity(&self) {
        let topics = self.topic_ids().await;
        let news = self.news_ids().await;
        for cross_ref in self.repo.list_cross_refs().await.unwrap() {
            assert!(topics.contains(&cross_ref.topic_id), "dangling topic {:?}", cross_ref);
            assert!(news.contains(&cross_ref.news_resource_id), "dangling news {:?}", cross_ref);
        }
    }
}

fn seed_basic_feed(network: &FakeNetworkDataSource) {
    network.put_topic("1", "Compose", 0);
    network.put_topic("2", "Kotlin", 1);
    network.put_topic("3", "Testing", 2);
    network.put_news("n1", "Compose 1.0", &["1"], 1, 0);
    network.put_news("n2", "Kotlin 2.0", &["2"], 2, 1);
    network.put_news("n3", "Testing in Compose", &["1", "3"], 3, 2);
}

// ==================== SYNC TESTS ====================

#[tokio::test]
async fn test_full_sync_populates_store_ledger_and_search() {
    let h = SyncHarness::new().await;
    seed_basic_feed(&h.network);

    assert_eq!(h.run().await, SyncOutcome::Success);

    assert_eq!(h.topic_ids().await, vec!["1", "2", "3"]);
    assert_eq!(h.news_ids().await, vec!["n3", "n2", "n1"]);
    assert_eq!(h.version(SyncCollection::Topics).await, 2);
    assert_eq!(h.version(SyncCollection::NewsResources).await, 2);
    assert_eq!(h.search.search_contents_count(), 6);

    let result = h.search.search_contents("compose").await.unwrap();
    assert_eq!(result.topics.len(), 1);
    assert_eq!(result.news_resources.len(), 2);
    h.assert_referential_integrity().await;
}

#[tokio::test]
async fn test_second_reconcile_without_changes_is_a_no_op() {
    let h = SyncHarness::new().await;
    seed_basic_feed(&h.network);

    assert!(h.sync_topics().await);
    assert!(h.sync_news().await);
    let topic_fetches = FakeNetworkDataSource::count(&h.network.topic_fetches);
    let news_fetches = FakeNetworkDataSource::count(&h.network.news_fetches);
    let revision = h.repo.get_revision_id().await.unwrap();
    let prefs_before = h.prefs.preferences().await.unwrap();

    assert!(h.sync_topics().await);
    assert!(h.sync_news().await);

    assert_eq!(FakeNetworkDataSource::count(&h.network.topic_fetches), topic_fetches);
    assert_eq!(FakeNetworkDataSource::count(&h.network.news_fetches), news_fetches);
    assert_eq!(h.repo.get_revision_id().await.unwrap(), revision);
    assert_eq!(h.prefs.preferences().await.unwrap(), prefs_before);
    assert_eq!(FakeNetworkDataSource::count(&h.network.topic_change_list_calls), 2);
}

#[tokio::test]
async fn test_ledger_tracks_max_version_across_passes() {
    let h = SyncHarness::new().await;

    // Versions skip and passes see different slices of the feed
    h.network.put_topic("1", "Compose", 3);
    h.network.put_topic("2", "Kotlin", 10);
    assert!(h.sync_topics().await);
    assert_eq!(h.version(SyncCollection::Topics).await, 10);

    h.network.put_topic("3", "Testing", 11);
    h.network.put_topic("1", "Compose UI", 25);
    assert!(h.sync_topics().await);
    assert_eq!(h.version(SyncCollection::Topics).await, 25);

    assert!(h.sync_topics().await);
    assert_eq!(h.version(SyncCollection::Topics).await, 25);
    assert_eq!(
        h.repo.get_topic("1").await.unwrap().unwrap().name,
        "Compose UI"
    );
}

#[tokio::test]
async fn test_news_referencing_unknown_topic_creates_shell() {
    let h = SyncHarness::new().await;
    h.network.put_topic("1", "Compose", 0);
    h.network.put_news("n1", "Brand new topic", &["1", "99"], 1, 0);

    // News first: topic 99 only exists as a shell
    assert!(h.sync_news().await);
    let shell = h.repo.get_topic("99").await.unwrap().unwrap();
    assert_eq!(shell.name, "");
    h.assert_referential_integrity().await;

    let news = h
        .repo
        .get_news_resources(&NewsResourceQuery::all())
        .await
        .unwrap();
    assert_eq!(news[0].topics.len(), 2);

    // A later topic sync fills in topic 1 but never clobbers it with a shell
    assert!(h.sync_topics().await);
    h.network.put_news("n2", "Another", &["1"], 2, 1);
    assert!(h.sync_news().await);
    assert_eq!(h.repo.get_topic("1").await.unwrap().unwrap().name, "Compose");
    h.assert_referential_integrity().await;
}

#[tokio::test]
async fn test_deletes_cascade_join_rows() {
    let h = SyncHarness::new().await;
    seed_basic_feed(&h.network);
    assert_eq!(h.run().await, SyncOutcome::Success);

    h.network.delete_news("n3", 3);
    h.network.delete_topic("2", 3);
    assert_eq!(h.run().await, SyncOutcome::Success);

    assert_eq!(h.news_ids().await, vec!["n2", "n1"]);
    assert_eq!(h.topic_ids().await, vec!["1", "3"]);
    h.assert_referential_integrity().await;

    let n2 = h
        .repo
        .get_news_resources(&NewsResourceQuery::all().with_news_ids(["n2".to_string()]))
        .await
        .unwrap();
    assert!(n2[0].topics.is_empty());
}

#[tokio::test]
async fn test_delete_and_update_in_same_response_keeps_entity() {
    let h = SyncHarness::new().await;
    h.network.put_topic("t1", "Original", 1);
    assert!(h.sync_topics().await);

    h.network.push_topic_change("t1", 5, true);
    h.network.put_topic("t1", "Recreated", 6);
    assert!(h.sync_topics().await);

    assert_eq!(h.repo.get_topic("t1").await.unwrap().unwrap().name, "Recreated");
    assert_eq!(h.version(SyncCollection::Topics).await, 6);
}

#[tokio::test]
async fn test_first_sync_marks_viewed_and_suppresses_notifications() {
    let h = SyncHarness::new().await;
    h.prefs.set_should_hide_onboarding(true).await.unwrap();
    for topic in ["1", "2", "3", "4"] {
        h.prefs.set_topic_id_followed(topic, true).await.unwrap();
    }

    let topics = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];
    for (i, topic) in topics.iter().enumerate() {
        h.network
            .put_news(&format!("n{}", i), &format!("News {}", i), &[*topic], i as u32 + 1, i as i64);
    }

    assert_eq!(h.version(SyncCollection::NewsResources).await, NEVER_SYNCED);
    assert!(h.sync_news().await);

    assert!(h.notifier.batches().is_empty());
    let user_data = h.prefs.user_data().await.unwrap();
    assert_eq!(user_data.viewed_news_resources.len(), 10);
    for i in 0..10 {
        assert!(user_data.viewed_news_resources.contains(&format!("n{}", i)));
    }
}

#[tokio::test]
async fn test_notifies_only_new_news_in_followed_topics() {
    let h = SyncHarness::new().await;
    h.prefs.set_should_hide_onboarding(true).await.unwrap();
    h.prefs.set_topic_id_followed("1", true).await.unwrap();
    h.network.put_topic("1", "Compose", 0);
    h.network.put_topic("2", "Kotlin", 1);
    h.network.put_news("existing", "Existing", &["1"], 1, 0);
    assert_eq!(h.run().await, SyncOutcome::Success);
    assert!(h.notifier.batches().is_empty());

    // Seven new items under the followed topic, one elsewhere, one update
    for i in 0..7 {
        h.network
            .put_news(&format!("new{}", i), &format!("New {}", i), &["1"], 10 + i, 1 + i as i64);
    }
    h.network.put_news("other", "Other topic", &["2"], 20, 8);
    h.network.put_news("existing", "Existing, edited", &["1"], 1, 9);
    assert_eq!(h.run().await, SyncOutcome::Success);

    let batches = h.notifier.batches();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.notifications.len(), 5);
    assert_eq!(batch.summary.lines.len(), 5);
    assert!(batch.summary.title.starts_with("5"));
    for notification in &batch.notifications {
        assert!(notification.news_resource_id.starts_with("new"));
        assert!(notification.deep_link.ends_with(&notification.news_resource_id));
    }
    // Only the first sync marks anything viewed
    let viewed = h.prefs.user_data().await.unwrap().viewed_news_resources;
    assert!(!viewed.contains("new0"));
}

#[tokio::test]
async fn test_no_notifications_before_onboarding() {
    let h = SyncHarness::new().await;
    h.prefs.set_topic_id_followed("1", true).await.unwrap();
    h.network.put_news("n1", "First", &["1"], 1, 0);
    assert!(h.sync_news().await);

    h.network.put_news("n2", "Second", &["1"], 2, 1);
    assert!(h.sync_news().await);
    assert!(h.notifier.batches().is_empty());
}

#[tokio::test]
async fn test_partial_failure_keeps_successful_collection() {
    let h = SyncHarness::new().await;
    for (i, id) in ["1", "2", "3"].iter().enumerate() {
        h.network.put_topic(id, &format!("Topic {}", id), i as i64 + 1);
    }
    assert!(h.sync_topics().await);
    assert_eq!(h.version(SyncCollection::Topics).await, 3);

    for (i, id) in ["4", "5", "6", "7"].iter().enumerate() {
        h.network.put_topic(id, &format!("Topic {}", id), i as i64 + 4);
    }
    h.network.put_news("n1", "News", &["4"], 1, 0);
    h.network.fail_news.store(true, Ordering::SeqCst);

    assert_eq!(h.run().await, SyncOutcome::Retry);
    assert_eq!(h.version(SyncCollection::Topics).await, 7);
    assert_eq!(h.version(SyncCollection::NewsResources).await, NEVER_SYNCED);
    assert_eq!(h.topic_ids().await.len(), 7);
    // Search is only rebuilt after a fully successful pass
    assert_eq!(h.search.search_contents_count(), 0);

    h.network.fail_news.store(false, Ordering::SeqCst);
    let topic_fetches = FakeNetworkDataSource::count(&h.network.topic_fetches);
    assert_eq!(h.run().await, SyncOutcome::Success);

    assert_eq!(FakeNetworkDataSource::count(&h.network.topic_fetches), topic_fetches);
    assert_eq!(h.version(SyncCollection::NewsResources).await, 0);
    assert_eq!(h.news_ids().await, vec!["n1"]);
    assert_eq!(h.search.search_contents_count(), 8);

    // The retry resumes topics from 7 and news from the untouched ledger
    assert_eq!(
        FakeNetworkDataSource::requests(&h.network.topic_change_list_requests),
        vec![
            ChangeListRequest::new(NEVER_SYNCED, Some(3)),
            ChangeListRequest::new(3, Some(4)),
            ChangeListRequest::new(7, Some(0)),
        ]
    );
    assert_eq!(
        FakeNetworkDataSource::requests(&h.network.news_change_list_requests),
        vec![
            ChangeListRequest::new(NEVER_SYNCED, None),
            ChangeListRequest::new(NEVER_SYNCED, Some(1)),
        ]
    );
}

#[tokio::test]
async fn test_large_catch_up_after_onboarding() {
    const UPDATES: usize = 33_000;

    let h = SyncHarness::with_batch_size(1_000).await;
    h.prefs.set_should_hide_onboarding(true).await.unwrap();
    h.prefs.set_topic_id_followed("1", true).await.unwrap();
    h.prefs.set_version(SyncCollection::NewsResources, 0).await.unwrap();

    // Already stored before the gap, so it is not news to the user
    h.network.put_news("known", "Known", &["1"], 28, 1);
    let known = h.network.state.lock().unwrap().news["known"].clone();
    h.repo.apply_news_batch(&[known]).await.unwrap();

    for i in 1..UPDATES {
        let topic = if i % 2 == 0 { "1" } else { "2" };
        h.network.put_news(
            &format!("n{}", i),
            &format!("News {}", i),
            &[topic],
            (i % 27) as u32 + 1,
            i as i64 + 1,
        );
    }

    assert!(h.sync_news().await);
    assert_eq!(h.version(SyncCollection::NewsResources).await, UPDATES as i64);
    assert_eq!(h.news_ids().await.len(), UPDATES);

    let batches = h.notifier.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].notifications.len(), 5);
    for notification in &batches[0].notifications {
        assert_ne!(notification.news_resource_id, "known");
    }
}

#[tokio::test]
async fn test_topic_added_after_known_version() {
    let h = SyncHarness::new().await;
    h.prefs.set_version(SyncCollection::Topics, 5).await.unwrap();
    h.network.put_topic("t1", "Performance", 6);

    assert!(h.sync_topics().await);
    assert!(h.repo.get_topic("t1").await.unwrap().is_some());
    assert_eq!(h.version(SyncCollection::Topics).await, 6);
}

#[tokio::test]
async fn test_deletes_of_unknown_ids_are_harmless() {
    let h = SyncHarness::new().await;
    h.network.push_news_change("gone1", 0, true);
    h.network.push_news_change("gone2", 1, true);
    h.network.put_news("fresh", "Fresh", &["1"], 1, 4);

    assert!(h.sync_news().await);
    assert_eq!(h.news_ids().await, vec!["fresh"]);
    assert_eq!(h.version(SyncCollection::NewsResources).await, 4);
}

#[tokio::test]
async fn test_updates_are_fetched_in_batches() {
    let h = SyncHarness::with_batch_size(40).await;
    for i in 0..45 {
        h.network
            .put_topic(&format!("t{}", i), &format!("Topic {}", i), i as i64);
    }

    assert!(h.sync_topics().await);
    assert_eq!(FakeNetworkDataSource::count(&h.network.topic_fetches), 2);
    assert_eq!(h.topic_ids().await.len(), 45);
}

#[tokio::test]
async fn test_failed_reconcile_leaves_ledger_untouched() {
    let h = SyncHarness::new().await;
    h.network.put_topic("1", "Compose", 0);
    h.network.fail_topics.store(true, Ordering::SeqCst);

    assert!(!h.sync_topics().await);
    assert_eq!(h.version(SyncCollection::Topics).await, NEVER_SYNCED);
    assert!(h.topic_ids().await.is_empty());
}

#[tokio::test]
async fn test_cancellation_propagates() {
    let h = SyncHarness::new().await;
    seed_basic_feed(&h.network);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = h.worker.do_work(cancel).await;

    assert!(matches!(result, Err(AppError::Cancelled)));
    assert_eq!(h.version(SyncCollection::Topics).await, NEVER_SYNCED);
    assert_eq!(h.version(SyncCollection::NewsResources).await, NEVER_SYNCED);
}

// ==================== PROPERTY TESTS ====================

mod feed_properties {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    const TOPIC_POOL: usize = 6;
    const NEWS_POOL: usize = 8;

    #[derive(Debug, Clone)]
    enum FeedOp {
        PutTopic(usize),
        DeleteTopic(usize),
        /// Topic ids may run past the topic pool, so news can reference
        /// topics the topic feed never publishes.
        PutNews(usize, Vec<usize>),
        DeleteNews(usize),
        /// Delete and update of the same id in one response.
        RecreateNews(usize, Vec<usize>),
    }

    impl FeedOp {
        fn collection(&self) -> SyncCollection {
            match self {
                FeedOp::PutTopic(_) | FeedOp::DeleteTopic(_) => SyncCollection::Topics,
                _ => SyncCollection::NewsResources,
            }
        }

        fn apply(&self, network: &FakeNetworkDataSource, version: i64) {
            let day = (version % 28) as u32 + 1;
            match self {
                FeedOp::PutTopic(id) => {
                    network.put_topic(&format!("t{}", id), &format!("Topic {}", id), version)
                }
                FeedOp::DeleteTopic(id) => network.delete_topic(&format!("t{}", id), version),
                FeedOp::PutNews(id, topics) => {
                    put_news_with_topics(network, *id, topics, day, version)
                }
                FeedOp::DeleteNews(id) => network.delete_news(&format!("n{}", id), version),
                FeedOp::RecreateNews(id, topics) => {
                    network.delete_news(&format!("n{}", id), version);
                    put_news_with_topics(network, *id, topics, day, version);
                }
            }
        }
    }

    fn put_news_with_topics(
        network: &FakeNetworkDataSource,
        id: usize,
        topics: &[usize],
        day: u32,
        version: i64,
    ) {
        let topic_ids: Vec<String> = topics.iter().map(|t| format!("t{}", t)).collect();
        let topic_refs: Vec<&str> = topic_ids.iter().map(String::as_str).collect();
        network.put_news(
            &format!("n{}", id),
            &format!("News {} v{}", id, version),
            &topic_refs,
            day,
            version,
        );
    }

    fn feed_op_strategy() -> impl Strategy<Value = FeedOp> {
        let news_topics = || prop::collection::vec(0..TOPIC_POOL + 3, 0..4);
        prop_oneof![
            (0..TOPIC_POOL).prop_map(FeedOp::PutTopic),
            (0..TOPIC_POOL).prop_map(FeedOp::DeleteTopic),
            (0..NEWS_POOL, news_topics()).prop_map(|(id, topics)| FeedOp::PutNews(id, topics)),
            (0..NEWS_POOL).prop_map(FeedOp::DeleteNews),
            (0..NEWS_POOL, news_topics())
                .prop_map(|(id, topics)| FeedOp::RecreateNews(id, topics)),
        ]
    }

    /// Several passes, each a burst of feed changes followed by one sync.
    fn passes_strategy() -> impl Strategy<Value = Vec<Vec<FeedOp>>> {
        prop::collection::vec(prop::collection::vec(feed_op_strategy(), 0..10), 1..4)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn reconcile_keeps_store_in_step_with_feed(passes in passes_strategy()) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let h = SyncHarness::with_batch_size(3).await;
                let mut next_version = 0;
                let mut latest_topics = NEVER_SYNCED;
                let mut latest_news = NEVER_SYNCED;

                for ops in &passes {
                    for op in ops {
                        op.apply(&h.network, next_version);
                        match op.collection() {
                            SyncCollection::Topics => latest_topics = next_version,
                            SyncCollection::NewsResources => latest_news = next_version,
                        }
                        next_version += 1;
                    }

                    assert_eq!(h.run().await, SyncOutcome::Success);
                    h.assert_referential_integrity().await;
                    assert_eq!(h.version(SyncCollection::Topics).await, latest_topics);
                    assert_eq!(h.version(SyncCollection::NewsResources).await, latest_news);

                    let (feed_news, feed_topics) = {
                        let state = h.network.state.lock().unwrap();
                        let news: BTreeSet<String> = state.news.keys().cloned().collect();
                        (news, state.topics.clone())
                    };
                    let stored_news: BTreeSet<String> = h.news_ids().await.into_iter().collect();
                    assert_eq!(stored_news, feed_news);
                    for (id, topic) in &feed_topics {
                        let stored = h.repo.get_topic(id).await.unwrap();
                        assert_eq!(stored.map(|t| t.name), Some(topic.name.clone()));
                    }
                }
            });
        }
    }
}

// ==================== API TESTS ====================

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    harness: SyncHarness,
    scheduler: SyncScheduler,
}

impl TestFixture {
    async fn new() -> Self {
        let harness = SyncHarness::new().await;
        seed_basic_feed(&harness.network);

        let config = Config {
            db_path: harness.temp_dir.path().join("test.sqlite"),
            index_path: harness.temp_dir.path().join("index"),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            remote_url: None,
            demo_assets_path: harness.temp_dir.path().to_path_buf(),
            sync_interval: Duration::from_secs(3600),
            sync_batch_size: crate::config::DEFAULT_SYNC_BATCH_SIZE,
        };

        let scheduler = SyncScheduler::start(
            harness.worker.clone(),
            Arc::new(AlwaysOnline),
            SchedulePolicy::with_interval(config.sync_interval),
        );
        // Wait for the startup sync
        scheduler
            .subscribe()
            .wait_for(|s| s.last_outcome.is_some())
            .await
            .unwrap();

        let state = AppState {
            repo: harness.repo.clone(),
            prefs: harness.prefs.clone(),
            views: ContentViews::new(
                harness.repo.clone(),
                harness.prefs.clone(),
                harness.search.clone(),
            ),
            scheduler: scheduler.clone(),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            harness,
            scheduler,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Value {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), 200, "GET {}", path);
        resp.json().await.unwrap()
    }

    async fn put(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_topics_api() {
    let fixture = TestFixture::new().await;

    let body = fixture.get("/api/topics?sort=name").await;
    assert_eq!(body["success"], true);
    assert!(body["revisionId"].is_number());
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["topic"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Compose", "Kotlin", "Testing"]);

    let resp = fixture
        .put("/api/topics/2/follow", json!({ "followed": true }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["isFollowed"], true);
    assert_eq!(body["data"]["topic"]["id"], "2");

    let body = fixture.get("/api/topics/2").await;
    assert_eq!(body["data"]["isFollowed"], true);

    let resp = fixture
        .put("/api/topics/404/follow", json!({ "followed": true }))
        .await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_news_feeds_api() {
    let fixture = TestFixture::new().await;

    let body = fixture.get("/api/news").await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["n3", "n2", "n1"]);
    // Startup sync was a first sync, so everything is already viewed
    assert_eq!(body["data"][0]["hasBeenViewed"], true);

    let body = fixture.get("/api/news?topicIds=3").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["followableTopics"].as_array().unwrap().len(), 2);

    let body = fixture.get("/api/news/for-you").await;
    assert!(body["data"].as_array().unwrap().is_empty());

    fixture
        .put("/api/topics/1/follow", json!({ "followed": true }))
        .await;
    let body = fixture.get("/api/news/for-you").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let resp = fixture
        .put("/api/news/n2/bookmark", json!({ "bookmarked": true }))
        .await;
    assert_eq!(resp.status(), 200);
    let body = fixture.get("/api/bookmarks").await;
    assert_eq!(body["data"][0]["id"], "n2");
    assert_eq!(body["data"][0]["isSaved"], true);

    let resp = fixture
        .put("/api/news/n2/viewed", json!({ "viewed": false }))
        .await;
    let body: Value = resp.json().await.unwrap();
    let viewed = body["data"]["viewedNewsResources"].as_array().unwrap();
    assert!(!viewed.contains(&json!("n2")));
}

#[tokio::test]
async fn test_search_api() {
    let fixture = TestFixture::new().await;

    let body = fixture.get("/api/search?q=compose").await;
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["result"]["topics"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["data"]["result"]["newsResources"].as_array().unwrap().len(),
        2
    );

    let body = fixture.get("/api/search?q=c").await;
    assert_eq!(body["data"]["status"], "emptyQuery");

    let resp = fixture
        .client
        .post(fixture.url("/api/recent-searches"))
        .json(&json!({ "query": "compose" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = fixture.get("/api/recent-searches?limit=5").await;
    assert_eq!(body["data"][0]["query"], "compose");

    let resp = fixture
        .client
        .post(fixture.url("/api/recent-searches"))
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .delete(fixture.url("/api/recent-searches"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = fixture.get("/api/recent-searches").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_user_data_api() {
    let fixture = TestFixture::new().await;

    let body = fixture.get("/api/user-data").await;
    assert_eq!(body["data"]["themeBrand"], "DEFAULT");
    assert_eq!(body["data"]["shouldHideOnboarding"], false);

    let resp = fixture
        .put(
            "/api/user-data/preferences",
            json!({ "themeBrand": "ANDROID", "darkThemeConfig": "DARK", "shouldHideOnboarding": true }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["themeBrand"], "ANDROID");
    assert_eq!(body["data"]["darkThemeConfig"], "DARK");
    assert_eq!(body["data"]["useDynamicColor"], false);

    let resp = fixture
        .put("/api/user-data/preferences", json!({ "themeBrand": "PURPLE" }))
        .await;
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_sync_api() {
    let fixture = TestFixture::new().await;

    let body = fixture.get("/api/sync/status").await;
    assert_eq!(body["data"]["workName"], "SyncWorkName");
    assert_eq!(body["data"]["lastOutcome"], "success");
    assert_eq!(body["data"]["isSyncing"], false);

    fixture.harness.network.put_topic("4", "Wear", 3);
    let resp = fixture
        .client
        .post(fixture.url("/api/sync"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["result"], "enqueued");

    for _ in 0..250 {
        if fixture.harness.repo.get_topic("4").await.unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let body = fixture.get("/api/topics/4").await;
    assert_eq!(body["data"]["topic"]["name"], "Wear");

    fixture.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_sync_from_bundled_demo_assets() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("demo.sqlite"))
        .await
        .unwrap();
    let repo = Repository::open(pool.clone()).await.unwrap();
    let prefs = PreferencesStore::open(pool).await.unwrap();
    let index = Arc::new(SearchIndex::open(&temp_dir.path().join("index")).unwrap());
    let search = SearchContentsRepository::new(repo.clone(), index);

    let network: Arc<dyn NetworkDataSource> = Arc::new(crate::network::DemoNetworkDataSource::new(
        concat!(env!("CARGO_MANIFEST_DIR"), "/assets"),
    ));
    let worker = SyncWorker::new(
        prefs.clone(),
        Arc::new(TopicsSyncer::new(repo.clone(), network.clone(), 2)),
        Arc::new(NewsSyncer::new(
            repo.clone(),
            prefs.clone(),
            network,
            Arc::new(RecordingNotifier::new()),
            2,
        )),
        search.clone(),
    );

    assert_eq!(
        worker.do_work(CancellationToken::new()).await.unwrap(),
        SyncOutcome::Success
    );
    assert_eq!(prefs.version(SyncCollection::Topics).await.unwrap(), 4);
    assert_eq!(prefs.version(SyncCollection::NewsResources).await.unwrap(), 5);
    assert_eq!(repo.list_topics().await.unwrap().len(), 6);
    // Topic 6 is only referenced by news, so it exists as a shell
    assert_eq!(repo.get_topic("6").await.unwrap().unwrap().name, "");
    assert!(search.search_contents_count() > 0);

    // Nothing new on the second pass
    let revision = repo.get_revision_id().await.unwrap();
    assert_eq!(
        worker.do_work(CancellationToken::new()).await.unwrap(),
        SyncOutcome::Success
    );
    assert_eq!(repo.get_revision_id().await.unwrap(), revision);
}
