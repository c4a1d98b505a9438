//! News notifications posted after a sync.
//!
//! [`build_news_notifications`] turns newly added news into one grouped batch:
//! a capped list of individual notifications plus a summary.

use std::sync::Mutex;

use serde::Serialize;

use crate::models::NewsResource;

/// Maximum number of individual notifications per batch.
pub const MAX_NUM_NOTIFICATIONS: usize = 5;
pub const NEWS_NOTIFICATION_GROUP: &str = "NEWS_NOTIFICATIONS";
const DEEP_LINK_BASE_PATH: &str = "https://www.nowinandroid.apps.samples.google.com/foryou";

/// Sink for news notifications.
pub trait Notifier: Send + Sync {
    fn post_news_notifications(&self, news_resources: &[NewsResource]);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsNotification {
    pub news_resource_id: String,
    pub title: String,
    pub content: String,
    pub deep_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryNotification {
    pub title: String,
    pub lines: Vec<String>,
}

/// One grouped set of notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationBatch {
    pub group: &'static str,
    pub notifications: Vec<NewsNotification>,
    pub summary: SummaryNotification,
}

pub fn news_deep_link(news_resource_id: &str) -> String {
    format!("{}/{}", DEEP_LINK_BASE_PATH, news_resource_id)
}

/// Build the grouped batch for `news_resources`, or `None` when empty.
pub fn build_news_notifications(news_resources: &[NewsResource]) -> Option<NotificationBatch> {
    if news_resources.is_empty() {
        return None;
    }

    let truncated = &news_resources[..news_resources.len().min(MAX_NUM_NOTIFICATIONS)];
    let notifications = truncated
        .iter()
        .map(|news| NewsNotification {
            news_resource_id: news.id.clone(),
            title: news.title.clone(),
            content: news.content.clone(),
            deep_link: news_deep_link(&news.id),
        })
        .collect();

    let summary = SummaryNotification {
        title: format!("{} news updates", truncated.len()),
        lines: truncated.iter().map(|news| news.title.clone()).collect(),
    };

    Some(NotificationBatch {
        group: NEWS_NOTIFICATION_GROUP,
        notifications,
        summary,
    })
}

/// Default notifier: writes each batch to the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn post_news_notifications(&self, news_resources: &[NewsResource]) {
        let Some(batch) = build_news_notifications(news_resources) else {
            return;
        };

        for notification in &batch.notifications {
            tracing::info!(
                group = batch.group,
                id = %notification.news_resource_id,
                link = %notification.deep_link,
                "News notification: {}",
                notification.title
            );
        }
        tracing::info!(group = batch.group, "{}", batch.summary.title);
    }
}

/// Keeps every posted batch in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    batches: Mutex<Vec<NotificationBatch>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<NotificationBatch> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn post_news_notifications(&self, news_resources: &[NewsResource]) {
        if let Some(batch) = build_news_notifications(news_resources) {
            if let Ok(mut batches) = self.batches.lock() {
                batches.push(batch);
            }
        }
    }
}
