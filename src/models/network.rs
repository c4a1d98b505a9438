//! Wire models returned by the change feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NewsResourceEntity, NewsResourceTopicCrossRef, Topic};

/// Full topic as served by the remote source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTopic {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub followed: bool,
}

impl NetworkTopic {
    pub fn as_entity(&self) -> Topic {
        Topic {
            id: self.id.clone(),
            name: self.name.clone(),
            short_description: self.short_description.clone(),
            long_description: self.long_description.clone(),
            url: self.url.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

/// Full news resource as served by the remote source; topics are ids only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkNewsResource {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub header_image_url: Option<String>,
    pub publish_date: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl NetworkNewsResource {
    pub fn as_entity(&self) -> NewsResourceEntity {
        NewsResourceEntity {
            id: self.id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            url: self.url.clone(),
            header_image_url: self.header_image_url.clone(),
            publish_date: self.publish_date,
            resource_type: self.resource_type.clone(),
        }
    }

    /// Placeholder rows for every referenced topic.
    pub fn topic_entity_shells(&self) -> Vec<Topic> {
        self.topics.iter().map(Topic::shell).collect()
    }

    pub fn topic_cross_references(&self) -> Vec<NewsResourceTopicCrossRef> {
        self.topics
            .iter()
            .map(|topic_id| NewsResourceTopicCrossRef {
                news_resource_id: self.id.clone(),
                topic_id: topic_id.clone(),
            })
            .collect()
    }
}

/// `{"data": ...}` wrapper used by the entity endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkResponse<T> {
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn news_resource_relations() {
        let resource: NetworkNewsResource = serde_json::from_str(
            r#"{
                "id": "n1",
                "title": "Title",
                "content": "Body",
                "url": "https://example.com",
                "headerImageUrl": null,
                "publishDate": "2022-10-06T23:00:00Z",
                "type": "Video 📺",
                "topics": ["t1", "t2"]
            }"#,
        )
        .unwrap();

        let shells = resource.topic_entity_shells();
        assert_eq!(shells.len(), 2);
        assert_eq!(shells[0].id, "t1");
        assert!(shells[0].name.is_empty());

        let refs = resource.topic_cross_references();
        assert_eq!(refs[1].news_resource_id, "n1");
        assert_eq!(refs[1].topic_id, "t2");
        assert_eq!(resource.as_entity().resource_type, "Video 📺");
    }
}
