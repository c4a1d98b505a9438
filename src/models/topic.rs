//! Topic model.

use serde::{Deserialize, Serialize};

/// A topic a user can follow.
///
/// Topics are slow-changing: when a news batch references a topic that is not
/// stored yet, a shell with only the id is inserted and never overwrites an
/// existing row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub short_description: String,
    pub long_description: String,
    pub url: String,
    pub image_url: String,
}

impl Topic {
    /// A placeholder row carrying only the id.
    pub fn shell(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// A topic paired with whether the user follows it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FollowableTopic {
    pub topic: Topic,
    pub is_followed: bool,
}

/// Sort order for followable topic listings.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TopicSortField {
    #[default]
    None,
    Name,
}
