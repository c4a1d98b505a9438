//! Change-feed records and the per-collection version ledger.

use serde::{Deserialize, Serialize};

/// Ledger value meaning "this collection has never been synced".
pub const NEVER_SYNCED: i64 = -1;

/// One of the entity collections tracked by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncCollection {
    Topics,
    NewsResources,
}

impl SyncCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncCollection::Topics => "topics",
            SyncCollection::NewsResources => "news_resources",
        }
    }
}

impl std::fmt::Display for SyncCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote-reported change to one entity since a given version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkChangeList {
    /// Id of the changed entity
    pub id: String,
    /// Unique, increasing within one response; versions may skip
    pub change_list_version: i64,
    /// Deletion or update (updates include creations)
    pub is_delete: bool,
}

/// Last-synced version per collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeListVersions {
    pub topic_version: i64,
    pub news_resource_version: i64,
}

impl Default for ChangeListVersions {
    fn default() -> Self {
        Self {
            topic_version: NEVER_SYNCED,
            news_resource_version: NEVER_SYNCED,
        }
    }
}

impl ChangeListVersions {
    pub fn get(&self, collection: SyncCollection) -> i64 {
        match collection {
            SyncCollection::Topics => self.topic_version,
            SyncCollection::NewsResources => self.news_resource_version,
        }
    }

    /// Copy with `collection` moved to `version`. The ledger never moves
    /// backwards, so a lower version leaves the current one in place.
    pub fn with(self, collection: SyncCollection, version: i64) -> Self {
        let mut next = self;
        let slot = match collection {
            SyncCollection::Topics => &mut next.topic_version,
            SyncCollection::NewsResources => &mut next.news_resource_version,
        };
        *slot = (*slot).max(version);
        next
    }
}
