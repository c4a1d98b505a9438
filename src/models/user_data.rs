//! User data and the persisted preferences blob.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ChangeListVersions;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThemeBrand {
    #[default]
    Default,
    Android,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DarkThemeConfig {
    #[default]
    FollowSystem,
    Light,
    Dark,
}

/// The only user-mutable aggregate. Sync reads it but never produces it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserData {
    pub bookmarked_news_resources: BTreeSet<String>,
    pub viewed_news_resources: BTreeSet<String>,
    pub followed_topics: BTreeSet<String>,
    pub theme_brand: ThemeBrand,
    pub dark_theme_config: DarkThemeConfig,
    pub use_dynamic_color: bool,
    pub should_hide_onboarding: bool,
}

/// Everything stored in the preferences blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub change_list_versions: ChangeListVersions,
    pub user_data: UserData,
}

/// Partial update for presentation preferences.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesRequest {
    #[serde(default)]
    pub theme_brand: Option<ThemeBrand>,
    #[serde(default)]
    pub dark_theme_config: Option<DarkThemeConfig>,
    #[serde(default)]
    pub use_dynamic_color: Option<bool>,
    #[serde(default)]
    pub should_hide_onboarding: Option<bool>,
}
