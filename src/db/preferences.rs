//! Persisted preferences: the version ledger and user data.
//!
//! Both live in one JSON blob. Every write is a read-modify-write inside a
//! single transaction, and writers queue on one lock, so concurrent updates
//! never lose each other's changes.

use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::{Row, SqlitePool};
use tokio::sync::{watch, Mutex};

use crate::errors::AppError;
use crate::models::{
    ChangeListVersions, DarkThemeConfig, Preferences, SyncCollection, ThemeBrand,
    UpdatePreferencesRequest, UserData,
};

/// Preferences store shared by the sync pipeline and the user-facing API.
#[derive(Clone)]
pub struct PreferencesStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    user_data: Arc<watch::Sender<UserData>>,
}

impl PreferencesStore {
    /// Open the store and seed the user-data channel from disk.
    pub async fn open(pool: SqlitePool) -> Result<Self, AppError> {
        let current = read_preferences(&pool).await?;
        let (user_data, _) = watch::channel(current.user_data);
        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            user_data: Arc::new(user_data),
        })
    }

    pub async fn preferences(&self) -> Result<Preferences, AppError> {
        read_preferences(&self.pool).await
    }

    /// Apply `f` to the stored preferences in one serialized transaction.
    pub async fn update<F, R>(&self, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut Preferences) -> R,
    {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data FROM preferences WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?;
        let mut prefs: Preferences = serde_json::from_str(row.get::<&str, _>("data"))?;
        let before = prefs.clone();

        let out = f(&mut prefs);

        if prefs != before {
            sqlx::query("UPDATE preferences SET data = ? WHERE id = 1")
                .bind(serde_json::to_string(&prefs)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        if prefs.user_data != before.user_data {
            self.user_data.send_replace(prefs.user_data);
        }
        Ok(out)
    }

    // ==================== VERSION LEDGER ====================

    pub async fn change_list_versions(&self) -> Result<ChangeListVersions, AppError> {
        Ok(self.preferences().await?.change_list_versions)
    }

    /// Replace the ledger with `f(current)`. Per-collection values never move
    /// backwards; a lower value keeps the stored one.
    pub async fn update_change_list_versions<F>(&self, f: F) -> Result<ChangeListVersions, AppError>
    where
        F: FnOnce(ChangeListVersions) -> ChangeListVersions,
    {
        self.update(|prefs| {
            let current = prefs.change_list_versions;
            let proposed = f(current);
            let next = current
                .with(SyncCollection::Topics, proposed.topic_version)
                .with(SyncCollection::NewsResources, proposed.news_resource_version);
            prefs.change_list_versions = next;
            next
        })
        .await
    }

    pub async fn version(&self, collection: SyncCollection) -> Result<i64, AppError> {
        Ok(self.change_list_versions().await?.get(collection))
    }

    pub async fn set_version(&self, collection: SyncCollection, version: i64) -> Result<(), AppError> {
        self.update_change_list_versions(|versions| versions.with(collection, version))
            .await?;
        Ok(())
    }

    // ==================== USER DATA ====================

    pub async fn user_data(&self) -> Result<UserData, AppError> {
        Ok(self.preferences().await?.user_data)
    }

    /// Watch user data; the receiver sees every committed change.
    pub fn subscribe(&self) -> watch::Receiver<UserData> {
        self.user_data.subscribe()
    }

    pub async fn set_followed_topic_ids(&self, ids: BTreeSet<String>) -> Result<(), AppError> {
        self.update(|prefs| prefs.user_data.followed_topics = ids).await
    }

    pub async fn set_topic_id_followed(&self, id: &str, followed: bool) -> Result<(), AppError> {
        self.update(|prefs| toggle(&mut prefs.user_data.followed_topics, id, followed))
            .await
    }

    pub async fn set_news_resource_bookmarked(
        &self,
        id: &str,
        bookmarked: bool,
    ) -> Result<(), AppError> {
        self.update(|prefs| toggle(&mut prefs.user_data.bookmarked_news_resources, id, bookmarked))
            .await
    }

    pub async fn set_news_resources_viewed<'a, I>(&self, ids: I, viewed: bool) -> Result<(), AppError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let ids: Vec<&String> = ids.into_iter().collect();
        self.update(|prefs| {
            for id in ids {
                toggle(&mut prefs.user_data.viewed_news_resources, id, viewed);
            }
        })
        .await
    }

    pub async fn set_theme_brand(&self, theme_brand: ThemeBrand) -> Result<(), AppError> {
        self.update(|prefs| prefs.user_data.theme_brand = theme_brand)
            .await
    }

    pub async fn set_dark_theme_config(&self, config: DarkThemeConfig) -> Result<(), AppError> {
        self.update(|prefs| prefs.user_data.dark_theme_config = config)
            .await
    }

    pub async fn set_dynamic_color_preference(&self, enabled: bool) -> Result<(), AppError> {
        self.update(|prefs| prefs.user_data.use_dynamic_color = enabled)
            .await
    }

    pub async fn set_should_hide_onboarding(&self, hide: bool) -> Result<(), AppError> {
        self.update(|prefs| prefs.user_data.should_hide_onboarding = hide)
            .await
    }

    /// Apply several presentation settings in one write.
    pub async fn apply_preferences(
        &self,
        request: &UpdatePreferencesRequest,
    ) -> Result<UserData, AppError> {
        self.update(|prefs| {
            let data = &mut prefs.user_data;
            if let Some(brand) = request.theme_brand {
                data.theme_brand = brand;
            }
            if let Some(config) = request.dark_theme_config {
                data.dark_theme_config = config;
            }
            if let Some(enabled) = request.use_dynamic_color {
                data.use_dynamic_color = enabled;
            }
            if let Some(hide) = request.should_hide_onboarding {
                data.should_hide_onboarding = hide;
            }
            data.clone()
        })
        .await
    }
}

fn toggle(set: &mut BTreeSet<String>, id: &str, present: bool) {
    if present {
        set.insert(id.to_string());
    } else {
        set.remove(id);
    }
}

async fn read_preferences(pool: &SqlitePool) -> Result<Preferences, AppError> {
    let row = sqlx::query("SELECT data FROM preferences WHERE id = 1")
        .fetch_one(pool)
        .await?;
    Ok(serde_json::from_str(row.get::<&str, _>("data"))?)
}
