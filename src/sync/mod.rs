//! Offline-first synchronization.
//!
//! Each collection is reconciled against the remote change feed by
//! [`change_list_sync`]: read the ledger version, fetch the changes after it,
//! delete, then fetch and upsert updates in batches, and finally move the
//! ledger to the highest version seen. Any failure other than cancellation
//! is logged and reported as `Ok(false)`, leaving the ledger untouched so
//! the next job retries from the same version.

mod news;
mod scheduler;
mod topics;
mod worker;

pub use news::NewsSyncer;
pub use scheduler::*;
pub use topics::TopicsSyncer;
pub use worker::*;

use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::db::PreferencesStore;
use crate::errors::AppError;
use crate::models::{ChangeListVersions, NetworkChangeList, SyncCollection, NEVER_SYNCED};

/// Read-modify-write applied to the ledger inside one transaction.
pub type VersionUpdate = Box<dyn FnOnce(ChangeListVersions) -> ChangeListVersions + Send>;

/// Ledger access and cancellation for one sync job.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    async fn get_change_list_versions(&self) -> Result<ChangeListVersions, AppError>;

    async fn update_change_list_versions(&self, update: VersionUpdate) -> Result<(), AppError>;

    /// Cancelled when the enclosing job is cancelled.
    fn cancellation_token(&self) -> &CancellationToken;
}

/// A local store that can be brought up to date with the network.
#[async_trait]
pub trait Syncable: Send + Sync {
    /// Returns whether the sync succeeded. Only cancellation is an `Err`.
    async fn sync_with(&self, synchronizer: &dyn Synchronizer) -> Result<bool, AppError>;
}

/// Per-collection hooks driven by [`change_list_sync`].
#[async_trait]
pub trait ChangeListModel: Send + Sync {
    fn collection(&self) -> SyncCollection;

    /// Changes after `after`, in increasing version order.
    async fn fetch_change_list(&self, after: i64) -> Result<Vec<NetworkChangeList>, AppError>;

    /// Remove models deleted remotely. Unknown ids are ignored.
    async fn delete_models(&self, ids: &[String]) -> Result<(), AppError>;

    /// Fetch the full models for `ids` and store them.
    async fn update_models(&self, ids: &[String], pass: &SyncPass) -> Result<(), AppError>;
}

#[async_trait]
impl<M: ChangeListModel> Syncable for M {
    async fn sync_with(&self, synchronizer: &dyn Synchronizer) -> Result<bool, AppError> {
        change_list_sync(synchronizer, self).await
    }
}

/// Context handed to [`ChangeListModel::update_models`].
#[derive(Debug, Clone)]
pub struct SyncPass {
    pub collection: SyncCollection,
    /// Ledger value this pass started from.
    pub current_version: i64,
    pub cancel: CancellationToken,
}

impl SyncPass {
    /// The collection has never been synced on this device.
    pub fn is_first_sync(&self) -> bool {
        self.current_version <= NEVER_SYNCED
    }
}

/// Ledger-backed [`Synchronizer`] for one job.
pub struct SyncSession {
    prefs: PreferencesStore,
    cancel: CancellationToken,
}

impl SyncSession {
    pub fn new(prefs: PreferencesStore, cancel: CancellationToken) -> Self {
        Self { prefs, cancel }
    }
}

#[async_trait]
impl Synchronizer for SyncSession {
    async fn get_change_list_versions(&self) -> Result<ChangeListVersions, AppError> {
        self.prefs.change_list_versions().await
    }

    async fn update_change_list_versions(&self, update: VersionUpdate) -> Result<(), AppError> {
        self.prefs.update_change_list_versions(update).await?;
        Ok(())
    }

    fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Run `fut` unless `token` is cancelled first.
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}

/// Reconcile one collection. See the module docs for the contract.
pub async fn change_list_sync<M>(synchronizer: &dyn Synchronizer, model: &M) -> Result<bool, AppError>
where
    M: ChangeListModel + ?Sized,
{
    let collection = model.collection();
    match reconcile(synchronizer, model).await {
        Ok(()) => Ok(true),
        Err(err) if err.is_cancelled() => {
            tracing::info!(collection = %collection, "Sync cancelled");
            Err(err)
        }
        Err(err) => {
            tracing::warn!(
                collection = %collection,
                code = err.error_code(),
                "Sync failed: {}",
                err
            );
            Ok(false)
        }
    }
}

async fn reconcile<M>(synchronizer: &dyn Synchronizer, model: &M) -> Result<(), AppError>
where
    M: ChangeListModel + ?Sized,
{
    let collection = model.collection();
    let cancel = synchronizer.cancellation_token();

    let current_version = cancellable(cancel, synchronizer.get_change_list_versions())
        .await?
        .get(collection);
    let change_list = cancellable(cancel, model.fetch_change_list(current_version)).await?;

    let Some(latest_version) = change_list.iter().map(|c| c.change_list_version).max() else {
        tracing::debug!(collection = %collection, version = current_version, "Already up to date");
        return Ok(());
    };

    let (deleted, updated) = partition_change_list(&change_list);
    let pass = SyncPass {
        collection,
        current_version,
        cancel: cancel.clone(),
    };

    // Deletes first: an id deleted and re-created in one response ends up present.
    if !deleted.is_empty() {
        cancellable(cancel, model.delete_models(&deleted)).await?;
    }
    if !updated.is_empty() {
        cancellable(cancel, model.update_models(&updated, &pass)).await?;
    }

    cancellable(
        cancel,
        synchronizer.update_change_list_versions(Box::new(move |versions: ChangeListVersions| {
            versions.with(collection, latest_version)
        })),
    )
    .await?;

    tracing::info!(
        collection = %collection,
        from = current_version,
        to = latest_version,
        deleted = deleted.len(),
        updated = updated.len(),
        "Sync complete"
    );
    Ok(())
}

/// Split into (deleted ids, updated ids), each de-duplicated in feed order.
fn partition_change_list(change_list: &[NetworkChangeList]) -> (Vec<String>, Vec<String>) {
    let mut deleted = Vec::new();
    let mut updated = Vec::new();
    let mut seen_deleted = HashSet::new();
    let mut seen_updated = HashSet::new();

    for change in change_list {
        let (ids, seen) = if change.is_delete {
            (&mut deleted, &mut seen_deleted)
        } else {
            (&mut updated, &mut seen_updated)
        };
        if seen.insert(change.id.as_str()) {
            ids.push(change.id.clone());
        }
    }
    (deleted, updated)
}
