use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};
use xmind_core::{
    FetchError, ListFolderRequest, RemoteFileEntry, Timestamp, XmindClient, XmindError,
};

use super::paths::{backup_path, sanitized_name};
use super::reconcile::{DestinationStore, Outcome, Reconciler, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to list drive folder: {0}")]
    ListingFailed(#[source] XmindError),
}

/// Failure of a single file; the run continues with the next one.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub listing: ListFolderRequest,
    pub backup_dir: String,
    pub item_delay: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub listed: usize,
    pub folders: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Waits between files.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

pub struct BackupEngine<S> {
    provider: XmindClient,
    reconciler: Reconciler<S>,
    options: EngineOptions,
    pacer: Box<dyn Pacer>,
}

impl<S: DestinationStore> BackupEngine<S> {
    pub fn new(provider: XmindClient, reconciler: Reconciler<S>, options: EngineOptions) -> Self {
        Self {
            provider,
            reconciler,
            options,
            pacer: Box::new(TokioPacer),
        }
    }

    pub fn with_pacer(mut self, pacer: impl Pacer + 'static) -> Self {
        self.pacer = Box::new(pacer);
        self
    }

    /// Backs up one listing page, one file at a time.
    ///
    /// Only a failed listing aborts the run. Per-file failures are logged and
    /// counted in the summary.
    pub async fn run(&self) -> Result<RunSummary, EngineError> {
        let entries = self
            .provider
            .list_folder(&self.options.listing)
            .await
            .map_err(EngineError::ListingFailed)?;
        let total = entries.len();
        info!(total, folder = %self.options.listing.folder_id, "listed drive folder");

        let mut summary = RunSummary {
            listed: total,
            ..RunSummary::default()
        };
        for (index, entry) in entries.iter().enumerate() {
            if entry.is_folder() {
                summary.folders += 1;
                debug!(folder = %entry.name, "skipping folder");
                continue;
            }

            let name = sanitized_name(&entry.name);
            let modified = entry.modified_time.as_ref().map(describe_timestamp);
            info!(
                item = index + 1,
                total,
                file = %name,
                modified = modified.as_deref(),
                "backing up"
            );
            match self.backup_entry(entry, &name).await {
                Ok(outcome) => {
                    match outcome {
                        Outcome::Created => summary.created += 1,
                        Outcome::Updated => summary.updated += 1,
                        Outcome::Unchanged => summary.unchanged += 1,
                    }
                    info!(item = index + 1, file = %name, ?outcome, "stored");
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        item = index + 1,
                        file = %name,
                        id = %entry.id,
                        error = %err,
                        "skipped"
                    );
                }
            }

            if !self.options.item_delay.is_zero() {
                self.pacer.pause(self.options.item_delay).await;
            }
        }

        info!(
            listed = summary.listed,
            folders = summary.folders,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            failed = summary.failed,
            "backup run finished"
        );
        Ok(summary)
    }

    async fn backup_entry(
        &self,
        entry: &RemoteFileEntry,
        name: &str,
    ) -> Result<Outcome, ItemError> {
        let payload = self.provider.resolve(&entry.id).await?;
        debug!(
            file = name,
            source = ?payload.source,
            bytes = payload.bytes.len(),
            "resolved payload"
        );
        let path = backup_path(&self.options.backup_dir, name);
        Ok(self.reconciler.upsert(&path, &payload.bytes).await?)
    }
}

fn describe_timestamp(timestamp: &Timestamp) -> String {
    match timestamp {
        Timestamp::Millis(ms) => {
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(*ms) * 1_000_000)
                .ok()
                .and_then(|at| at.format(&Rfc3339).ok())
                .unwrap_or_else(|| ms.to_string())
        }
        Timestamp::Text(text) => text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_are_rendered_as_rfc3339() {
        assert_eq!(
            describe_timestamp(&Timestamp::Millis(1_700_000_000_000)),
            "2023-11-14T22:13:20Z"
        );
        assert_eq!(
            describe_timestamp(&Timestamp::Text("yesterday".into())),
            "yesterday"
        );
    }

    #[test]
    fn out_of_range_millis_fall_back_to_number() {
        assert_eq!(
            describe_timestamp(&Timestamp::Millis(i64::MAX)),
            i64::MAX.to_string()
        );
    }
}
