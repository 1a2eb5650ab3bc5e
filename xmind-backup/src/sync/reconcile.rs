use async_trait::async_trait;
use thiserror::Error;
use xmind_core::{GithubClient, GithubError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path} was changed by someone else; version token is stale")]
    Conflict { path: String },
    #[error("store error: {cause}")]
    Backend {
        #[source]
        cause: BoxError,
    },
}

impl StoreError {
    pub fn backend(cause: impl Into<BoxError>) -> Self {
        StoreError::Backend {
            cause: cause.into(),
        }
    }
}

/// Current state of a path in the destination store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRecord {
    pub path: String,
    pub version_token: String,
    pub content: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
}

#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// `Ok(None)` when nothing is stored at `path`.
    async fn read_record(&self, path: &str) -> Result<Option<DestinationRecord>, StoreError>;

    async fn create_record(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<(), StoreError>;

    /// `version_token` must come from the preceding `read_record`.
    async fn update_record(
        &self,
        path: &str,
        bytes: &[u8],
        version_token: &str,
        message: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl DestinationStore for GithubClient {
    async fn read_record(&self, path: &str) -> Result<Option<DestinationRecord>, StoreError> {
        let file = self.get_file(path).await.map_err(store_error)?;
        Ok(file.map(|file| DestinationRecord {
            path: file.path,
            version_token: file.sha,
            content: file.content,
        }))
    }

    async fn create_record(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<(), StoreError> {
        self.create_file(path, bytes, message)
            .await
            .map(|_| ())
            .map_err(store_error)
    }

    async fn update_record(
        &self,
        path: &str,
        bytes: &[u8],
        version_token: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        self.update_file(path, bytes, version_token, message)
            .await
            .map(|_| ())
            .map_err(store_error)
    }
}

fn store_error(err: GithubError) -> StoreError {
    match err {
        GithubError::Conflict { path, .. } => StoreError::Conflict { path },
        other => StoreError::backend(other),
    }
}

/// Create-or-update of one payload at one path.
pub struct Reconciler<S> {
    store: S,
    skip_unchanged: bool,
}

impl<S: DestinationStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            skip_unchanged: false,
        }
    }

    /// Skip the write when the stored content already equals the payload.
    /// Off by default, so every run records a revision per file.
    pub fn with_skip_unchanged(mut self, skip_unchanged: bool) -> Self {
        self.skip_unchanged = skip_unchanged;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn upsert(&self, path: &str, bytes: &[u8]) -> Result<Outcome, StoreError> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match self.store.read_record(path).await? {
            None => {
                self.store
                    .create_record(path, bytes, &format!("Add {file_name}"))
                    .await?;
                Ok(Outcome::Created)
            }
            Some(record) => {
                if self.skip_unchanged && record.content.as_deref() == Some(bytes) {
                    return Ok(Outcome::Unchanged);
                }
                self.store
                    .update_record(
                        path,
                        bytes,
                        &record.version_token,
                        &format!("Update {file_name}"),
                    )
                    .await?;
                Ok(Outcome::Updated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Create {
            path: String,
            bytes: Vec<u8>,
            message: String,
        },
        Update {
            path: String,
            bytes: Vec<u8>,
            token: String,
            message: String,
        },
    }

    #[derive(Default)]
    struct FakeStore {
        record: Option<DestinationRecord>,
        fail_read: bool,
        conflict_on_update: bool,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeStore {
        fn with_record(token: &str, content: &[u8]) -> Self {
            Self {
                record: Some(DestinationRecord {
                    path: "xmind_backup/Plan.xmind".into(),
                    version_token: token.into(),
                    content: Some(content.to_vec()),
                }),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DestinationStore for FakeStore {
        async fn read_record(
            &self,
            _path: &str,
        ) -> Result<Option<DestinationRecord>, StoreError> {
            if self.fail_read {
                return Err(StoreError::backend("permission denied"));
            }
            Ok(self.record.clone())
        }

        async fn create_record(
            &self,
            path: &str,
            bytes: &[u8],
            message: &str,
        ) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(Call::Create {
                path: path.into(),
                bytes: bytes.to_vec(),
                message: message.into(),
            });
            Ok(())
        }

        async fn update_record(
            &self,
            path: &str,
            bytes: &[u8],
            version_token: &str,
            message: &str,
        ) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(Call::Update {
                path: path.into(),
                bytes: bytes.to_vec(),
                token: version_token.into(),
                message: message.into(),
            });
            if self.conflict_on_update {
                return Err(StoreError::Conflict { path: path.into() });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn creates_when_nothing_is_stored() {
        let reconciler = Reconciler::new(FakeStore::default());
        let outcome = reconciler
            .upsert("xmind_backup/Plan.xmind", b"new")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Created);
        assert_eq!(
            reconciler.store().calls(),
            vec![Call::Create {
                path: "xmind_backup/Plan.xmind".into(),
                bytes: b"new".to_vec(),
                message: "Add Plan.xmind".into(),
            }]
        );
    }

    #[tokio::test]
    async fn updates_with_token_that_was_read() {
        let reconciler = Reconciler::new(FakeStore::with_record("sha-1", b"old"));
        let outcome = reconciler
            .upsert("xmind_backup/Plan.xmind", b"new")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(
            reconciler.store().calls(),
            vec![Call::Update {
                path: "xmind_backup/Plan.xmind".into(),
                bytes: b"new".to_vec(),
                token: "sha-1".into(),
                message: "Update Plan.xmind".into(),
            }]
        );
    }

    #[tokio::test]
    async fn identical_bytes_still_update_by_default() {
        let reconciler = Reconciler::new(FakeStore::with_record("sha-1", b"same"));
        let outcome = reconciler
            .upsert("xmind_backup/Plan.xmind", b"same")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(reconciler.store().calls().len(), 1);
    }

    #[tokio::test]
    async fn identical_bytes_are_skipped_when_enabled() {
        let reconciler =
            Reconciler::new(FakeStore::with_record("sha-1", b"same")).with_skip_unchanged(true);
        let outcome = reconciler
            .upsert("xmind_backup/Plan.xmind", b"same")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert!(reconciler.store().calls().is_empty());

        let changed = reconciler
            .upsert("xmind_backup/Plan.xmind", b"different")
            .await
            .unwrap();
        assert_eq!(changed, Outcome::Updated);
    }

    #[tokio::test]
    async fn read_failure_is_not_treated_as_missing() {
        let reconciler = Reconciler::new(FakeStore {
            fail_read: true,
            ..FakeStore::default()
        });
        let err = reconciler
            .upsert("xmind_backup/Plan.xmind", b"new")
            .await
            .expect_err("read failure must surface");

        assert!(matches!(err, StoreError::Backend { .. }));
        assert!(reconciler.store().calls().is_empty());
    }

    #[tokio::test]
    async fn stale_token_is_a_conflict() {
        let reconciler = Reconciler::new(FakeStore {
            conflict_on_update: true,
            ..FakeStore::with_record("sha-stale", b"old")
        });
        let err = reconciler
            .upsert("xmind_backup/Plan.xmind", b"new")
            .await
            .expect_err("expected conflict");

        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(reconciler.store().calls().len(), 1);
    }

    #[test]
    fn github_conflict_maps_to_store_conflict() {
        let err = store_error(GithubError::Conflict {
            path: "a.xmind".into(),
            body: "does not match".into(),
        });
        assert!(matches!(err, StoreError::Conflict { ref path } if path == "a.xmind"));

        let err = store_error(GithubError::InvalidRepository("x".into()));
        assert!(matches!(err, StoreError::Backend { .. }));
    }
}
