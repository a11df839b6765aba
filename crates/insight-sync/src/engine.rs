//! Tree synchronizer
//!
//! The [`TreeSynchronizer`] mirrors a local file or directory into the inode
//! directory and uploads file contents to object storage.
//!
//! ## Sync Flow
//!
//! 1. **Folder**: create the folder inode, or look up the existing one on
//!    conflict, then walk every child with the folder as parent
//! 2. **File**: create the file inode, upload its bytes to the inode's path,
//!    then mark the inode uploaded
//! 3. **Conflict on a file**: the file was synced before and is skipped
//!
//! A file whose upload fails keeps its inode with `is_uploaded = false`.
//! Nothing is rolled back, since another client may be uploading the same
//! inode. With [`SyncOptions::resume_pending_uploads`] such inodes are
//! uploaded again on the next run.
//!
//! ## Retry Logic
//!
//! The upload and the `is_uploaded` update are retried on transient errors
//! (storage transport failures, HTTP 429 and 5xx) with exponential backoff:
//! 1s, 2s, 4s. Inode creation is never retried; a retried create that
//! succeeded server-side would surface as a conflict.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use insight_core::config::{FailurePolicy, SyncConfig};
use insight_core::domain::{ClientError, Inode, InodeId, InodeName, NewInode};
use insight_core::ports::{IInodeDirectory, IObjectStorage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::SyncError;

// ============================================================================
// Options and report
// ============================================================================

/// Default number of retries for transient upload failures
pub const DEFAULT_UPLOAD_RETRIES: u32 = 3;

/// Base delay for exponential backoff
const BASE_DELAY_SECS: u64 = 1;

/// How a walk treats visibility and failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Visibility of every inode created by the walk
    pub is_public: bool,
    pub failure_policy: FailurePolicy,
    /// Re-upload files whose inode exists but was never marked uploaded
    pub resume_pending_uploads: bool,
    /// Retries for transient upload failures
    pub upload_retries: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            is_public: false,
            failure_policy: FailurePolicy::Abort,
            resume_pending_uploads: false,
            upload_retries: DEFAULT_UPLOAD_RETRIES,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            failure_policy: config.failure_policy,
            resume_pending_uploads: config.resume_pending_uploads,
            ..Self::default()
        }
    }

    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }
}

/// An entry that failed under [`FailurePolicy::Continue`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of one walk
///
/// Every entry returns its own report and folders merge their children's, so
/// no counters are shared across the walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub folders_created: u32,
    /// Folders that already existed and were reused
    pub folders_reused: u32,
    pub files_uploaded: u32,
    /// Files that already existed and were not uploaded again
    pub files_skipped: u32,
    /// Pending files uploaded again
    pub files_resumed: u32,
    pub bytes_uploaded: u64,
    /// Entries that were neither a file nor a directory
    pub entries_ignored: u32,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.folders_created += other.folders_created;
        self.folders_reused += other.folders_reused;
        self.files_uploaded += other.files_uploaded;
        self.files_skipped += other.files_skipped;
        self.files_resumed += other.files_resumed;
        self.bytes_uploaded += other.bytes_uploaded;
        self.entries_ignored += other.entries_ignored;
        self.failures.extend(other.failures);
    }

    /// True when no entry failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// Retry logic
// ============================================================================

/// Transport and server-side failures that may succeed when repeated
fn is_transient_error(err: &ClientError) -> bool {
    match err {
        ClientError::StorageUnavailable(_) => true,
        ClientError::Api { status, .. } => *status == 0 || *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Executes an async operation with exponential backoff retry
///
/// Only retries on transient errors. Non-transient errors are returned
/// immediately.
async fn with_retry<F, Fut, T>(operation: &str, max_retries: u32, f: F) -> Result<T, ClientError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < max_retries && is_transient_error(&err) => {
                let delay_secs = BASE_DELAY_SECS * 2u64.pow(attempt);
                warn!(operation, attempt, delay_secs, error = %err, "Transient error, retrying");
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// ============================================================================
// TreeSynchronizer
// ============================================================================

fn entry_name(local: &Path) -> Result<InodeName, SyncError> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    InodeName::new(name).map_err(|source| SyncError::InvalidName {
        path: local.to_path_buf(),
        source,
    })
}

/// Uploads local trees into the inode directory
pub struct TreeSynchronizer {
    directory: Arc<dyn IInodeDirectory>,
    storage: Arc<dyn IObjectStorage>,
    options: SyncOptions,
}

impl TreeSynchronizer {
    pub fn new(
        directory: Arc<dyn IInodeDirectory>,
        storage: Arc<dyn IObjectStorage>,
        options: SyncOptions,
    ) -> Self {
        Self {
            directory,
            storage,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Synchronizes `local` under `parent_id` (`None` = root)
    ///
    /// A path without a final component (`.`, `..`) is canonicalized first
    /// so the remote entry gets the directory's real name.
    pub async fn sync(
        &self,
        local: &Path,
        parent_id: Option<&InodeId>,
    ) -> Result<SyncReport, SyncError> {
        let local = match local.file_name() {
            Some(_) => local.to_path_buf(),
            None => tokio::fs::canonicalize(local)
                .await
                .map_err(|e| SyncError::io(local, e))?,
        };

        info!(path = %local.display(), parent_id = ?parent_id, public = self.options.is_public, "Starting sync");
        let report = self.sync_entry(&local, parent_id).await?;
        info!(
            path = %local.display(),
            folders_created = report.folders_created,
            files_uploaded = report.files_uploaded,
            files_skipped = report.files_skipped,
            failures = report.failures.len(),
            "Sync complete"
        );
        Ok(report)
    }

    fn sync_entry<'a>(
        &'a self,
        local: &'a Path,
        parent_id: Option<&'a InodeId>,
    ) -> BoxFuture<'a, Result<SyncReport, SyncError>> {
        async move {
            let metadata = tokio::fs::metadata(local)
                .await
                .map_err(|e| SyncError::io(local, e))?;

            if metadata.is_dir() {
                self.sync_folder(local, parent_id).await
            } else if metadata.is_file() {
                self.sync_file(local, parent_id).await
            } else {
                warn!(path = %local.display(), "Not a file or directory, ignoring");
                Ok(SyncReport {
                    entries_ignored: 1,
                    ..SyncReport::default()
                })
            }
        }
        .boxed()
    }

    async fn sync_folder(
        &self,
        local: &Path,
        parent_id: Option<&InodeId>,
    ) -> Result<SyncReport, SyncError> {
        let name = entry_name(local)?;
        let mut report = SyncReport::default();

        let outcome = self
            .directory
            .find_or_create_folder(&name, parent_id, self.options.is_public)
            .await
            .map_err(|e| SyncError::client(local, e))?;
        if outcome.was_created() {
            report.folders_created += 1;
        } else {
            debug!(path = %local.display(), inode_id = %outcome.inode().id, "Folder exists, reusing");
            report.folders_reused += 1;
        }
        let folder = outcome.into_inode();

        for child in self.children(local).await? {
            match self.sync_entry(&child, Some(&folder.id)).await {
                Ok(child_report) => report.merge(child_report),
                Err(err) if self.options.failure_policy == FailurePolicy::Continue => {
                    warn!(path = %child.display(), error = %err, "Sync failed, continuing");
                    report.failures.push(SyncFailure {
                        path: child,
                        error: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(report)
    }

    /// Direct children of `local`, in name order
    async fn children(&self, local: &Path) -> Result<Vec<PathBuf>, SyncError> {
        let mut entries = tokio::fs::read_dir(local)
            .await
            .map_err(|e| SyncError::io(local, e))?;
        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::io(local, e))?
        {
            children.push(entry.path());
        }
        children.sort();
        Ok(children)
    }

    async fn sync_file(
        &self,
        local: &Path,
        parent_id: Option<&InodeId>,
    ) -> Result<SyncReport, SyncError> {
        let name = entry_name(local)?;
        let mut report = SyncReport::default();

        let new = NewInode::file(name.clone(), parent_id.cloned(), self.options.is_public);
        match self.directory.create(&new).await {
            Ok(inode) => {
                report.bytes_uploaded = self.upload(&inode, local).await?;
                report.files_uploaded += 1;
            }
            Err(err) if err.is_conflict() => {
                if !self.options.resume_pending_uploads {
                    debug!(path = %local.display(), "File exists, skipping");
                    report.files_skipped += 1;
                    return Ok(report);
                }

                let existing = self
                    .directory
                    .lookup(&name, parent_id)
                    .await
                    .map_err(|e| SyncError::client(local, e))?;
                if existing.is_pending_upload() {
                    info!(path = %local.display(), inode_id = %existing.id, "Resuming pending upload");
                    report.bytes_uploaded = self.upload(&existing, local).await?;
                    report.files_resumed += 1;
                } else {
                    debug!(path = %local.display(), "File exists, skipping");
                    report.files_skipped += 1;
                }
            }
            Err(err) => return Err(SyncError::client(local, err)),
        }

        Ok(report)
    }

    /// Stores the bytes, then flags the inode uploaded
    async fn upload(&self, inode: &Inode, local: &Path) -> Result<u64, SyncError> {
        let retries = self.options.upload_retries;
        let bytes = with_retry("upload", retries, || {
            self.storage.upload(&inode.path, local, inode.is_public)
        })
        .await
        .map_err(|e| SyncError::client(local, e))?;

        with_retry("mark_uploaded", retries, || {
            self.directory.mark_uploaded(&inode.id)
        })
        .await
        .map_err(|e| SyncError::client(local, e))?;

        info!(path = %local.display(), inode_id = %inode.id, remote = %inode.path, bytes, "Uploaded file");
        Ok(bytes)
    }
}
