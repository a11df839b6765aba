//! Download walk
//!
//! [`TreeDownloader`] recreates an inode subtree under a local directory.
//! Each inode is written at the last segment of its materialized path, so
//! the local layout follows the server-side `path` rather than `name`.
//!
//! Folders without children are not created locally. Uploading an empty
//! local directory does create a remote folder, so this walk is
//! deliberately not the inverse of the upload walk for empty folders.
//! Files still pending upload have no object yet and are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use insight_core::domain::{Inode, InodeId, InodeName};
use insight_core::ports::{IInodeDirectory, IObjectStorage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::SyncError;

/// Summary of one download walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub folders_created: u32,
    pub files_downloaded: u32,
    /// Files skipped because their bytes were never uploaded
    pub files_pending: u32,
    pub bytes_downloaded: u64,
}

impl DownloadReport {
    pub fn merge(&mut self, other: DownloadReport) {
        self.folders_created += other.folders_created;
        self.files_downloaded += other.files_downloaded;
        self.files_pending += other.files_pending;
        self.bytes_downloaded += other.bytes_downloaded;
    }
}

/// Downloads inode subtrees into local directories
pub struct TreeDownloader {
    directory: Arc<dyn IInodeDirectory>,
    storage: Arc<dyn IObjectStorage>,
}

impl TreeDownloader {
    pub fn new(directory: Arc<dyn IInodeDirectory>, storage: Arc<dyn IObjectStorage>) -> Self {
        Self { directory, storage }
    }

    /// Fetches the inode `id` and downloads it into `local_dir`
    pub async fn download_id(
        &self,
        id: &InodeId,
        local_dir: &Path,
    ) -> Result<DownloadReport, SyncError> {
        let inode = self
            .directory
            .get(id)
            .await
            .map_err(|e| SyncError::client(local_dir, e))?;
        self.download(&inode, local_dir).await
    }

    /// Downloads `inode` (and its descendants) into `local_dir`
    pub async fn download(
        &self,
        inode: &Inode,
        local_dir: &Path,
    ) -> Result<DownloadReport, SyncError> {
        info!(inode_id = %inode.id, remote = %inode.path, dest = %local_dir.display(), "Starting download");
        let report = self.download_entry(inode, local_dir).await?;
        info!(
            inode_id = %inode.id,
            files_downloaded = report.files_downloaded,
            files_pending = report.files_pending,
            bytes = report.bytes_downloaded,
            "Download complete"
        );
        Ok(report)
    }

    fn download_entry<'a>(
        &'a self,
        inode: &'a Inode,
        local_dir: &'a Path,
    ) -> BoxFuture<'a, Result<DownloadReport, SyncError>> {
        async move {
            let target = local_target(inode, local_dir)?;
            if inode.is_folder() {
                self.download_folder(inode, &target).await
            } else {
                self.download_file(inode, &target).await
            }
        }
        .boxed()
    }

    async fn download_folder(
        &self,
        inode: &Inode,
        target: &Path,
    ) -> Result<DownloadReport, SyncError> {
        let children = self
            .directory
            .list(Some(&inode.id))
            .await
            .map_err(|e| SyncError::client(target, e))?;
        let mut report = DownloadReport::default();

        if children.is_empty() {
            debug!(remote = %inode.path, "Folder has no children, not creating it");
            return Ok(report);
        }

        if !tokio::fs::try_exists(target).await.unwrap_or(false) {
            tokio::fs::create_dir_all(target)
                .await
                .map_err(|e| SyncError::io(target, e))?;
            report.folders_created += 1;
        }

        for child in &children {
            report.merge(self.download_entry(child, target).await?);
        }
        Ok(report)
    }

    async fn download_file(
        &self,
        inode: &Inode,
        target: &Path,
    ) -> Result<DownloadReport, SyncError> {
        if inode.is_pending_upload() {
            warn!(remote = %inode.path, inode_id = %inode.id, "File was never uploaded, skipping");
            return Ok(DownloadReport {
                files_pending: 1,
                ..DownloadReport::default()
            });
        }

        let bytes = self
            .storage
            .download(&inode.path, target)
            .await
            .map_err(|e| SyncError::client(target, e))?;
        debug!(remote = %inode.path, dest = %target.display(), bytes, "Downloaded file");
        Ok(DownloadReport {
            files_downloaded: 1,
            bytes_downloaded: bytes,
            ..DownloadReport::default()
        })
    }
}

/// Local path for `inode` under `local_dir`
///
/// The segment must be a plain name so a server-supplied path can never
/// escape `local_dir`.
fn local_target(inode: &Inode, local_dir: &Path) -> Result<PathBuf, SyncError> {
    let segment = InodeName::new(inode.local_segment()).map_err(|source| SyncError::InvalidName {
        path: PathBuf::from(&inode.path),
        source,
    })?;
    Ok(local_dir.join(segment.as_str()))
}
