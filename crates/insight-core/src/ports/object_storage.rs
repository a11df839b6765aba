//! Object storage port
//!
//! File bytes are stored under a key derived from the authenticated user's
//! subject and the inode's materialized path. Implementations obtain and
//! refresh their own credentials.

use std::path::Path;

use crate::domain::ClientError;

/// Port trait for transferring file contents
#[async_trait::async_trait]
pub trait IObjectStorage: Send + Sync {
    /// Uploads `local` as the object for `inode_path`
    ///
    /// Public objects are tagged `is_public=true`. Returns the number of
    /// bytes written.
    async fn upload(
        &self,
        inode_path: &str,
        local: &Path,
        is_public: bool,
    ) -> Result<u64, ClientError>;

    /// Downloads the object for `inode_path` into `dest`
    ///
    /// Returns the number of bytes written.
    async fn download(&self, inode_path: &str, dest: &Path) -> Result<u64, ClientError>;
}
