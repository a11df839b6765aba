//! Inode directory port
//!
//! CRUD over the remote hierarchical namespace. Creating an inode whose
//! `(parent_id, name)` already exists fails with [`ClientError::Conflict`];
//! callers resolve it with [`IInodeDirectory::lookup`].

use crate::domain::{ClientError, Inode, InodeId, InodeName, NewInode};

/// Result of [`IInodeDirectory::find_or_create_folder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderOutcome {
    /// This call created the folder
    Created(Inode),
    /// The folder already existed and was looked up
    Existing(Inode),
}

impl FolderOutcome {
    pub fn was_created(&self) -> bool {
        matches!(self, FolderOutcome::Created(_))
    }

    pub fn inode(&self) -> &Inode {
        match self {
            FolderOutcome::Created(inode) | FolderOutcome::Existing(inode) => inode,
        }
    }

    pub fn into_inode(self) -> Inode {
        match self {
            FolderOutcome::Created(inode) | FolderOutcome::Existing(inode) => inode,
        }
    }
}

/// Port trait for the directory API
#[async_trait::async_trait]
pub trait IInodeDirectory: Send + Sync {
    /// Creates a folder or a file inode
    ///
    /// Files are created with `is_uploaded = false`.
    async fn create(&self, inode: &NewInode) -> Result<Inode, ClientError>;

    /// Finds the inode with the given name under `parent_id` (`None` = root)
    ///
    /// Fails with [`ClientError::NotFound`] when there is no such inode.
    async fn lookup(&self, name: &InodeName, parent_id: Option<&InodeId>)
        -> Result<Inode, ClientError>;

    /// Lists the direct children of `parent_id` (`None` = root)
    async fn list(&self, parent_id: Option<&InodeId>) -> Result<Vec<Inode>, ClientError>;

    /// Fetches a single inode by ID
    async fn get(&self, id: &InodeId) -> Result<Inode, ClientError>;

    /// Flags a file inode as having its bytes stored
    async fn mark_uploaded(&self, id: &InodeId) -> Result<(), ClientError>;

    /// Deletes an inode
    async fn delete(&self, id: &InodeId) -> Result<(), ClientError>;

    /// Creates a folder, or returns the existing one on conflict
    async fn find_or_create_folder(
        &self,
        name: &InodeName,
        parent_id: Option<&InodeId>,
        is_public: bool,
    ) -> Result<FolderOutcome, ClientError> {
        let new = NewInode::folder(name.clone(), parent_id.cloned(), is_public);
        match self.create(&new).await {
            Ok(inode) => Ok(FolderOutcome::Created(inode)),
            Err(err) if err.is_conflict() => {
                self.lookup(name, parent_id).await.map(FolderOutcome::Existing)
            }
            Err(err) => Err(err),
        }
    }
}
