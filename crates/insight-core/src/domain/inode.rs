//! Inode records of the remote hierarchical namespace
//!
//! An [`Inode`] is a folder or a file known to the directory API. Its `path`
//! is materialized server-side from the chain of names up to the root, and
//! `(parent_id, name)` is unique.

use serde::{Deserialize, Serialize};

use super::newtypes::{InodeId, InodeName};

/// Kind of inode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InodeType {
    File,
    Folder,
}

impl InodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InodeType::File => "file",
            InodeType::Folder => "folder",
        }
    }
}

impl std::fmt::Display for InodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record returned by the directory API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub id: InodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InodeType,
    #[serde(default)]
    pub parent_id: Option<InodeId>,
    /// Materialized path, e.g. `/docs/a.pdf`
    pub path: String,
    #[serde(default)]
    pub is_public: bool,
    /// Files start pending and become uploaded once their bytes are stored.
    /// Folders are complete on creation.
    #[serde(default)]
    pub is_uploaded: bool,
}

impl Inode {
    pub fn is_folder(&self) -> bool {
        self.kind == InodeType::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == InodeType::File
    }

    /// True for files whose bytes have not been confirmed in object storage
    pub fn is_pending_upload(&self) -> bool {
        self.is_file() && !self.is_uploaded
    }

    /// The path segment of this inode relative to its parent's materialized path
    ///
    /// This is the last component of `path`; `name` is used when the server
    /// returned a path without one.
    pub fn local_segment(&self) -> &str {
        self.path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Request body for creating an inode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewInode {
    pub name: InodeName,
    #[serde(rename = "type")]
    pub kind: InodeType,
    pub parent_id: Option<InodeId>,
    pub is_public: bool,
}

impl NewInode {
    pub fn folder(name: InodeName, parent_id: Option<InodeId>, is_public: bool) -> Self {
        Self {
            name,
            kind: InodeType::Folder,
            parent_id,
            is_public,
        }
    }

    pub fn file(name: InodeName, parent_id: Option<InodeId>, is_public: bool) -> Self {
        Self {
            name,
            kind: InodeType::File,
            parent_id,
            is_public,
        }
    }
}
