//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for values that cross the directory API boundary.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// InodeId
// ============================================================================

/// Server-assigned inode identifier
///
/// The directory API assigns identifiers (UUIDs or integer identity columns,
/// depending on the schema); the client never generates them, so the only
/// check is that the value is non-empty and safe to embed in a
/// `id=eq.<id>` query filter. Integer IDs are kept in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInodeId", into = "String")]
pub struct InodeId(String);

/// Wire form of an inode ID
#[derive(Deserialize)]
#[serde(untagged)]
enum RawInodeId {
    Text(String),
    Number(i64),
}

impl TryFrom<RawInodeId> for InodeId {
    type Error = DomainError;

    fn try_from(raw: RawInodeId) -> Result<Self, Self::Error> {
        match raw {
            RawInodeId::Text(s) => Self::new(s),
            RawInodeId::Number(n) => Self::new(n.to_string()),
        }
    }
}

impl InodeId {
    /// Create a new InodeId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains query delimiters
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidInodeId(
                "Inode ID cannot be empty".to_string(),
            ));
        }
        if id.contains(['&', '=', '?', '#', ',', ' ']) {
            return Err(DomainError::InvalidInodeId(format!(
                "Inode ID contains invalid characters: {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InodeId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for InodeId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<InodeId> for String {
    fn from(id: InodeId) -> Self {
        id.0
    }
}

// ============================================================================
// InodeName
// ============================================================================

/// A single path segment naming an inode within its parent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InodeName(String);

impl InodeName {
    /// Create a new InodeName
    ///
    /// # Errors
    /// Returns error for empty names, `.`/`..`, or names containing `/`
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() || name == "." || name == ".." {
            return Err(DomainError::InvalidInodeName(format!(
                "'{name}' is not a valid inode name"
            )));
        }
        if name.contains('/') || name.contains('\0') {
            return Err(DomainError::InvalidInodeName(format!(
                "Inode name cannot contain '/' or NUL: {name}"
            )));
        }
        Ok(Self(name))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InodeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for InodeName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<InodeName> for String {
    fn from(name: InodeName) -> Self {
        name.0
    }
}
