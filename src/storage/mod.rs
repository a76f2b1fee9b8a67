//! File-store capability consumed by the indexer and pipeline.
//!
//! The core engines never touch the filesystem directly; they go through
//! this trait so the same traversal and move logic works against any
//! hierarchical store that can enumerate children, read bytes, rename,
//! move and create folders.

mod local;

pub use local::LocalFileStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque folder identifier. Stable across invocations so it can be
/// serialized into the scan checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub String);

/// Opaque file identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub String);

/// A child folder as seen during enumeration.
#[derive(Debug, Clone)]
pub struct FolderHandle {
    pub id: FolderId,
    pub name: String,
}

/// File metadata sufficient for the size gate and batch loop.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub id: FileId,
    pub name: String,
    pub size: u64,
}

/// Raw file content plus detected MIME type.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Hierarchical file store primitives.
///
/// Child enumeration order must be deterministic; where two siblings
/// share a name the first in enumeration order wins.
pub trait FileStore: Send + Sync {
    /// Identifier of the hierarchy root.
    fn root(&self) -> FolderId;

    /// Bare name of a folder (the root's name is implementation-defined
    /// and never appears in published paths).
    fn folder_name(&self, folder: &FolderId) -> Result<String, StorageError>;

    /// Parent folder, or `None` for the root.
    fn parent(&self, folder: &FolderId) -> Result<Option<FolderId>, StorageError>;

    /// Child folders in deterministic name order.
    fn child_folders(&self, folder: &FolderId) -> Result<Vec<FolderHandle>, StorageError>;

    /// Files directly inside a folder, in deterministic name order.
    fn files_in(&self, folder: &FolderId) -> Result<Vec<FileMeta>, StorageError>;

    /// Raw bytes and MIME type of a file.
    fn read_file(&self, file: &FileId) -> Result<FileContent, StorageError>;

    /// Rename a file in place. Returns the file's identifier after the
    /// rename (identifiers may be path-derived).
    fn rename_file(&self, file: &FileId, new_name: &str) -> Result<FileId, StorageError>;

    /// Move a file into another folder, keeping its name.
    fn move_file(&self, file: &FileId, dest: &FolderId) -> Result<FileId, StorageError>;

    /// Create a child folder if absent; returns the existing folder's
    /// identifier when one with that name is already there.
    fn create_folder(&self, parent: &FolderId, name: &str) -> Result<FolderId, StorageError>;
}
