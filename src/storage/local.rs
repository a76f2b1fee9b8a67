//! Local-filesystem implementation of the file store.
//!
//! Identifiers are root-relative `/`-separated paths; the root itself is
//! the empty string. Child enumeration is sorted by name so traversal
//! order (and the same-named-sibling tie-break) is deterministic.

use std::fs;
use std::path::{Path, PathBuf};

use super::{FileContent, FileId, FileMeta, FileStore, FolderHandle, FolderId, StorageError};

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn io_err(path: &Path, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    fn folder_path(&self, folder: &FolderId) -> PathBuf {
        if folder.0.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&folder.0)
        }
    }

    fn file_path(&self, file: &FileId) -> PathBuf {
        self.root.join(&file.0)
    }

    fn join_id(parent: &str, name: &str) -> String {
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent, name)
        }
    }
}

impl FileStore for LocalFileStore {
    fn root(&self) -> FolderId {
        FolderId(String::new())
    }

    fn folder_name(&self, folder: &FolderId) -> Result<String, StorageError> {
        if folder.0.is_empty() {
            return Ok(String::new());
        }
        Ok(folder
            .0
            .rsplit('/')
            .next()
            .unwrap_or(folder.0.as_str())
            .to_string())
    }

    fn parent(&self, folder: &FolderId) -> Result<Option<FolderId>, StorageError> {
        if folder.0.is_empty() {
            return Ok(None);
        }
        match folder.0.rsplit_once('/') {
            Some((parent, _)) => Ok(Some(FolderId(parent.to_string()))),
            None => Ok(Some(FolderId(String::new()))),
        }
    }

    fn child_folders(&self, folder: &FolderId) -> Result<Vec<FolderHandle>, StorageError> {
        let path = self.folder_path(folder);
        let mut children = Vec::new();
        let entries = fs::read_dir(&path).map_err(|e| Self::io_err(&path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Self::io_err(&path, e))?;
            let file_type = entry.file_type().map_err(|e| Self::io_err(&path, e))?;
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            children.push(FolderHandle {
                id: FolderId(Self::join_id(&folder.0, &name)),
                name,
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    fn files_in(&self, folder: &FolderId) -> Result<Vec<FileMeta>, StorageError> {
        let path = self.folder_path(folder);
        let mut files = Vec::new();
        let entries = fs::read_dir(&path).map_err(|e| Self::io_err(&path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Self::io_err(&path, e))?;
            let file_type = entry.file_type().map_err(|e| Self::io_err(&path, e))?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().map_err(|e| Self::io_err(&path, e))?;
            files.push(FileMeta {
                id: FileId(Self::join_id(&folder.0, &name)),
                name,
                size: metadata.len(),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn read_file(&self, file: &FileId) -> Result<FileContent, StorageError> {
        let path = self.file_path(file);
        let bytes = fs::read(&path).map_err(|e| Self::io_err(&path, e))?;
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();
        Ok(FileContent { bytes, mime_type })
    }

    fn rename_file(&self, file: &FileId, new_name: &str) -> Result<FileId, StorageError> {
        let path = self.file_path(file);
        let new_path = path
            .parent()
            .unwrap_or(&self.root)
            .join(new_name);
        fs::rename(&path, &new_path).map_err(|e| Self::io_err(&path, e))?;
        let parent_id = match file.0.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        };
        Ok(FileId(Self::join_id(&parent_id, new_name)))
    }

    fn move_file(&self, file: &FileId, dest: &FolderId) -> Result<FileId, StorageError> {
        let path = self.file_path(file);
        let name = path
            .file_name()
            .ok_or_else(|| StorageError::NotFound(file.0.clone()))?
            .to_string_lossy()
            .to_string();
        let dest_path = self.folder_path(dest).join(&name);
        fs::rename(&path, &dest_path).map_err(|e| Self::io_err(&path, e))?;
        Ok(FileId(Self::join_id(&dest.0, &name)))
    }

    fn create_folder(&self, parent: &FolderId, name: &str) -> Result<FolderId, StorageError> {
        let id = FolderId(Self::join_id(&parent.0, name));
        let path = self.folder_path(&id);
        if path.is_dir() {
            return Ok(id);
        }
        fs::create_dir(&path).map_err(|e| Self::io_err(&path, e))?;
        Ok(id)
    }
}
