//! Destination resolution for classified files.
//!
//! A suggested path is accepted if the folder cache contains it
//! verbatim, or if a live segment-by-segment walk from the root finds
//! it despite a stale cache. Accepted paths are then materialized with
//! an idempotent create-if-absent walk, which also covers a
//! removed-and-recreated race between the live check and the move.
//! Anything else is genuinely unknown: the caller defers the file and
//! requests a rescan instead of guessing or creating an unreviewed
//! folder tree.

use std::sync::Arc;

use tracing::debug;

use crate::storage::{FileStore, FolderId, StorageError};

/// Outcome of validating a suggested destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Destination exists (or was materialized); safe to move into.
    Accepted(FolderId),
    /// Destination absent from both cache and live tree.
    Unknown,
}

pub struct DestinationResolver {
    store: Arc<dyn FileStore>,
}

impl DestinationResolver {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    /// Validate `suggested` against the cache and the live tree.
    pub fn resolve(
        &self,
        suggested: &str,
        cache: &[String],
    ) -> Result<Resolution, StorageError> {
        if cache.iter().any(|p| p == suggested) {
            return Ok(Resolution::Accepted(self.materialize(suggested)?));
        }

        // The cache may be stale; check the live tree before giving up.
        if self.walk_existing(suggested)?.is_some() {
            debug!(path = suggested, "destination found live but missing from cache");
            return Ok(Resolution::Accepted(self.materialize(suggested)?));
        }

        Ok(Resolution::Unknown)
    }

    /// Create every missing segment of `path` and return the final
    /// folder. Create-if-absent per segment makes repeated resolution
    /// of the same path reuse the same folders.
    pub fn materialize(&self, path: &str) -> Result<FolderId, StorageError> {
        let mut current = self.store.root();
        for segment in segments(path) {
            current = self.store.create_folder(&current, segment)?;
        }
        Ok(current)
    }

    /// Follow existing child folders segment by segment without
    /// creating anything. Same-named siblings resolve to the first in
    /// enumeration order.
    fn walk_existing(&self, path: &str) -> Result<Option<FolderId>, StorageError> {
        let mut current = self.store.root();
        for segment in segments(path) {
            let children = self.store.child_folders(&current)?;
            match children.into_iter().find(|c| c.name == segment) {
                Some(child) => current = child.id,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
