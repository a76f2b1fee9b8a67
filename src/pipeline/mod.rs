//! Batched, rate-limited, lock-guarded organization pipeline.
//!
//! Each invocation processes at most one batch of files from the
//! source folder: guard sequence first (yield to the indexer, advisory
//! lock, cache and source-folder checks), then one classification call
//! and move per file. Files are independent; one failure never stops
//! the batch, and no failure may stop future invocations.

pub mod lock;
pub mod resolver;

pub use lock::{FileLock, LockGuard, PipelineLock};
pub use resolver::{DestinationResolver, Resolution};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ai::credentials::{CredentialError, CredentialStore};
use crate::ai::{prompts, response, BackendError, ClassificationBackend, ClassifyRequest};
use crate::indexer::{FolderIndexer, ScanError, ScanStatus};
use crate::state::{self, keys, StateError, StateStore};
use crate::storage::{FileMeta, FileStore, FolderId, StorageError};

/// Static pipeline configuration, read at invocation start.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Name of the watched source folder under the root.
    pub source_folder: String,
    /// Maximum files processed per invocation.
    pub batch_size: usize,
    /// Files above this size are skipped without a backend call.
    pub max_size_mb: u64,
    /// Minimum spacing between outbound classification calls.
    pub min_call_spacing: Duration,
    /// Delay between files within a batch.
    pub inter_file_delay: Duration,
}

/// Why a pipeline invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A scan is active and not stalled; this run yielded to it.
    IndexerActive,
    /// Another pipeline invocation holds the advisory lock.
    LockBusy,
    /// No folder cache published yet; nothing to classify against.
    NoCache,
    /// The source folder is empty.
    NoFiles,
    /// A batch was processed.
    Processed(BatchStats),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub moved: usize,
    pub skipped: usize,
    pub deferred: usize,
    pub failed: usize,
}

/// Per-file result kinds the batch loop decides on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileOutcome {
    Moved {
        new_name: String,
        destination: String,
    },
    TooLarge,
    Deferred {
        destination: String,
    },
}

#[derive(Debug, Error)]
enum FileError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("content read failed: {0}")]
    Read(StorageError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("destination resolution failed: {0}")]
    Resolve(StorageError),
    #[error("move failed: {0}")]
    Move(StorageError),
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("source folder {0:?} not found under root")]
    SourceFolderMissing(String),
}

pub struct OrganizationPipeline {
    store: Arc<dyn FileStore>,
    state: Arc<dyn StateStore>,
    backend: Arc<dyn ClassificationBackend>,
    credentials: Arc<dyn CredentialStore>,
    lock: Arc<dyn PipelineLock>,
    indexer: Arc<FolderIndexer>,
    resolver: DestinationResolver,
    config: PipelineConfig,
}

impl OrganizationPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn FileStore>,
        state: Arc<dyn StateStore>,
        backend: Arc<dyn ClassificationBackend>,
        credentials: Arc<dyn CredentialStore>,
        lock: Arc<dyn PipelineLock>,
        indexer: Arc<FolderIndexer>,
        config: PipelineConfig,
    ) -> Self {
        let resolver = DestinationResolver::new(Arc::clone(&store));
        Self {
            store,
            state,
            backend,
            credentials,
            lock,
            indexer,
            resolver,
            config,
        }
    }

    /// One pipeline invocation.
    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        match self.indexer.status()? {
            ScanStatus::Idle => {}
            ScanStatus::Active { .. } => {
                if self.indexer.is_stalled()? {
                    warn!("scan stalled past threshold, clearing checkpoint");
                    self.indexer.clear_scan_state()?;
                } else {
                    debug!("indexing in progress, yielding this run");
                    return Ok(RunOutcome::IndexerActive);
                }
            }
        }

        let Some(_guard) = self.lock.try_acquire() else {
            return Ok(RunOutcome::LockBusy);
        };

        let Some(cache) =
            state::get_json::<Vec<String>>(self.state.as_ref(), keys::FOLDER_CACHE)?
        else {
            debug!("no folder cache published yet, skipping run");
            return Ok(RunOutcome::NoCache);
        };

        let source = self.source_folder()?;
        let files = self.store.files_in(&source)?;
        if files.is_empty() {
            return Ok(RunOutcome::NoFiles);
        }

        let mut stats = BatchStats::default();
        for (i, file) in files.iter().take(self.config.batch_size).enumerate() {
            if i > 0 {
                // Smooth the outbound request rate across the batch.
                tokio::time::sleep(self.config.inter_file_delay).await;
            }
            match self.process_file(file, &cache).await {
                Ok(FileOutcome::Moved {
                    new_name,
                    destination,
                }) => {
                    info!(
                        file = %file.name,
                        new_name = %new_name,
                        destination = %destination,
                        "file organized"
                    );
                    stats.moved += 1;
                }
                Ok(FileOutcome::TooLarge) => {
                    warn!(
                        file = %file.name,
                        size = file.size,
                        max_mb = self.config.max_size_mb,
                        "file exceeds size limit, skipping"
                    );
                    stats.skipped += 1;
                }
                Ok(FileOutcome::Deferred { destination }) => {
                    info!(
                        file = %file.name,
                        destination = %destination,
                        "destination unknown, rescan requested, file deferred"
                    );
                    stats.deferred += 1;
                }
                Err(e) => {
                    warn!(file = %file.name, error = %e, "file left in place for retry");
                    stats.failed += 1;
                }
            }
        }

        Ok(RunOutcome::Processed(stats))
    }

    fn source_folder(&self) -> Result<FolderId, PipelineError> {
        let root = self.store.root();
        self.store
            .child_folders(&root)?
            .into_iter()
            .find(|c| c.name == self.config.source_folder)
            .map(|c| c.id)
            .ok_or_else(|| PipelineError::SourceFolderMissing(self.config.source_folder.clone()))
    }

    async fn process_file(
        &self,
        file: &FileMeta,
        cache: &[String],
    ) -> Result<FileOutcome, FileError> {
        let max_bytes = self.config.max_size_mb * 1024 * 1024;
        if file.size > max_bytes {
            return Ok(FileOutcome::TooLarge);
        }

        // Credential presence check before any waiting or reading:
        // without a key the file cannot be classified at all.
        self.credentials.api_key(self.backend.provider())?;

        self.pace_call().await?;

        let content = self.store.read_file(&file.id).map_err(FileError::Read)?;
        let request = ClassifyRequest {
            prompt: prompts::build_classification_prompt(&file.name, cache),
            file_name: file.name.clone(),
            mime_type: content.mime_type,
            content: content.bytes,
        };

        let call_result = self.backend.classify(&request).await;
        // The spacing timestamp advances on every attempt, success or
        // failure, so a failing backend is still throttled.
        state::set_json(
            self.state.as_ref(),
            keys::LAST_CLASSIFY_AT,
            &Utc::now().timestamp_millis(),
        )?;
        let raw = call_result?;

        let result = response::parse_classification(&raw, &file.name);

        let destination = if result.destination_folder == response::FALLBACK_FOLDER {
            // The fallback bucket is system-chosen, not model-guessed,
            // so it is materialized directly instead of deferred.
            self.resolver
                .materialize(response::FALLBACK_FOLDER)
                .map_err(FileError::Resolve)?
        } else {
            match self
                .resolver
                .resolve(&result.destination_folder, cache)
                .map_err(FileError::Resolve)?
            {
                Resolution::Accepted(id) => id,
                Resolution::Unknown => {
                    if let Err(e) = self.indexer.start_scan() {
                        warn!(error = %e, "rescan request failed");
                    }
                    return Ok(FileOutcome::Deferred {
                        destination: result.destination_folder,
                    });
                }
            }
        };

        let id = if result.new_filename != file.name {
            self.store
                .rename_file(&file.id, &result.new_filename)
                .map_err(FileError::Move)?
        } else {
            file.id.clone()
        };
        self.store.move_file(&id, &destination).map_err(FileError::Move)?;

        Ok(FileOutcome::Moved {
            new_name: result.new_filename,
            destination: result.destination_folder,
        })
    }

    /// Enforce minimum spacing between outbound classification calls,
    /// measured against the persisted timestamp of the last attempt.
    async fn pace_call(&self) -> Result<(), FileError> {
        let last: Option<i64> = state::get_json(self.state.as_ref(), keys::LAST_CLASSIFY_AT)?;
        if let Some(last) = last {
            let elapsed = Utc::now().timestamp_millis().saturating_sub(last);
            let min = self.config.min_call_spacing.as_millis() as i64;
            if elapsed < min {
                // Epoch timestamps are truncated to whole milliseconds,
                // so sleep one extra to never undershoot the minimum.
                tokio::time::sleep(Duration::from_millis((min - elapsed) as u64 + 1)).await;
            }
        }
        Ok(())
    }
}
