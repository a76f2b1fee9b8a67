//! Resumable folder-tree indexer.
//!
//! Walks the whole hierarchy across many independently scheduled,
//! time-boxed invocations. Traversal state is an explicit LIFO stack
//! serialized to the state store, never recursion: resumability depends
//! on the stack being externally representable. When the per-pass time
//! budget runs out the indexer checkpoints and schedules its own
//! continuation; when the stack empties it publishes the folder cache
//! wholesale and clears the checkpoint.

pub mod blacklist;

pub use blacklist::BlacklistFilter;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::schedule::{Scheduler, TriggerHandle};
use crate::state::{self, keys, StateError, StateStore};
use crate::storage::{FileStore, FolderId, StorageError};

/// Folders processed between elapsed-time checks. Checking after every
/// folder would spend more time on the clock than on the tree.
const TIME_CHECK_INTERVAL: usize = 10;

/// Delay before a scheduled continuation resumes the scan.
const CONTINUATION_DELAY: Duration = Duration::from_secs(10);

/// A scan in progress longer than this with no live continuation is
/// considered stalled and may be cleared by the pipeline.
pub const STALL_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// Folders whose name starts with this marker are never indexed.
const HIDDEN_MARKER: char = '.';

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no active scan to continue")]
    NoActiveScan,
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result of one scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Traversal exhausted; the folder cache was published.
    Completed { folder_count: usize },
    /// Time budget consumed; checkpoint persisted and continuation
    /// scheduled.
    Checkpointed { pending: usize },
}

/// Observed checkpoint state, as read by the pipeline's guard sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Active {
        started_at_ms: i64,
        trigger: Option<TriggerHandle>,
    },
}

pub struct FolderIndexer {
    store: Arc<dyn FileStore>,
    state: Arc<dyn StateStore>,
    scheduler: Arc<dyn Scheduler>,
    blacklist: BlacklistFilter,
    source_folder: String,
    time_budget: Duration,
}

impl FolderIndexer {
    pub fn new(
        store: Arc<dyn FileStore>,
        state: Arc<dyn StateStore>,
        scheduler: Arc<dyn Scheduler>,
        blacklist: BlacklistFilter,
        source_folder: String,
        time_budget: Duration,
    ) -> Self {
        Self {
            store,
            state,
            scheduler,
            blacklist,
            source_folder,
            time_budget,
        }
    }

    /// Discard any existing checkpoint and begin a fresh depth-first
    /// traversal from the root.
    pub fn start_scan(&self) -> Result<ScanOutcome, ScanError> {
        self.clear_scan_state()?;

        state::set_json(self.state.as_ref(), keys::SCAN_STACK, &vec![self.store.root()])?;
        state::set_json(self.state.as_ref(), keys::SCAN_FOUND_PATHS, &Vec::<String>::new())?;
        state::set_json(self.state.as_ref(), keys::SCAN_IN_PROGRESS, &true)?;
        state::set_json(
            self.state.as_ref(),
            keys::SCAN_STARTED_AT,
            &Utc::now().timestamp_millis(),
        )?;

        info!("starting folder scan");
        self.run_pass()
    }

    /// Resume from the persisted checkpoint.
    pub fn continue_scan(&self) -> Result<ScanOutcome, ScanError> {
        let in_progress: bool =
            state::get_json(self.state.as_ref(), keys::SCAN_IN_PROGRESS)?.unwrap_or(false);
        if !in_progress {
            return Err(ScanError::NoActiveScan);
        }
        self.run_pass()
    }

    /// Current checkpoint state.
    pub fn status(&self) -> Result<ScanStatus, ScanError> {
        let in_progress: bool =
            state::get_json(self.state.as_ref(), keys::SCAN_IN_PROGRESS)?.unwrap_or(false);
        if !in_progress {
            return Ok(ScanStatus::Idle);
        }
        let started_at_ms: i64 =
            state::get_json(self.state.as_ref(), keys::SCAN_STARTED_AT)?.unwrap_or(0);
        let trigger: Option<TriggerHandle> =
            state::get_json(self.state.as_ref(), keys::SCAN_TRIGGER_ID)?;
        Ok(ScanStatus::Active {
            started_at_ms,
            trigger,
        })
    }

    /// Whether the active scan has been running past the stall
    /// threshold with no live continuation. A lost continuation chain
    /// would otherwise block the pipeline forever.
    pub fn is_stalled(&self) -> Result<bool, ScanError> {
        match self.status()? {
            ScanStatus::Idle => Ok(false),
            ScanStatus::Active {
                started_at_ms,
                trigger,
            } => {
                let elapsed_ms = Utc::now().timestamp_millis().saturating_sub(started_at_ms);
                if elapsed_ms < STALL_THRESHOLD.as_millis() as i64 {
                    return Ok(false);
                }
                let live = trigger
                    .map(|t| self.scheduler.is_scheduled(&t))
                    .unwrap_or(false);
                Ok(!live)
            }
        }
    }

    /// Drop the checkpoint and cancel any pending continuation. The
    /// published folder cache is left untouched.
    pub fn clear_scan_state(&self) -> Result<(), ScanError> {
        if let Some(trigger) =
            state::get_json::<TriggerHandle>(self.state.as_ref(), keys::SCAN_TRIGGER_ID)?
        {
            self.scheduler.cancel(&trigger);
        }
        self.state.delete(keys::SCAN_STACK)?;
        self.state.delete(keys::SCAN_FOUND_PATHS)?;
        self.state.delete(keys::SCAN_IN_PROGRESS)?;
        self.state.delete(keys::SCAN_STARTED_AT)?;
        self.state.delete(keys::SCAN_TRIGGER_ID)?;
        Ok(())
    }

    /// Age check against the published cache timestamp. An absent or
    /// unparseable timestamp counts as stale.
    pub fn cache_is_stale(&self, max_age: Duration) -> Result<bool, ScanError> {
        let raw = match self.state.get_raw(keys::FOLDER_CACHE_UPDATED_AT)? {
            Some(raw) => raw,
            None => return Ok(true),
        };
        let updated = match chrono::NaiveDateTime::parse_from_str(&raw, CACHE_TIMESTAMP_FORMAT) {
            Ok(dt) => dt.and_utc(),
            Err(_) => return Ok(true),
        };
        let age = Utc::now().signed_duration_since(updated);
        Ok(age.num_milliseconds() >= max_age.as_millis() as i64)
    }

    fn run_pass(&self) -> Result<ScanOutcome, ScanError> {
        let outcome = self.walk();
        if let Err(e) = &outcome {
            // A failed rescan never corrupts the last good cache: drop
            // the checkpoint and let the next scheduled invocation
            // start over.
            error!(error = %e, "scan pass failed, clearing checkpoint");
            if let Err(clear_err) = self.clear_scan_state() {
                error!(error = %clear_err, "failed to clear scan state after error");
            }
        }
        outcome
    }

    fn walk(&self) -> Result<ScanOutcome, ScanError> {
        let mut stack: Vec<FolderId> =
            state::get_json(self.state.as_ref(), keys::SCAN_STACK)?
                .ok_or(ScanError::NoActiveScan)?;
        let mut found: Vec<String> =
            state::get_json(self.state.as_ref(), keys::SCAN_FOUND_PATHS)?.unwrap_or_default();

        let pass_started = Instant::now();
        let mut processed = 0usize;

        while let Some(folder) = stack.pop() {
            let path = self.absolute_path(&folder)?;

            // The root records as the empty path and is excluded from
            // the published cache; it is never blacklisted.
            if !path.is_empty() {
                let name = self.store.folder_name(&folder)?;
                if self.blacklist.is_excluded(&name, &path) {
                    debug!(path = %path, "blacklisted, pruning subtree");
                    continue;
                }
                found.push(path);
            }

            for child in self.store.child_folders(&folder)? {
                if child.name == self.source_folder || child.name.starts_with(HIDDEN_MARKER) {
                    continue;
                }
                stack.push(child.id);
            }

            processed += 1;
            if processed % TIME_CHECK_INTERVAL == 0
                && !stack.is_empty()
                && pass_started.elapsed() >= self.time_budget
            {
                return self.checkpoint(stack, found);
            }
        }

        self.publish(found)
    }

    fn checkpoint(
        &self,
        stack: Vec<FolderId>,
        found: Vec<String>,
    ) -> Result<ScanOutcome, ScanError> {
        state::set_json(self.state.as_ref(), keys::SCAN_STACK, &stack)?;
        state::set_json(self.state.as_ref(), keys::SCAN_FOUND_PATHS, &found)?;

        // At most one continuation per scan: the trigger from the
        // previous checkpoint may still be live when this pass was
        // invoked some other way.
        if let Some(previous) =
            state::get_json::<TriggerHandle>(self.state.as_ref(), keys::SCAN_TRIGGER_ID)?
        {
            self.scheduler.cancel(&previous);
        }

        let trigger = self.scheduler.schedule_once(CONTINUATION_DELAY);
        state::set_json(self.state.as_ref(), keys::SCAN_TRIGGER_ID, &trigger)?;

        debug!(
            pending = stack.len(),
            found = found.len(),
            "time budget consumed, checkpointed scan"
        );
        Ok(ScanOutcome::Checkpointed {
            pending: stack.len(),
        })
    }

    fn publish(&self, found: Vec<String>) -> Result<ScanOutcome, ScanError> {
        state::set_json(self.state.as_ref(), keys::FOLDER_CACHE, &found)?;
        self.state.set_raw(
            keys::FOLDER_CACHE_UPDATED_AT,
            &Utc::now().format(CACHE_TIMESTAMP_FORMAT).to_string(),
        )?;
        self.clear_scan_state()?;

        info!(folders = found.len(), "folder cache published");
        Ok(ScanOutcome::Completed {
            folder_count: found.len(),
        })
    }

    /// Absolute path of a folder, computed by walking parent links to
    /// the root. The root itself is the empty path.
    fn absolute_path(&self, folder: &FolderId) -> Result<String, ScanError> {
        let mut segments = Vec::new();
        let mut current = folder.clone();
        while let Some(parent) = self.store.parent(&current)? {
            segments.push(self.store.folder_name(&current)?);
            current = parent;
        }
        if segments.is_empty() {
            return Ok(String::new());
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }
}

const CACHE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use crate::storage::LocalFileStore;
    use crate::testutil::RecordingScheduler;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn indexer_for(
        root: &std::path::Path,
        state: Arc<dyn StateStore>,
        scheduler: Arc<RecordingScheduler>,
        blacklist: Vec<String>,
        budget: Duration,
    ) -> FolderIndexer {
        FolderIndexer::new(
            Arc::new(LocalFileStore::new(root.to_path_buf())),
            state,
            scheduler,
            BlacklistFilter::new(blacklist),
            "Inbox".to_string(),
            budget,
        )
    }

    fn cached_paths(state: &dyn StateStore) -> BTreeSet<String> {
        state::get_json::<Vec<String>>(state, keys::FOLDER_CACHE)
            .unwrap()
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    fn small_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("A/B")).unwrap();
        fs::create_dir(dir.path().join("A/C")).unwrap();
        dir
    }

    #[test]
    fn test_scan_small_tree() {
        let dir = small_tree();
        let state = Arc::new(MemoryStateStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let indexer = indexer_for(
            dir.path(),
            state.clone(),
            scheduler,
            vec![],
            Duration::from_secs(60),
        );

        let outcome = indexer.start_scan().unwrap();
        assert_eq!(outcome, ScanOutcome::Completed { folder_count: 3 });

        let expected: BTreeSet<String> = ["/A", "/A/B", "/A/C"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(cached_paths(state.as_ref()), expected);
        assert_eq!(indexer.status().unwrap(), ScanStatus::Idle);
    }

    #[test]
    fn test_blacklist_prunes_subtree() {
        let dir = small_tree();
        fs::create_dir(dir.path().join("A/C/Deep")).unwrap();
        let state = Arc::new(MemoryStateStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let indexer = indexer_for(
            dir.path(),
            state.clone(),
            scheduler,
            vec!["A/C".to_string()],
            Duration::from_secs(60),
        );

        indexer.start_scan().unwrap();

        let expected: BTreeSet<String> =
            ["/A", "/A/B"].iter().map(|s| s.to_string()).collect();
        assert_eq!(cached_paths(state.as_ref()), expected);
    }

    #[test]
    fn test_source_and_hidden_folders_skipped() {
        let dir = small_tree();
        fs::create_dir(dir.path().join("Inbox")).unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        let state = Arc::new(MemoryStateStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let indexer = indexer_for(
            dir.path(),
            state.clone(),
            scheduler,
            vec![],
            Duration::from_secs(60),
        );

        indexer.start_scan().unwrap();

        let cached = cached_paths(state.as_ref());
        assert!(!cached.contains("/Inbox"));
        assert!(!cached.contains("/.hidden"));
        assert_eq!(cached.len(), 3);
    }

    #[test]
    fn test_zero_budget_resumes_to_same_cache() {
        // Enough folders to force several checkpoints at a zero budget.
        let dir = TempDir::new().unwrap();
        for top in ["Docs", "Media", "Work"] {
            for i in 0..12 {
                fs::create_dir_all(dir.path().join(format!("{}/sub{:02}", top, i))).unwrap();
            }
        }

        let unbounded_state = Arc::new(MemoryStateStore::new());
        let indexer = indexer_for(
            dir.path(),
            unbounded_state.clone(),
            Arc::new(RecordingScheduler::new()),
            vec![],
            Duration::from_secs(600),
        );
        assert!(matches!(
            indexer.start_scan().unwrap(),
            ScanOutcome::Completed { .. }
        ));
        let expected = cached_paths(unbounded_state.as_ref());

        let state = Arc::new(MemoryStateStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let indexer = indexer_for(
            dir.path(),
            state.clone(),
            scheduler.clone(),
            vec![],
            Duration::ZERO,
        );

        let mut outcome = indexer.start_scan().unwrap();
        let mut passes = 1;
        while let ScanOutcome::Checkpointed { .. } = outcome {
            outcome = indexer.continue_scan().unwrap();
            passes += 1;
            assert!(passes < 100, "scan did not converge");
        }

        assert!(passes > 1, "zero budget should have checkpointed");
        assert_eq!(cached_paths(state.as_ref()), expected);
        assert_eq!(indexer.status().unwrap(), ScanStatus::Idle);
        // Completion cancels the last scheduled continuation.
        assert!(!scheduler.any_live());
    }

    #[test]
    fn test_checkpoint_replaces_pending_trigger() {
        let dir = TempDir::new().unwrap();
        for i in 0..25 {
            fs::create_dir(dir.path().join(format!("F{:02}", i))).unwrap();
        }
        let state = Arc::new(MemoryStateStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let indexer = indexer_for(
            dir.path(),
            state,
            scheduler.clone(),
            vec![],
            Duration::ZERO,
        );

        assert!(matches!(
            indexer.start_scan().unwrap(),
            ScanOutcome::Checkpointed { .. }
        ));
        assert!(matches!(
            indexer.continue_scan().unwrap(),
            ScanOutcome::Checkpointed { .. }
        ));

        // The second checkpoint cancels the first continuation instead
        // of leaving it live alongside its own.
        assert_eq!(scheduler.live_count(), 1);
    }

    #[test]
    fn test_completeness_each_folder_once() {
        let dir = TempDir::new().unwrap();
        for i in 0..15 {
            fs::create_dir_all(dir.path().join(format!("T{:02}/child", i))).unwrap();
        }
        let state = Arc::new(MemoryStateStore::new());
        let indexer = indexer_for(
            dir.path(),
            state.clone(),
            Arc::new(RecordingScheduler::new()),
            vec![],
            Duration::ZERO,
        );

        let mut outcome = indexer.start_scan().unwrap();
        while let ScanOutcome::Checkpointed { .. } = outcome {
            outcome = indexer.continue_scan().unwrap();
        }

        let listed: Vec<String> =
            state::get_json(state.as_ref(), keys::FOLDER_CACHE).unwrap().unwrap();
        let unique: BTreeSet<&String> = listed.iter().collect();
        assert_eq!(listed.len(), unique.len(), "paths recorded more than once");
        assert_eq!(listed.len(), 30);
    }

    #[test]
    fn test_continue_without_scan_errors() {
        let dir = small_tree();
        let state = Arc::new(MemoryStateStore::new());
        let indexer = indexer_for(
            dir.path(),
            state,
            Arc::new(RecordingScheduler::new()),
            vec![],
            Duration::from_secs(60),
        );

        assert!(matches!(
            indexer.continue_scan(),
            Err(ScanError::NoActiveScan)
        ));
    }

    #[test]
    fn test_failed_scan_preserves_previous_cache() {
        let dir = small_tree();
        let state = Arc::new(MemoryStateStore::new());
        let indexer = indexer_for(
            dir.path(),
            state.clone(),
            Arc::new(RecordingScheduler::new()),
            vec![],
            Duration::from_secs(60),
        );
        indexer.start_scan().unwrap();
        let good_cache = cached_paths(state.as_ref());

        // A store rooted at a missing directory makes the next pass fail.
        let broken = indexer_for(
            &dir.path().join("does-not-exist"),
            state.clone(),
            Arc::new(RecordingScheduler::new()),
            vec![],
            Duration::from_secs(60),
        );
        assert!(broken.start_scan().is_err());

        assert_eq!(cached_paths(state.as_ref()), good_cache);
        assert_eq!(broken.status().unwrap(), ScanStatus::Idle);
    }

    #[test]
    fn test_stall_detection() {
        let dir = small_tree();
        let state = Arc::new(MemoryStateStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let indexer = indexer_for(
            dir.path(),
            state.clone(),
            scheduler,
            vec![],
            Duration::from_secs(60),
        );

        // Fake a scan that started 31 minutes ago with no trigger.
        state::set_json(state.as_ref(), keys::SCAN_IN_PROGRESS, &true).unwrap();
        let started = Utc::now().timestamp_millis() - 31 * 60 * 1000;
        state::set_json(state.as_ref(), keys::SCAN_STARTED_AT, &started).unwrap();

        assert!(indexer.is_stalled().unwrap());

        // Recent scans are not stalled.
        state::set_json(
            state.as_ref(),
            keys::SCAN_STARTED_AT,
            &Utc::now().timestamp_millis(),
        )
        .unwrap();
        assert!(!indexer.is_stalled().unwrap());
    }

    #[test]
    fn test_cache_staleness() {
        let dir = small_tree();
        let state = Arc::new(MemoryStateStore::new());
        let indexer = indexer_for(
            dir.path(),
            state.clone(),
            Arc::new(RecordingScheduler::new()),
            vec![],
            Duration::from_secs(60),
        );

        // No cache yet: stale.
        assert!(indexer.cache_is_stale(Duration::from_secs(3600)).unwrap());

        indexer.start_scan().unwrap();
        assert!(!indexer.cache_is_stale(Duration::from_secs(3600)).unwrap());
        assert!(indexer.cache_is_stale(Duration::ZERO).unwrap());
    }
}
