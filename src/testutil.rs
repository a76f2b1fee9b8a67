//! Shared test doubles for the capability traits.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::ai::credentials::{CredentialError, CredentialStore};
use crate::ai::{BackendError, ClassificationBackend, ClassifyRequest};
use crate::pipeline::lock::{LockGuard, PipelineLock};
use crate::schedule::{Scheduler, TriggerHandle};

/// Scheduler that records trigger activity instead of spawning tasks.
/// Tests drive continuations by calling `continue_scan` directly.
#[derive(Default)]
pub struct RecordingScheduler {
    live: Mutex<HashSet<String>>,
    counter: Mutex<u64>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any_live(&self) -> bool {
        !self.live.lock().unwrap().is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule_once(&self, _delay: Duration) -> TriggerHandle {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        let id = format!("trigger-{}", counter);
        self.live.lock().unwrap().insert(id.clone());
        TriggerHandle(id)
    }

    fn cancel(&self, handle: &TriggerHandle) {
        self.live.lock().unwrap().remove(&handle.0);
    }

    fn is_scheduled(&self, handle: &TriggerHandle) -> bool {
        self.live.lock().unwrap().contains(&handle.0)
    }
}

/// Backend that replays queued replies and records call times.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: Result<String, BackendError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait::async_trait]
impl ClassificationBackend for ScriptedBackend {
    fn provider(&self) -> &'static str {
        "anthropic"
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<String, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.file_name.clone()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(BackendError::Api {
                    status: 599,
                    message: "no scripted reply".to_string(),
                })
            })
    }
}

/// In-process advisory lock.
#[derive(Default)]
pub struct MemoryLock {
    held: Arc<AtomicBool>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryLockGuard {
    held: Arc<AtomicBool>,
}

impl LockGuard for MemoryLockGuard {}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

impl PipelineLock for MemoryLock {
    fn try_acquire(&self) -> Option<Box<dyn LockGuard>> {
        if self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(Box::new(MemoryLockGuard {
                held: Arc::clone(&self.held),
            }))
        } else {
            None
        }
    }
}

/// Credential store with a fixed key.
pub struct StaticCredentials(pub String);

impl Default for StaticCredentials {
    fn default() -> Self {
        Self("test-api-key".to_string())
    }
}

impl CredentialStore for StaticCredentials {
    fn api_key(&self, _provider: &str) -> Result<String, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Credential store with no keys at all.
pub struct NoCredentials;

impl CredentialStore for NoCredentials {
    fn api_key(&self, provider: &str) -> Result<String, CredentialError> {
        Err(CredentialError::NotFound(provider.to_string()))
    }
}
