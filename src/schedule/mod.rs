//! Scheduler capability for continuation triggers.
//!
//! The indexer never blocks across its time budget; it requests a
//! one-shot future invocation and returns. The production scheduler
//! delivers wakeups to the service loop over a channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

/// Opaque handle for a scheduled one-shot trigger. Serialized into the
/// scan checkpoint so a later invocation can tell whether a
/// continuation is still live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerHandle(pub String);

/// Events delivered to the service loop by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// Resume a checkpointed folder scan.
    ContinueScan,
}

pub trait Scheduler: Send + Sync {
    /// Schedule a one-shot wakeup after `delay`.
    fn schedule_once(&self, delay: Duration) -> TriggerHandle;

    /// Cancel a pending trigger. Cancelling an already-fired or unknown
    /// handle is a no-op.
    fn cancel(&self, handle: &TriggerHandle);

    /// Whether the trigger is still pending (not yet fired or cancelled).
    fn is_scheduled(&self, handle: &TriggerHandle) -> bool;
}

/// Tokio-backed scheduler: each trigger is a sleep task that sends a
/// [`Wakeup`] to the service loop, then forgets itself.
pub struct TokioScheduler {
    tx: UnboundedSender<Wakeup>,
    pending: Arc<Mutex<HashMap<String, tokio::task::JoinHandle<()>>>>,
}

impl TokioScheduler {
    pub fn new(tx: UnboundedSender<Wakeup>) -> Self {
        Self {
            tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration) -> TriggerHandle {
        let id = Uuid::new_v4().to_string();
        let tx = self.tx.clone();
        let pending = Arc::clone(&self.pending);
        let task_id = id.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Deregister before sending so a stall check that races the
            // wakeup sees the trigger as no longer live.
            pending.lock().unwrap().remove(&task_id);
            if tx.send(Wakeup::ContinueScan).is_err() {
                debug!("service loop gone, dropping continuation wakeup");
            }
        });

        self.pending.lock().unwrap().insert(id.clone(), task);
        TriggerHandle(id)
    }

    fn cancel(&self, handle: &TriggerHandle) {
        if let Some(task) = self.pending.lock().unwrap().remove(&handle.0) {
            task.abort();
        }
    }

    fn is_scheduled(&self, handle: &TriggerHandle) -> bool {
        self.pending.lock().unwrap().contains_key(&handle.0)
    }
}
