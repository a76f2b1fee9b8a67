pub mod ai;
pub mod config;
pub mod indexer;
pub mod pipeline;
pub mod schedule;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testutil;

pub use ai::{AnthropicBackend, ClassificationBackend, OpenAiBackend, Provider};
pub use config::Settings;
pub use indexer::{BlacklistFilter, FolderIndexer, ScanOutcome};
pub use pipeline::{FileLock, OrganizationPipeline, PipelineConfig, RunOutcome};
pub use schedule::{Scheduler, TokioScheduler, Wakeup};
pub use state::{JsonStateStore, MemoryStateStore, StateStore};
pub use storage::{FileStore, LocalFileStore};
