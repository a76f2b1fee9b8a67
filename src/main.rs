use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use custodian::ai::credentials::{CredentialStore, KeyringCredentials};
use custodian::indexer::{ScanError, ScanStatus};
use custodian::pipeline::PipelineLock;
use custodian::{
    AnthropicBackend, BlacklistFilter, ClassificationBackend, FileLock, FileStore, FolderIndexer,
    JsonStateStore, LocalFileStore, OpenAiBackend, OrganizationPipeline, PipelineConfig, Provider,
    Scheduler, Settings, StateStore, TokioScheduler, Wakeup,
};

/// How often the service checks whether the folder cache is due for a
/// refresh. The refresh interval itself comes from configuration.
const REFRESH_CHECK_SECS: u64 = 600;

/// Short acquisition window for the pipeline's advisory lock.
const LOCK_WINDOW: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,custodian=info")),
        )
        .init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };
    info!(
        root = %settings.root_dir.display(),
        source = %settings.source_folder,
        "custodian starting"
    );

    let state_dir = JsonStateStore::default_dir();
    let state: Arc<dyn StateStore> = match JsonStateStore::new(state_dir.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to open state store");
            std::process::exit(1);
        }
    };

    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(settings.root_dir.clone()));
    let credentials: Arc<dyn CredentialStore> = Arc::new(KeyringCredentials);
    if credentials.api_key(settings.provider.key_name()).is_err() {
        warn!(
            provider = settings.provider.key_name(),
            "no api key configured; pipeline runs will leave files in place"
        );
    }
    let backend: Arc<dyn ClassificationBackend> = match settings.provider {
        Provider::Anthropic => Arc::new(AnthropicBackend::new(
            Arc::clone(&credentials),
            settings.anthropic_model.clone(),
        )),
        Provider::Openai => Arc::new(OpenAiBackend::new(
            Arc::clone(&credentials),
            settings.openai_model.clone(),
        )),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new(tx));

    let indexer = Arc::new(FolderIndexer::new(
        Arc::clone(&store),
        Arc::clone(&state),
        scheduler,
        BlacklistFilter::new(settings.blacklist.clone()),
        settings.source_folder.clone(),
        Duration::from_secs(settings.scan_budget_secs),
    ));

    let lock: Arc<dyn PipelineLock> = Arc::new(FileLock::new(
        state_dir.join("pipeline.lock"),
        LOCK_WINDOW,
    ));

    let pipeline = OrganizationPipeline::new(
        store,
        state,
        backend,
        credentials,
        lock,
        Arc::clone(&indexer),
        PipelineConfig {
            source_folder: settings.source_folder.clone(),
            batch_size: settings.batch_size,
            max_size_mb: settings.max_size_mb,
            min_call_spacing: Duration::from_millis(settings.min_call_spacing_ms),
            inter_file_delay: Duration::from_millis(settings.inter_file_delay_ms),
        },
    );

    let mut pipeline_tick =
        tokio::time::interval(Duration::from_secs(settings.pipeline_interval_secs));
    let mut refresh_tick = tokio::time::interval(Duration::from_secs(REFRESH_CHECK_SECS));
    let refresh_age = Duration::from_secs(settings.cache_refresh_hours * 3600);

    // No error leaves this loop; every invocation logs and the next
    // scheduled one still happens.
    loop {
        tokio::select! {
            _ = pipeline_tick.tick() => {
                match pipeline.run().await {
                    Ok(outcome) => debug!(?outcome, "pipeline run finished"),
                    Err(e) => error!(error = %e, "pipeline run failed"),
                }
            }
            _ = refresh_tick.tick() => {
                let idle = matches!(indexer.status(), Ok(ScanStatus::Idle));
                if idle && indexer.cache_is_stale(refresh_age).unwrap_or(true) {
                    info!("folder cache stale, starting scan");
                    if let Err(e) = indexer.start_scan() {
                        error!(error = %e, "scheduled scan failed");
                    }
                }
            }
            Some(Wakeup::ContinueScan) = rx.recv() => {
                match indexer.continue_scan() {
                    Ok(outcome) => debug!(?outcome, "scan continuation finished"),
                    Err(ScanError::NoActiveScan) => {
                        debug!("continuation arrived after scan ended");
                    }
                    Err(e) => error!(error = %e, "scan continuation failed"),
                }
            }
        }
    }
}
