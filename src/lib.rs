pub mod classifier;
pub mod combat_log;
pub mod cursor;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod identity;
pub mod nearby;
pub mod notifications;
pub mod settings;
pub mod stats;
mod storage;

pub use error::{Error, Result};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::combat_log::{spawn_tailing_driver, LogTailer, TickOutcome};
use crate::cursor::JsonCursorStore;
use crate::enrichment::{CatalogGateway, EnrichmentGateway};
use crate::identity::JsonIdentityStore;
use crate::nearby::{spawn_sweeper, NearbyRegistry};
use crate::notifications::LogNotificationSink;
use crate::settings::{JsonSettingsSource, LogPathOverride, SettingsSource};
use crate::stats::{JsonStatStore, StatAggregator};

const DEFAULT_LOG_FILTER: &str = "info,statizen_lib=debug";
const NEARBY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Installs the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let initialized = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Err(error) = initialized {
        eprintln!("Tracing subscriber already installed: {error}");
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Where settings and persisted records live; resolved from the
    /// environment when absent.
    pub config_dir: Option<PathBuf>,
    /// Overrides the configured game log path.
    pub log_path: Option<PathBuf>,
    /// Run a single pass and exit.
    pub once: bool,
}

/// Wires the collaborators together and tails the game log until Ctrl+C.
pub async fn run(options: RunOptions) -> Result<()> {
    let config_directory = settings::resolve_config_directory(options.config_dir.as_deref())?;
    let json_settings = JsonSettingsSource::new(&config_directory);
    tracing::info!(
        settings_path = %json_settings.path().display(),
        "Using configuration directory"
    );

    let settings_source: Arc<dyn SettingsSource> = match options.log_path {
        Some(log_path) => Arc::new(LogPathOverride::new(json_settings, log_path)),
        None => Arc::new(json_settings),
    };
    let settings = settings_source.load()?;

    let gateway = Arc::new(match settings.dictionary_directory() {
        Some(dictionary_directory) => {
            match CatalogGateway::load_from_directory(
                &dictionary_directory,
                settings.allow_dictionary_submit,
            ) {
                Ok(gateway) => gateway,
                Err(error) => {
                    tracing::warn!(
                        dictionary_directory = %dictionary_directory.display(),
                        dictionary_error = %error,
                        "Failed to load class dictionaries, names stay unresolved"
                    );
                    CatalogGateway::new(settings.allow_dictionary_submit)
                }
            }
        }
        None => CatalogGateway::new(settings.allow_dictionary_submit),
    });

    let (aggregator, aggregator_worker) =
        StatAggregator::spawn(Arc::new(JsonStatStore::new(&config_directory)));
    let reconciled = aggregator.reconcile_xp().await?;
    if !reconciled.is_empty() {
        tracing::info!(domains = reconciled.len(), "Experience reconciled at startup");
    }

    let nearby = Arc::new(NearbyRegistry::new(settings.nearby_ttl()));
    let tailer = Arc::new(LogTailer::new(
        Arc::clone(&settings_source),
        Arc::new(JsonCursorStore::new(&config_directory)),
        Arc::new(JsonIdentityStore::new(&config_directory)),
        aggregator.clone(),
        Arc::clone(&gateway) as Arc<dyn EnrichmentGateway>,
        Arc::new(LogNotificationSink),
        Arc::clone(&nearby),
    ));

    if options.once {
        // A rotation only adopts the new session; drain it in the same run.
        let mut outcome = tailer.tick().await;
        if matches!(
            outcome,
            TickOutcome::Completed(combat_log::PassOutcome::Rotated)
        ) {
            outcome = tailer.tick().await;
        }

        drop(tailer);
        drop(aggregator);
        if let Err(error) = aggregator_worker.await {
            tracing::warn!(join_error = %error, "Stat update worker did not shut down cleanly");
        }
        gateway.flush_pending_submissions();

        return match outcome {
            TickOutcome::Failed(error) => Err(error),
            TickOutcome::Completed(pass) => {
                tracing::info!(outcome = ?pass, "Single tailing pass finished");
                Ok(())
            }
            TickOutcome::AlreadyRunning => Ok(()),
        };
    }

    let sweeper = spawn_sweeper(Arc::clone(&nearby), NEARBY_SWEEP_INTERVAL);
    let driver = spawn_tailing_driver(
        Arc::clone(&tailer),
        settings.log_path().ok(),
        settings.poll_interval(),
    );
    tracing::info!(
        poll_interval_ms = settings.poll_interval().as_millis() as u64,
        "Tailing game log, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| Error::io("Failed to listen for Ctrl+C", error))?;

    tracing::info!("Shutting down");
    driver.abort();
    sweeper.abort();
    gateway.flush_pending_submissions();
    Ok(())
}
