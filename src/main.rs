use anyhow::{Context, Result};
use csr_approver::{
    api::{ApiServer, ApiState},
    config::Settings,
    controller::{ControllerOptions, CsrApproverController, PollingInformer},
    policy::{ApproverConfig, ProfileSet},
    queue::RateLimitingQueue,
    store::FileRequestStore,
    telemetry::{init_logging, ApproverMetrics},
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // 1. Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;

    // 2. Initialize logging
    init_logging(&settings.general)?;
    info!("Starting {}...", settings.general.component_name);

    // 3. Compile approval profiles. A broken profile document stops startup.
    let profiles = match &settings.approver.profiles_path {
        Some(path) => {
            let config = ApproverConfig::from_path(path)?;
            let profiles = ProfileSet::compile(&config.profiles)
                .with_context(|| format!("Invalid approval profiles in {}", path.display()))?;
            info!("Loaded {} approval profiles from {}", profiles.len(), path.display());
            profiles
        }
        None => {
            warn!("No approval profiles configured, every request will be denied");
            ProfileSet::default()
        }
    };

    // 4. Wire store, queue and reconciler
    let store = Arc::new(FileRequestStore::new(&settings.store.requests_dir).await?);
    info!("Watching requests in {}", store.dir().display());

    let queue = Arc::new(RateLimitingQueue::with_config(&settings.controller.rate_limit()));
    let metrics = Arc::new(ApproverMetrics::new()?);
    let controller = Arc::new(CsrApproverController::new(
        Arc::new(profiles),
        store.clone(),
        queue,
        metrics.clone(),
        ControllerOptions {
            component_name: settings.general.component_name.clone(),
            max_retries: settings.controller.max_retries,
        },
    ));

    let informer = Arc::new(PollingInformer::new(
        store,
        controller.event_handler(),
        settings.controller.poll_interval(),
        settings.controller.resync_interval(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 5. Serve health, readiness and metrics
    let api_task = if settings.api.enabled {
        let server = ApiServer::new(
            settings.api.listen_addr,
            ApiState {
                metrics,
                informer: informer.clone(),
            },
        );
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.start_with_shutdown(shutdown).await {
                error!("API server failed: {}", e);
            }
        }))
    } else {
        None
    };

    // 6. Fill the queue before the workers start
    if let Err(e) = informer.sync_once().await {
        warn!("Initial listing failed, will retry on the next poll: {}", e);
    }
    let informer_task = tokio::spawn(informer.clone().run(shutdown_rx.clone()));

    // 7. Start the workers
    let controller_task = tokio::spawn(controller.run(settings.controller.workers, shutdown_rx));
    info!(
        "{} started with {} workers",
        settings.general.component_name, settings.controller.workers
    );

    // 8. Wait for shutdown signal
    signal::ctrl_c().await?;
    info!("Shutdown signal received, finishing in-flight requests...");
    shutdown_tx.send(true).ok();

    informer_task.await?;
    controller_task.await?;
    if let Some(api_task) = api_task {
        api_task.await?;
    }

    info!("Stopped");
    Ok(())
}
