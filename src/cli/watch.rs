use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::health::probe::HttpProbe;
use crate::health::tracker::HealthTracker;
use crate::orchestrator::{Orchestrator, Services};
use crate::parser::engine::ParserEngine;
use crate::providers::{HttpCatalogFetcher, ProviderRegistry};
use crate::reconcile::Reconciler;
use crate::{fatal, warn};

/// Runs the orchestrator until interrupted, then shuts it down cleanly.
pub(crate) async fn watch_cmd(config: &Config) {
    let registry = match ProviderRegistry::from_config(config) {
        Ok(registry) => registry,
        Err(err) => fatal!("invalid provider configuration: {}", err),
    };

    if registry.all().is_empty() {
        fatal!("nothing to watch, configure providers under [providers.<name>]");
    }

    let services = Services {
        engine: Arc::new(Mutex::new(ParserEngine::new(config.engine_config()))),
        tracker: Arc::new(Mutex::new(HealthTracker::new(config.health_thresholds()))),
        reconciler: Arc::new(Mutex::new(Reconciler::new(config.reconcile_options()))),
        catalog: Arc::new(Mutex::new(super::load_catalog(config))),
        registry: Arc::new(registry),
        fetcher: Arc::new(HttpCatalogFetcher::new(config.fetch_timeout())),
        probe: Arc::new(HttpProbe::new()),
        snapshot_path: Some(super::snapshot_path(config)),
    };

    let catalog = services.catalog.clone();
    let snapshot_path = super::snapshot_path(config);

    let orchestrator = Orchestrator::start(config.schedule(), services);

    println!("watching, press ctrl-c to stop");

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to wait for interrupt: {}", err);
    }

    orchestrator.stop().await;

    // one last snapshot so a short watch session is not lost
    let save_result = catalog.lock().await.save_snapshot(&snapshot_path);
    if let Err(err) = save_result {
        warn!(
            "failed to write catalog snapshot {}: {}",
            snapshot_path.display(),
            err
        );
    }
}
