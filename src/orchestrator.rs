//! Job orchestration: independent timers per job family with clean
//! shutdown.
//!
//! Three job families run on their own intervals: health probing, catalog
//! refresh, and cleanup (end-of-life pruning plus snapshotting). Each
//! family is one tokio task looping over a `tokio::select!` of its timer
//! and a shared stop channel, so `stop()` halts every pending timer
//! deterministically and without panicking.
//!
//! The engine, tracker, reconciler, and catalog are shared behind async
//! mutexes; every mutation goes through their public methods. The health
//! job releases the tracker lock while probes are in flight and applies
//! outcomes under the generation check, so a reset during a batch simply
//! discards that batch.

use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::catalog::MemoryCatalog;
use crate::health::tracker::{run_probe_batch, HealthTracker};
use crate::health::probe::NetworkProbe;
use crate::parser::engine::ParserEngine;
use crate::providers::{CatalogFetcher, Provider, ProviderFilter, ProviderRegistry};
use crate::reconcile::Reconciler;

#[derive(Debug, Clone)]
pub(crate) struct ScheduleConfig {
    pub health_interval: Duration,
    pub catalog_interval: Duration,
    pub cleanup_interval: Duration,
    pub max_cleanup_retries: u32,
}

impl Default for ScheduleConfig {
    fn default() -> ScheduleConfig {
        ScheduleConfig {
            health_interval: Duration::from_secs(300),
            catalog_interval: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(86400),
            max_cleanup_retries: 3,
        }
    }
}

/// Shared service handles the job loops operate on.
#[derive(Clone)]
pub(crate) struct Services {
    pub engine: Arc<Mutex<ParserEngine>>,
    pub tracker: Arc<Mutex<HealthTracker>>,
    pub reconciler: Arc<Mutex<Reconciler>>,
    pub catalog: Arc<Mutex<MemoryCatalog>>,
    pub registry: Arc<ProviderRegistry>,
    pub fetcher: Arc<dyn CatalogFetcher>,
    pub probe: Arc<dyn NetworkProbe>,
    pub snapshot_path: Option<PathBuf>,
}

pub(crate) struct Orchestrator {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub(crate) fn start(schedule: ScheduleConfig, services: Services) -> Orchestrator {
        let (stop, _) = watch::channel(false);

        let handles = vec![
            tokio::spawn(health_job(
                schedule.health_interval,
                stop.subscribe(),
                services.clone(),
            )),
            tokio::spawn(catalog_job(
                schedule.catalog_interval,
                stop.subscribe(),
                services.clone(),
            )),
            tokio::spawn(cleanup_job(
                schedule.cleanup_interval,
                schedule.max_cleanup_retries,
                stop.subscribe(),
                services,
            )),
        ];

        tracing::info!("orchestrator started");

        Orchestrator { stop, handles }
    }

    /// Signals every job loop and waits for them to drain. Pending timers
    /// are dropped with their tasks; a panicked job is logged rather than
    /// propagated.
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);

        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::warn!(%err, "job task did not shut down cleanly");
            }
        }

        tracing::info!("orchestrator stopped");
    }
}

async fn health_job(interval: Duration, mut stop: watch::Receiver<bool>, services: Services) {
    let mut timer = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = timer.tick() => run_health_pass(&services).await,
            _ = stop.changed() => break,
        }
    }
}

async fn run_health_pass(services: &Services) {
    let providers: Vec<Provider> = services
        .registry
        .filtered(&ProviderFilter::default())
        .into_iter()
        .cloned()
        .collect();
    let provider_refs: Vec<&Provider> = providers.iter().collect();

    // snapshot generation and thresholds, then probe without the lock
    let (generation, thresholds) = {
        let tracker = services.tracker.lock().await;

        (tracker.generation(), tracker.thresholds().clone())
    };

    let outcomes = {
        let catalog = services.catalog.lock().await;

        run_probe_batch(
            &provider_refs,
            services.probe.as_ref(),
            &thresholds,
            Some(&*catalog as &dyn crate::catalog::CatalogStore),
        )
        .await
    };

    let applied = services
        .tracker
        .lock()
        .await
        .apply_outcomes(&outcomes, generation);

    if !applied {
        tracing::info!("health pass discarded after tracker reset");
    }
}

async fn catalog_job(interval: Duration, mut stop: watch::Receiver<bool>, services: Services) {
    let mut timer = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = timer.tick() => run_catalog_pass(&services).await,
            _ = stop.changed() => break,
        }
    }
}

async fn run_catalog_pass(services: &Services) {
    let providers: Vec<Provider> = services
        .registry
        .filtered(&ProviderFilter::default())
        .into_iter()
        .cloned()
        .collect();
    let provider_refs: Vec<&Provider> = providers.iter().collect();

    let statuses = services.tracker.lock().await.statuses();

    let mut reconciler = services.reconciler.lock().await;
    let mut engine = services.engine.lock().await;
    let mut catalog = services.catalog.lock().await;

    reconciler
        .refresh(
            &provider_refs,
            services.fetcher.as_ref(),
            &mut engine,
            &mut *catalog,
            &statuses,
        )
        .await;
}

async fn cleanup_job(
    interval: Duration,
    max_retries: u32,
    mut stop: watch::Receiver<bool>,
    services: Services,
) {
    let mut timer = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = timer.tick() => run_cleanup_pass(&services, max_retries).await,
            _ = stop.changed() => break,
        }
    }
}

async fn run_cleanup_pass(services: &Services, max_retries: u32) {
    for attempt in 1..=max_retries.max(1) {
        match try_cleanup(services).await {
            Ok(pruned) => {
                if pruned > 0 {
                    tracing::info!(pruned, "cleanup pass finished");
                }

                return;
            }
            Err(err) => {
                tracing::warn!(attempt, %err, "cleanup pass failed");

                if attempt < max_retries {
                    let jitter: u64 = rand::thread_rng().gen_range(0..=100);

                    tokio::time::sleep(
                        Duration::from_millis(250) * attempt + Duration::from_millis(jitter),
                    )
                    .await;
                }
            }
        }
    }

    tracing::warn!("cleanup pass abandoned until the next interval");
}

async fn try_cleanup(services: &Services) -> Result<usize, crate::catalog::CatalogError> {
    let reconciler = services.reconciler.lock().await;
    let mut catalog = services.catalog.lock().await;

    let pruned = reconciler.prune_expired(&mut *catalog);

    if let Some(path) = &services.snapshot_path {
        catalog.save_snapshot(path)?;
    }

    Ok(pruned.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProviderSection};
    use crate::health::probe::{ProbeError, ProbeResponse};
    use crate::health::HealthThresholds;
    use crate::parser::engine::EngineConfig;
    use crate::providers::FetchError;
    use crate::reconcile::ReconcileOptions;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CatalogFetcher for CountingFetcher {
        async fn fetch(&self, _provider: &Provider) -> Result<serde_json::Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            Ok(json!(["m1", "m2"]))
        }
    }

    struct AlwaysUpProbe;

    #[async_trait]
    impl crate::health::probe::NetworkProbe for AlwaysUpProbe {
        async fn probe(
            &self,
            _url: &str,
            _timeout: Duration,
        ) -> Result<ProbeResponse, ProbeError> {
            Ok(ProbeResponse {
                status: 200,
                response_time: Duration::from_millis(1),
            })
        }
    }

    fn services(fetch_calls: Arc<AtomicUsize>) -> Services {
        let mut config = Config::default();

        config.providers.insert(
            "acme".to_string(),
            ProviderSection {
                base_url: "https://api.acme.test".to_string(),
                ..ProviderSection::default()
            },
        );

        Services {
            engine: Arc::new(Mutex::new(ParserEngine::new(EngineConfig::default()))),
            tracker: Arc::new(Mutex::new(HealthTracker::new(HealthThresholds::default()))),
            reconciler: Arc::new(Mutex::new(Reconciler::new(ReconcileOptions::default()))),
            catalog: Arc::new(Mutex::new(MemoryCatalog::new())),
            registry: Arc::new(ProviderRegistry::from_config(&config).unwrap()),
            fetcher: Arc::new(CountingFetcher { calls: fetch_calls }),
            probe: Arc::new(AlwaysUpProbe),
            snapshot_path: None,
        }
    }

    #[tokio::test]
    async fn jobs_run_and_stop_cleanly() {
        let fetch_calls = Arc::new(AtomicUsize::new(0));
        let services = services(fetch_calls.clone());

        let orchestrator = Orchestrator::start(
            ScheduleConfig {
                health_interval: Duration::from_millis(10),
                catalog_interval: Duration::from_millis(10),
                cleanup_interval: Duration::from_millis(10),
                max_cleanup_retries: 1,
            },
            services.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;

        orchestrator.stop().await;

        // the first catalog tick fetched at least once
        assert!(fetch_calls.load(Ordering::SeqCst) >= 1);

        // the health job fed the tracker
        let tracker = services.tracker.lock().await;
        assert_eq!(
            tracker.status("acme"),
            crate::health::HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn stop_is_prompt_with_long_intervals() {
        let services = services(Arc::new(AtomicUsize::new(0)));

        let orchestrator = Orchestrator::start(
            ScheduleConfig {
                health_interval: Duration::from_secs(3600),
                catalog_interval: Duration::from_secs(3600),
                cleanup_interval: Duration::from_secs(3600),
                max_cleanup_retries: 1,
            },
            services,
        );

        orchestrator.stop().await;
    }
}
