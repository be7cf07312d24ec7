//! The per-provider hysteresis state machine and probe batching.

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::catalog::CatalogStore;
use crate::health::probe::NetworkProbe;
use crate::health::{HealthStatus, HealthSummary, HealthThresholds, OverallStatus, ProviderHealth};
use crate::providers::Provider;

/// Result of probing one provider once.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProbeOutcome {
    pub provider: String,
    pub critical: bool,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ProbeDetails>,
}

/// Diagnostic extras gathered when detailed checks are enabled. Never
/// authoritative: a failed detail leaves the primary verdict alone.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProbeDetails {
    pub connectivity_ok: Option<bool>,
    pub cataloged_models: Option<usize>,
    pub rate_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchReport {
    pub outcomes: Vec<ProbeOutcome>,
    pub summary: HealthSummary,
    /// False when the tracker was reset while probes were in flight and
    /// the outcomes were therefore discarded.
    pub applied: bool,
}

pub(crate) struct HealthTracker {
    thresholds: HealthThresholds,
    entries: HashMap<String, ProviderHealth>,
    /// Bumped on every reset; outcomes from an older generation are
    /// discarded instead of applied.
    generation: u64,
}

impl HealthTracker {
    pub(crate) fn new(thresholds: HealthThresholds) -> HealthTracker {
        HealthTracker {
            thresholds,
            entries: HashMap::new(),
            generation: 0,
        }
    }

    pub(crate) fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn status(&self, provider: &str) -> HealthStatus {
        self.entries
            .get(provider)
            .map(|e| e.status)
            .unwrap_or_default()
    }

    pub(crate) fn provider(&self, provider: &str) -> Option<&ProviderHealth> {
        self.entries.get(provider)
    }

    pub(crate) fn statuses(&self) -> HashMap<String, HealthStatus> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.status))
            .collect()
    }

    /// Clears all state. Probes already in flight will find their
    /// generation stale and be discarded at apply time.
    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    pub(crate) fn record_success(&mut self, provider: &str, critical: bool) -> HealthStatus {
        let recovery_threshold = self.thresholds.recovery_threshold;
        let entry = self.entry_mut(provider, critical);
        let now = Utc::now();

        entry.consecutive_successes += 1;
        entry.consecutive_failures = 0;
        entry.last_check = Some(now);
        entry.last_success = Some(now);

        match entry.status {
            HealthStatus::Unknown => {
                entry.status = HealthStatus::Healthy;
            }
            HealthStatus::Unhealthy if entry.consecutive_successes >= recovery_threshold => {
                tracing::info!(provider, "provider recovered");
                entry.status = HealthStatus::Healthy;
            }
            _ => {}
        }

        entry.status
    }

    pub(crate) fn record_failure(&mut self, provider: &str, critical: bool) -> HealthStatus {
        let unhealthy_threshold = self.thresholds.unhealthy_threshold;
        let entry = self.entry_mut(provider, critical);
        let now = Utc::now();

        entry.consecutive_failures += 1;
        entry.consecutive_successes = 0;
        entry.last_check = Some(now);
        entry.last_failure = Some(now);

        if entry.status != HealthStatus::Unhealthy
            && entry.consecutive_failures >= unhealthy_threshold
        {
            tracing::warn!(
                provider,
                failures = entry.consecutive_failures,
                "provider transitioned to unhealthy"
            );
            entry.status = HealthStatus::Unhealthy;
        }

        entry.status
    }

    /// Feeds a batch of probe outcomes into the state machine. Returns
    /// false, leaving all state untouched, when `generation` no longer
    /// matches the tracker.
    pub(crate) fn apply_outcomes(&mut self, outcomes: &[ProbeOutcome], generation: u64) -> bool {
        if generation != self.generation {
            tracing::info!(
                stale = generation,
                current = self.generation,
                "discarding probe outcomes from a reset tracker"
            );

            return false;
        }

        for outcome in outcomes {
            if outcome.healthy {
                self.record_success(&outcome.provider, outcome.critical);
            } else {
                self.record_failure(&outcome.provider, outcome.critical);
            }
        }

        true
    }

    /// Probe one provider and feed the outcome through the state machine.
    pub(crate) async fn check_provider(
        &mut self,
        provider: &Provider,
        probe: &dyn NetworkProbe,
        catalog: Option<&dyn CatalogStore>,
    ) -> ProbeOutcome {
        let outcome = run_probe(provider, probe, &self.thresholds, catalog).await;

        if outcome.healthy {
            self.record_success(&outcome.provider, outcome.critical);
        } else {
            self.record_failure(&outcome.provider, outcome.critical);
        }

        outcome
    }

    /// Probe many providers in bounded batches and apply the outcomes.
    ///
    /// Providers are processed in groups of `max_concurrent_checks`;
    /// within a group, probes run concurrently and each one is timed out
    /// independently, so one hung provider neither blocks nor fails its
    /// siblings.
    pub(crate) async fn perform_health_checks(
        &mut self,
        providers: &[&Provider],
        probe: &dyn NetworkProbe,
        catalog: Option<&dyn CatalogStore>,
    ) -> BatchReport {
        let generation = self.generation;

        let outcomes = run_probe_batch(providers, probe, &self.thresholds, catalog).await;

        let applied = self.apply_outcomes(&outcomes, generation);

        BatchReport {
            summary: self.summary(),
            outcomes,
            applied,
        }
    }

    pub(crate) fn summary(&self) -> HealthSummary {
        let mut healthy = 0;
        let mut unhealthy = 0;
        let mut unknown = 0;
        let mut critical_down = false;

        for entry in self.entries.values() {
            match entry.status {
                HealthStatus::Healthy => healthy += 1,
                HealthStatus::Unknown => unknown += 1,
                HealthStatus::Unhealthy => {
                    unhealthy += 1;

                    if entry.critical {
                        critical_down = true;
                    }
                }
            }
        }

        let overall_status = if critical_down {
            OverallStatus::Unhealthy
        } else if unhealthy > 0 {
            OverallStatus::Degraded
        } else if healthy > 0 {
            OverallStatus::Healthy
        } else {
            OverallStatus::Unknown
        };

        HealthSummary {
            total_providers: self.entries.len(),
            healthy,
            unhealthy,
            unknown,
            overall_status,
        }
    }

    fn entry_mut(&mut self, provider: &str, critical: bool) -> &mut ProviderHealth {
        self.entries
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(critical))
    }
}

/// Probe a batch of providers without touching tracker state, so callers
/// can release their lock on the tracker while requests are in flight.
pub(crate) async fn run_probe_batch(
    providers: &[&Provider],
    probe: &dyn NetworkProbe,
    thresholds: &HealthThresholds,
    catalog: Option<&dyn CatalogStore>,
) -> Vec<ProbeOutcome> {
    let mut outcomes = Vec::with_capacity(providers.len());

    for chunk in providers.chunks(thresholds.max_concurrent_checks.max(1)) {
        let batch = chunk
            .iter()
            .map(|provider| run_probe(provider, probe, thresholds, catalog));

        outcomes.extend(join_all(batch).await);
    }

    outcomes
}

async fn run_probe(
    provider: &Provider,
    probe: &dyn NetworkProbe,
    thresholds: &HealthThresholds,
    catalog: Option<&dyn CatalogStore>,
) -> ProbeOutcome {
    let url = provider.models_url();
    let timeout = thresholds.probe_timeout;

    // the outer timer guards against probe implementations that fail to
    // enforce their own timeout
    let result = tokio::time::timeout(timeout, probe.probe(&url, timeout)).await;

    let mut outcome = match result {
        Ok(Ok(response)) => ProbeOutcome {
            provider: provider.name.clone(),
            critical: provider.critical,
            healthy: true,
            response_time: Some(response.response_time),
            error: None,
            details: None,
        },
        Ok(Err(err)) => ProbeOutcome {
            provider: provider.name.clone(),
            critical: provider.critical,
            healthy: false,
            response_time: None,
            error: Some(err.to_string()),
            details: None,
        },
        Err(_elapsed) => ProbeOutcome {
            provider: provider.name.clone(),
            critical: provider.critical,
            healthy: false,
            response_time: None,
            error: Some(format!("probe timed out after {timeout:?}")),
            details: None,
        },
    };

    if thresholds.enable_detailed_checks && outcome.healthy {
        outcome.details = Some(detailed_checks(provider, probe, thresholds, catalog).await);
    }

    outcome
}

async fn detailed_checks(
    provider: &Provider,
    probe: &dyn NetworkProbe,
    thresholds: &HealthThresholds,
    catalog: Option<&dyn CatalogStore>,
) -> ProbeDetails {
    let timeout = thresholds.probe_timeout;

    let connectivity_ok =
        match tokio::time::timeout(timeout, probe.connectivity(&provider.base_url, timeout)).await {
            Ok(Ok(_)) => Some(true),
            Ok(Err(err)) => {
                tracing::warn!(provider = %provider.name, %err, "connectivity diagnostic failed");
                Some(false)
            }
            Err(_) => {
                tracing::warn!(provider = %provider.name, "connectivity diagnostic timed out");
                Some(false)
            }
        };

    let cataloged_models = catalog.map(|c| c.models_by_provider(&provider.name).len());

    ProbeDetails {
        connectivity_ok,
        cataloged_models,
        rate_limit: provider.rate_limit,
    }
}
