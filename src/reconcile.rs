//! Catalog reconciliation: diffing fresh parses against stored state.
//!
//! Reconciliation is a set computation followed by an apply step. The
//! diff never touches the store; the apply step is the only writer. A
//! record that disappears from a provider's listing is not dropped
//! immediately: it ages until it crosses the staleness threshold, which
//! keeps one flaky listing from gutting the catalog.
//!
//! Two thresholds exist on purpose. `stale_threshold` (default 7 days)
//! governs retirement during a scheduled refresh; `provider_stale_threshold`
//! (default 30 days) governs end-of-life pruning by the cleanup job. They
//! are configured independently.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;

use crate::catalog::{CatalogStore, ModelRecord};
use crate::health::HealthStatus;
use crate::parser::engine::ParserEngine;
use crate::parser::ParseErrorKind;
use crate::providers::{CatalogFetcher, Provider};

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct CatalogDiff {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub retired: Vec<String>,
    pub errors: u32,
}

impl CatalogDiff {
    pub(crate) fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.retired.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: &CatalogDiff) {
        self.added.extend(other.added.iter().cloned());
        self.updated.extend(other.updated.iter().cloned());
        self.retired.extend(other.retired.iter().cloned());
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ReconcileOptions {
    pub remove_stale: bool,
    /// Retirement age for records missing from a refresh.
    pub stale_threshold: chrono::Duration,
    /// End-of-life age used by the cleanup job.
    pub provider_stale_threshold: chrono::Duration,
    pub retry_attempts: u32,
    /// Base delay; attempt `n` waits `retry_delay * n`.
    pub retry_delay: Duration,
    pub force_full_update_interval: chrono::Duration,
    pub max_concurrent_updates: usize,
}

impl Default for ReconcileOptions {
    fn default() -> ReconcileOptions {
        ReconcileOptions {
            remove_stale: true,
            stale_threshold: chrono::Duration::days(7),
            provider_stale_threshold: chrono::Duration::days(30),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(500),
            force_full_update_interval: chrono::Duration::hours(24),
            max_concurrent_updates: 4,
        }
    }
}

/// Outcome of refreshing one provider within a pass.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProviderRefresh {
    pub provider: String,
    pub diff: CatalogDiff,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ParseErrorKind>,
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RefreshReport {
    pub full: bool,
    pub providers: Vec<ProviderRefresh>,
    pub totals: CatalogDiff,
}

/// What a refresh pass decided to do with one provider.
enum Plan {
    Fetch,
    /// The health tracker holds the provider unhealthy.
    SkipUnhealthy,
    /// Incremental pass and every stored record is fresh.
    SkipFresh,
}

pub(crate) struct Reconciler {
    options: ReconcileOptions,
    last_full_refresh: Option<DateTime<Utc>>,
    /// Cumulative per-provider error counts across passes.
    provider_errors: HashMap<String, u32>,
}

impl Reconciler {
    pub(crate) fn new(options: ReconcileOptions) -> Reconciler {
        Reconciler {
            options,
            last_full_refresh: None,
            provider_errors: HashMap::new(),
        }
    }

    /// A reconciler that behaves as if a full pass just ran, so its next
    /// pass is incremental. One-shot invocations use this to avoid
    /// re-fetching providers whose snapshot records are still fresh.
    pub(crate) fn resuming(options: ReconcileOptions) -> Reconciler {
        Reconciler {
            options,
            last_full_refresh: Some(Utc::now()),
            provider_errors: HashMap::new(),
        }
    }

    pub(crate) fn provider_errors(&self) -> &HashMap<String, u32> {
        &self.provider_errors
    }

    /// Pure diff between a fresh parse and the stored records of one
    /// provider. Fresh models already present are updates; new ones are
    /// adds; stored records missing from the parse retire once stale,
    /// unless retirement is disabled.
    pub(crate) fn reconcile(
        &self,
        provider: &str,
        fresh: &[ModelRecord],
        existing: &[&ModelRecord],
        now: DateTime<Utc>,
    ) -> CatalogDiff {
        let mut remaining: BTreeMap<&str, &ModelRecord> = existing
            .iter()
            .map(|record| (record.id.as_str(), *record))
            .collect();

        let mut diff = CatalogDiff::default();

        for model in fresh {
            if remaining.remove(model.id.as_str()).is_some() {
                diff.updated.push(model.id.clone());
            } else {
                diff.added.push(model.id.clone());
            }
        }

        if self.options.remove_stale {
            for (id, record) in remaining {
                if record.is_stale(self.options.stale_threshold, now) {
                    diff.retired.push(id.to_string());
                }
            }
        }

        tracing::debug!(
            provider,
            added = diff.added.len(),
            updated = diff.updated.len(),
            retired = diff.retired.len(),
            "reconciled"
        );

        diff
    }

    /// Applies a diff to the store. Adds insert, updates refresh the
    /// stored record (keeping `last_verified` monotonic), retirements
    /// remove.
    pub(crate) fn apply(
        &self,
        catalog: &mut dyn CatalogStore,
        fresh: &[ModelRecord],
        diff: &CatalogDiff,
    ) {
        let fresh_by_id: BTreeMap<&str, &ModelRecord> = fresh
            .iter()
            .map(|record| (record.id.as_str(), record))
            .collect();

        for id in &diff.added {
            if let Some(record) = fresh_by_id.get(id.as_str()) {
                catalog.add_model((*record).clone());
            }
        }

        for id in &diff.updated {
            if let Some(record) = fresh_by_id.get(id.as_str()) {
                if catalog.update_model(id, (*record).clone()).is_err() {
                    // the record vanished between diff and apply
                    catalog.add_model((*record).clone());
                }
            }
        }

        for id in &diff.retired {
            catalog.remove_model(id);
        }
    }

    /// Refresh the catalog from the given providers.
    ///
    /// A full pass runs when `force_full_update_interval` has elapsed
    /// since the previous one and considers every provider; an
    /// incremental pass skips providers whose stored records are all
    /// fresh. Providers the tracker currently holds unhealthy are skipped
    /// as a policy decision, not an error. Individual fetch failures are
    /// retried with linear backoff and never abort the pass.
    pub(crate) async fn refresh(
        &mut self,
        providers: &[&Provider],
        fetcher: &dyn CatalogFetcher,
        engine: &mut ParserEngine,
        catalog: &mut dyn CatalogStore,
        health: &HashMap<String, HealthStatus>,
    ) -> RefreshReport {
        let now = Utc::now();

        let full = match self.last_full_refresh {
            None => true,
            Some(last) => now - last > self.options.force_full_update_interval,
        };

        let mut report = RefreshReport {
            full,
            providers: Vec::with_capacity(providers.len()),
            totals: CatalogDiff::default(),
        };

        // fetches run in bounded batches; parse and apply stay sequential
        // because the engine and the store are single-writer
        for chunk in providers.chunks(self.options.max_concurrent_updates.max(1)) {
            let plans: Vec<(&Provider, Plan)> = chunk
                .iter()
                .map(|provider| {
                    let plan = if self.gated_out(provider, health) {
                        Plan::SkipUnhealthy
                    } else if !full && !self.provider_due(provider, catalog, now) {
                        Plan::SkipFresh
                    } else {
                        Plan::Fetch
                    };

                    (*provider, plan)
                })
                .collect();

            let options = &self.options;
            let fetched = futures_util::future::join_all(plans.iter().map(
                |(provider, plan)| async move {
                    match plan {
                        Plan::Fetch => Some(fetch_with_retry(provider, fetcher, options).await),
                        Plan::SkipUnhealthy | Plan::SkipFresh => None,
                    }
                },
            ))
            .await;

            for ((provider, plan), fetched) in plans.iter().zip(fetched) {
                let provider = *provider;

                let refresh = match fetched {
                    None => ProviderRefresh {
                        provider: provider.name.clone(),
                        diff: CatalogDiff::default(),
                        error: matches!(plan, Plan::SkipUnhealthy)
                            .then_some(ParseErrorKind::StaleProvider),
                        skipped: true,
                    },
                    Some(Err(err)) => {
                        *self.provider_errors.entry(provider.name.clone()).or_insert(0) += 1;

                        tracing::warn!(
                            provider = %provider.name,
                            %err,
                            "provider refresh failed after retries"
                        );

                        ProviderRefresh {
                            provider: provider.name.clone(),
                            diff: CatalogDiff {
                                errors: 1,
                                ..CatalogDiff::default()
                            },
                            error: Some(err.taxonomy()),
                            skipped: false,
                        }
                    }
                    Some(Ok(raw)) => {
                        let result = engine.parse_response(&raw, &provider.name);

                        if let Some(kind) = result.error {
                            *self.provider_errors.entry(provider.name.clone()).or_insert(0) += 1;

                            ProviderRefresh {
                                provider: provider.name.clone(),
                                diff: CatalogDiff {
                                    errors: 1,
                                    ..CatalogDiff::default()
                                },
                                error: Some(kind),
                                skipped: false,
                            }
                        } else {
                            let diff = {
                                let existing = catalog.models_by_provider(&provider.name);

                                self.reconcile(&provider.name, &result.models, &existing, now)
                            };

                            self.apply(catalog, &result.models, &diff);

                            ProviderRefresh {
                                provider: provider.name.clone(),
                                diff,
                                error: None,
                                skipped: false,
                            }
                        }
                    }
                };

                report.totals.absorb(&refresh.diff);
                report.providers.push(refresh);
            }
        }

        if full {
            self.last_full_refresh = Some(now);
        }

        tracing::info!(
            full,
            added = report.totals.added.len(),
            updated = report.totals.updated.len(),
            retired = report.totals.retired.len(),
            errors = report.totals.errors,
            "catalog refresh finished"
        );

        report
    }

    /// Prune records past the end-of-life threshold. Used by the cleanup
    /// job, not by regular refreshes.
    pub(crate) fn prune_expired(&self, catalog: &mut dyn CatalogStore) -> Vec<String> {
        let now = Utc::now();
        let threshold = self.options.provider_stale_threshold;

        let expired: Vec<String> = catalog
            .all_models()
            .iter()
            .filter(|record| record.is_stale(threshold, now))
            .map(|record| record.id.clone())
            .collect();

        for id in &expired {
            catalog.remove_model(id);
        }

        if !expired.is_empty() {
            tracing::info!(pruned = expired.len(), "removed end-of-life records");
        }

        expired
    }

    fn gated_out(&self, provider: &Provider, health: &HashMap<String, HealthStatus>) -> bool {
        health.get(&provider.name) == Some(&HealthStatus::Unhealthy)
    }

    /// An incremental pass only visits providers with no records or with
    /// at least one record older than the staleness threshold.
    fn provider_due(
        &self,
        provider: &Provider,
        catalog: &dyn CatalogStore,
        now: DateTime<Utc>,
    ) -> bool {
        let records = catalog.models_by_provider(&provider.name);

        records.is_empty()
            || records
                .iter()
                .any(|record| record.is_stale(self.options.stale_threshold, now))
    }
}

async fn fetch_with_retry(
    provider: &Provider,
    fetcher: &dyn CatalogFetcher,
    options: &ReconcileOptions,
) -> Result<serde_json::Value, crate::providers::FetchError> {
    let attempts = options.retry_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match fetcher.fetch(provider).await {
            Ok(raw) => return Ok(raw),
            Err(err) => {
                tracing::warn!(
                    provider = %provider.name,
                    attempt,
                    %err,
                    "catalog fetch failed"
                );

                last_err = Some(err);

                if attempt < attempts {
                    // linear backoff with a little jitter to spread
                    // retries from concurrent providers apart
                    let jitter = rand::thread_rng().gen_range(0..=50);
                    let delay = options.retry_delay * attempt + Duration::from_millis(jitter);

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_err.expect("at least one attempt always runs"))
}
