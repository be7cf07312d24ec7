use std::collections::HashMap;

use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::parser::engine::ParserEngine;
use crate::providers::{HttpCatalogFetcher, ProviderFilter, ProviderRegistry};
use crate::reconcile::{Reconciler, RefreshReport};
use crate::{fatal, warn, SyncArgs};

pub(crate) async fn sync_cmd(config: &Config, args: &SyncArgs) {
    let registry = match ProviderRegistry::from_config(config) {
        Ok(registry) => registry,
        Err(err) => fatal!("invalid provider configuration: {}", err),
    };

    let filter = match &args.provider {
        Some(name) => {
            if registry.get(name).is_none() {
                fatal!("provider \"{}\" is not configured", name);
            }

            ProviderFilter::by_name(name)
        }
        None => ProviderFilter::default(),
    };

    let providers = registry.filtered(&filter);

    if providers.is_empty() {
        fatal!("no providers to sync, configure some under [providers.<name>]");
    }

    let mut options = config.reconcile_options();

    if args.keep_stale {
        options.remove_stale = false;
    }

    // a fresh reconciler runs a full pass; --incremental pretends one
    // just happened so providers with fresh snapshot records are skipped
    let mut reconciler = if args.incremental {
        Reconciler::resuming(options)
    } else {
        Reconciler::new(options)
    };

    let mut engine = ParserEngine::new(config.engine_config());
    let mut catalog = super::load_catalog(config);
    let fetcher = HttpCatalogFetcher::new(config.fetch_timeout());

    let report = reconciler
        .refresh(
            &providers,
            &fetcher,
            &mut engine,
            &mut catalog,
            &HashMap::new(),
        )
        .await;

    print_report(&report);

    let stats = engine.stats();

    println!(
        "parses: {} ok, {} failed, {} models, success rate {:.0}%",
        stats.successful_parses,
        stats.failed_parses,
        stats.models_extracted,
        stats.success_rate * 100.0
    );

    let path = super::snapshot_path(config);

    if let Err(err) = catalog.save_snapshot(&path) {
        fatal!("failed to write catalog snapshot {}: {}", path.display(), err);
    }

    println!("catalog: {} models -> {}", catalog.len(), path.display());
}

fn print_report(report: &RefreshReport) {
    for refresh in &report.providers {
        if refresh.skipped {
            match refresh.error {
                Some(_) => warn!("{}: skipped, currently unhealthy", refresh.provider),
                None => println!("{}: up to date, skipped", refresh.provider),
            }

            continue;
        }

        if let Some(kind) = refresh.error {
            warn!("{}: failed ({})", refresh.provider, kind);

            continue;
        }

        if refresh.diff.is_empty() {
            println!("{}: no changes", refresh.provider);

            continue;
        }

        println!(
            "{}: +{} added, {} updated, -{} retired",
            refresh.provider,
            refresh.diff.added.len(),
            refresh.diff.updated.len(),
            refresh.diff.retired.len()
        );
    }
}
