use nu_ansi_term::Color;

use crate::catalog::CatalogStore;
use crate::cli::ColorMode;
use crate::config::Config;
use crate::health::probe::HttpProbe;
use crate::health::tracker::{HealthTracker, ProbeOutcome};
use crate::health::{HealthStatus, OverallStatus};
use crate::providers::{ProviderFilter, ProviderRegistry};
use crate::{fatal, HealthArgs};

pub(crate) async fn health_cmd(config: &Config, color: ColorMode, args: &HealthArgs) {
    let registry = match ProviderRegistry::from_config(config) {
        Ok(registry) => registry,
        Err(err) => fatal!("invalid provider configuration: {}", err),
    };

    let providers = registry.filtered(&ProviderFilter::default());

    if providers.is_empty() {
        fatal!("no providers to check, configure some under [providers.<name>]");
    }

    let mut thresholds = config.health_thresholds();

    if args.detailed {
        thresholds.enable_detailed_checks = true;
    }

    let catalog = super::load_catalog(config);
    let mut tracker = HealthTracker::new(thresholds);
    let probe = HttpProbe::new();

    let report = tracker
        .perform_health_checks(
            &providers,
            &probe,
            Some(&catalog as &dyn CatalogStore),
        )
        .await;

    for outcome in &report.outcomes {
        print_outcome(color, outcome, tracker.status(&outcome.provider));

        if !outcome.healthy {
            if let Some(entry) = tracker.provider(&outcome.provider) {
                println!("  consecutive failures: {}", entry.consecutive_failures);
            }
        }
    }

    let summary = &report.summary;

    println!(
        "\n{} providers: {} healthy, {} unhealthy, {} unknown",
        summary.total_providers, summary.healthy, summary.unhealthy, summary.unknown
    );

    println!("overall: {}", paint_overall(color, summary.overall_status));

    if summary.overall_status == OverallStatus::Unhealthy {
        std::process::exit(1);
    }
}

fn print_outcome(color: ColorMode, outcome: &ProbeOutcome, status: HealthStatus) {
    let verdict = match (outcome.healthy, color) {
        (true, ColorMode::On) => Color::Green.paint("ok").to_string(),
        (true, ColorMode::Off) => "ok".to_string(),
        (false, ColorMode::On) => Color::Red.paint("failed").to_string(),
        (false, ColorMode::Off) => "failed".to_string(),
    };

    let timing = outcome
        .response_time
        .map(|t| format!(" ({} ms)", t.as_millis()))
        .unwrap_or_default();

    let critical = if outcome.critical { " [critical]" } else { "" };

    println!(
        "{}: {}{}{} -> {}",
        outcome.provider, verdict, timing, critical, status
    );

    if let Some(error) = &outcome.error {
        println!("  {}", error);
    }

    if let Some(details) = &outcome.details {
        if let Some(connectivity_ok) = details.connectivity_ok {
            println!(
                "  connectivity: {}",
                if connectivity_ok { "ok" } else { "failed" }
            );
        }

        if let Some(count) = details.cataloged_models {
            println!("  cataloged models: {}", count);
        }

        if let Some(rate_limit) = details.rate_limit {
            println!("  rate limit: {} req/min", rate_limit);
        }
    }
}

fn paint_overall(color: ColorMode, status: OverallStatus) -> String {
    if matches!(color, ColorMode::Off) {
        return status.to_string();
    }

    let painted = match status {
        OverallStatus::Healthy => Color::Green.paint("healthy"),
        OverallStatus::Degraded => Color::Yellow.paint("degraded"),
        OverallStatus::Unhealthy => Color::Red.paint("unhealthy"),
        OverallStatus::Unknown => Color::Default.paint("unknown"),
    };

    painted.to_string()
}
