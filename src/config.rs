use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use toml;

use crate::health::HealthThresholds;
use crate::orchestrator::ScheduleConfig;
use crate::parser::engine::EngineConfig;
use crate::reconcile::ReconcileOptions;

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct ParserSection {
    pub cache_ttl_secs: Option<u64>,
    pub cache_capacity: Option<usize>,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct ReconcilerSection {
    pub remove_stale: Option<bool>,
    pub stale_threshold_days: Option<i64>,
    pub provider_stale_days: Option<i64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub force_full_update_hours: Option<i64>,
    pub max_concurrent_updates: Option<usize>,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct HealthSection {
    pub unhealthy_threshold: Option<u32>,
    pub recovery_threshold: Option<u32>,
    pub max_concurrent_checks: Option<usize>,
    pub probe_timeout_secs: Option<u64>,
    pub enable_detailed_checks: Option<bool>,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct ScheduleSection {
    pub health_interval_secs: Option<u64>,
    pub catalog_interval_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub max_cleanup_retries: Option<u32>,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct CatalogSection {
    pub snapshot_path: Option<PathBuf>,
    pub fetch_timeout_secs: Option<u64>,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct ProviderSection {
    pub base_url: String,
    pub models_path: Option<String>,
    pub api_key: Option<String>,
    pub rate_limit: Option<u32>,
    pub priority: Option<u8>,
    pub critical: Option<bool>,
    pub enabled: Option<bool>,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct Config {
    #[serde(default)]
    pub parser: ParserSection,
    #[serde(default)]
    pub reconciler: ReconcilerSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSection>,
}

impl Config {
    pub(crate) fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();

        EngineConfig {
            cache_ttl: self
                .parser
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_capacity: self.parser.cache_capacity.unwrap_or(defaults.cache_capacity),
        }
    }

    pub(crate) fn reconcile_options(&self) -> ReconcileOptions {
        let defaults = ReconcileOptions::default();
        let section = &self.reconciler;

        ReconcileOptions {
            remove_stale: section.remove_stale.unwrap_or(defaults.remove_stale),
            stale_threshold: section
                .stale_threshold_days
                .map(chrono::Duration::days)
                .unwrap_or(defaults.stale_threshold),
            provider_stale_threshold: section
                .provider_stale_days
                .map(chrono::Duration::days)
                .unwrap_or(defaults.provider_stale_threshold),
            retry_attempts: section.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_delay: section
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            force_full_update_interval: section
                .force_full_update_hours
                .map(chrono::Duration::hours)
                .unwrap_or(defaults.force_full_update_interval),
            max_concurrent_updates: section
                .max_concurrent_updates
                .unwrap_or(defaults.max_concurrent_updates),
        }
    }

    pub(crate) fn health_thresholds(&self) -> HealthThresholds {
        let defaults = HealthThresholds::default();
        let section = &self.health;

        HealthThresholds {
            unhealthy_threshold: section
                .unhealthy_threshold
                .unwrap_or(defaults.unhealthy_threshold),
            recovery_threshold: section
                .recovery_threshold
                .unwrap_or(defaults.recovery_threshold),
            max_concurrent_checks: section
                .max_concurrent_checks
                .unwrap_or(defaults.max_concurrent_checks),
            probe_timeout: section
                .probe_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
            enable_detailed_checks: section
                .enable_detailed_checks
                .unwrap_or(defaults.enable_detailed_checks),
        }
    }

    pub(crate) fn schedule(&self) -> ScheduleConfig {
        let defaults = ScheduleConfig::default();
        let section = &self.schedule;

        ScheduleConfig {
            health_interval: section
                .health_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.health_interval),
            catalog_interval: section
                .catalog_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.catalog_interval),
            cleanup_interval: section
                .cleanup_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            max_cleanup_retries: section
                .max_cleanup_retries
                .unwrap_or(defaults.max_cleanup_retries),
        }
    }

    pub(crate) fn fetch_timeout(&self) -> Duration {
        self.catalog
            .fetch_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10))
    }
}

fn get_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME");

    if let Some(home) = home {
        let home = PathBuf::from(home);

        const USER_PATHS: [&str; 2] = [".config/modelwatch/config.toml", ".modelwatch.toml"];

        for &path in USER_PATHS.iter() {
            let fullpath = home.join(path);

            if fullpath.exists() {
                return Some(fullpath);
            }
        }
    }

    let system_config = PathBuf::from("/etc/modelwatch.toml");

    if system_config.exists() {
        Some(system_config)
    } else {
        None
    }
}

fn parse_config_or_die<S: serde::de::DeserializeOwned>(config: &str) -> S {
    let r: Result<S, toml::de::Error> = toml::de::from_str(config);

    match r {
        Ok(s) => s,
        Err(err) => die::die!("failed to parse config: {}", err),
    }
}

fn warn_on_extra_fields_helper<'a>(
    path: &mut Vec<&'a String>,
    user_config: &'a toml::Table,
    config: &'a toml::Table,
) {
    for (user_key, user_value) in user_config {
        path.push(user_key);

        if let Some(config_value) = config.get(user_key) {
            if let (toml::Value::Table(user_value), toml::Value::Table(config_value)) =
                (user_value, config_value)
            {
                warn_on_extra_fields_helper(path, user_value, config_value)
            }
        } else {
            let path: Vec<&str> = path.iter().map(|&s| s.as_str()).collect();

            eprintln!(
                "warning: config contains extraneous key \"{}\", ignoring",
                path.join(".")
            );
        }

        path.pop();
    }
}

/// Compares the user's TOML against the reserialized parsed config and
/// warns about keys that exist only on the user's side. Provider tables
/// survive the round trip, so arbitrary provider names never warn.
fn warn_on_extra_fields(config: &Config, raw_config: &str) {
    let user_config: toml::Table = parse_config_or_die(raw_config);

    let config: toml::Table = {
        let serialized_config =
            toml::ser::to_string(&config).expect("failed to reserialize config");

        parse_config_or_die(&serialized_config)
    };

    let mut path = Vec::new();

    warn_on_extra_fields_helper(&mut path, &user_config, &config);
}

pub(crate) fn read_config(config: Option<PathBuf>) -> Config {
    let config_path = config.or_else(get_config_path);

    if let Some(path) = config_path {
        let raw_config = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => die::die!("failed to read config {}: {}", path.display(), err),
        };

        let config: Config = parse_config_or_die(&raw_config);

        warn_on_extra_fields(&config, &raw_config);

        config
    } else {
        Config::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
[parser]
cache_ttl_secs = 60
cache_capacity = 32

[reconciler]
remove_stale = false
stale_threshold_days = 3
provider_stale_days = 14
retry_attempts = 5

[health]
unhealthy_threshold = 4
probe_timeout_secs = 5

[schedule]
health_interval_secs = 30

[catalog]
snapshot_path = "/var/lib/modelwatch/catalog.json"

[providers.openai]
base_url = "https://api.openai.com/v1"
priority = 50
critical = true

[providers.local-ollama]
base_url = "http://localhost:11434"
models_path = "/api/tags"
enabled = false
"#;

    #[test]
    fn parses_every_section() {
        let config: Config = toml::de::from_str(FULL_CONFIG).unwrap();

        assert_eq!(config.engine_config().cache_ttl, Duration::from_secs(60));
        assert_eq!(config.engine_config().cache_capacity, 32);

        let options = config.reconcile_options();
        assert!(!options.remove_stale);
        assert_eq!(options.stale_threshold, chrono::Duration::days(3));
        assert_eq!(options.provider_stale_threshold, chrono::Duration::days(14));
        assert_eq!(options.retry_attempts, 5);

        let thresholds = config.health_thresholds();
        assert_eq!(thresholds.unhealthy_threshold, 4);
        assert_eq!(thresholds.probe_timeout, Duration::from_secs(5));
        // unset knobs fall back to defaults
        assert_eq!(thresholds.recovery_threshold, 2);

        assert_eq!(config.schedule().health_interval, Duration::from_secs(30));
        assert_eq!(config.providers.len(), 2);

        let ollama = &config.providers["local-ollama"];
        assert_eq!(ollama.models_path.as_deref(), Some("/api/tags"));
        assert_eq!(ollama.enabled, Some(false));
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config: Config = toml::de::from_str("").unwrap();

        assert_eq!(config.reconcile_options().stale_threshold, chrono::Duration::days(7));
        assert_eq!(config.health_thresholds().unhealthy_threshold, 3);
        assert_eq!(config.schedule().catalog_interval, Duration::from_secs(3600));
        assert!(config.providers.is_empty());
    }
}
