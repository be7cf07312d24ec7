//! Provider descriptors, the validated provider registry, and catalog
//! fetching.
//!
//! Providers come from configuration and are validated once, at registry
//! construction. A bad provider entry is a configuration contract
//! violation and is fatal at the CLI surface; everything downstream can
//! then assume `base_url` parses and `name` is non-empty.
//!
//! Fetching is injected behind the [`CatalogFetcher`] trait so the
//! reconciler and the tests never depend on live HTTP.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::parser::ParseErrorKind;

const DEFAULT_MODELS_PATH: &str = "/models";
const DEFAULT_PRIORITY: u8 = 10;

#[derive(Debug, Clone)]
pub(crate) struct Provider {
    pub name: String,
    pub base_url: String,
    pub models_path: String,
    pub api_key: Option<String>,
    pub rate_limit: Option<u32>,
    pub priority: u8,
    pub critical: bool,
    pub enabled: bool,
}

impl Provider {
    pub(crate) fn new(name: &str, base_url: &str) -> Provider {
        Provider {
            name: name.to_string(),
            base_url: base_url.to_string(),
            models_path: DEFAULT_MODELS_PATH.to_string(),
            api_key: None,
            rate_limit: None,
            priority: DEFAULT_PRIORITY,
            critical: false,
            enabled: true,
        }
    }

    pub(crate) fn models_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.models_path.trim_start_matches('/');

        format!("{base}/{path}")
    }
}

#[derive(Debug, Error)]
pub(crate) enum ProviderError {
    #[error("provider name must not be empty")]
    EmptyName,

    #[error("provider \"{0}\" has an invalid base url \"{1}\": {2}")]
    InvalidBaseUrl(String, String, #[source] url::ParseError),
}

impl ProviderError {
    pub(crate) fn taxonomy(&self) -> ParseErrorKind {
        ParseErrorKind::ValidationError
    }
}

/// Filter for [`ProviderRegistry::filtered`]. The default filter selects
/// every enabled provider.
#[derive(Debug, Default, Clone)]
pub(crate) struct ProviderFilter {
    /// Restrict to these names; `None` means no name restriction.
    pub names: Option<Vec<String>>,
    pub include_disabled: bool,
    pub only_critical: bool,
}

impl ProviderFilter {
    pub(crate) fn by_name(name: &str) -> ProviderFilter {
        ProviderFilter {
            names: Some(vec![name.to_string()]),
            ..ProviderFilter::default()
        }
    }
}

#[derive(Debug)]
pub(crate) struct ProviderRegistry {
    /// Sorted by descending priority, then name, so iteration order is
    /// stable across runs.
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    pub(crate) fn from_config(config: &Config) -> Result<ProviderRegistry, ProviderError> {
        let mut providers = Vec::with_capacity(config.providers.len());

        for (name, section) in &config.providers {
            if name.trim().is_empty() {
                return Err(ProviderError::EmptyName);
            }

            url::Url::parse(&section.base_url).map_err(|err| {
                ProviderError::InvalidBaseUrl(name.clone(), section.base_url.clone(), err)
            })?;

            // config wins over the environment
            let api_key = section
                .api_key
                .clone()
                .or_else(|| std::env::var(api_key_env_var(name)).ok());

            providers.push(Provider {
                name: name.clone(),
                base_url: section.base_url.clone(),
                models_path: section
                    .models_path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MODELS_PATH.to_string()),
                api_key,
                rate_limit: section.rate_limit,
                priority: section.priority.unwrap_or(DEFAULT_PRIORITY),
                critical: section.critical.unwrap_or(false),
                enabled: section.enabled.unwrap_or(true),
            });
        }

        providers.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));

        Ok(ProviderRegistry { providers })
    }

    pub(crate) fn all(&self) -> &[Provider] {
        &self.providers
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub(crate) fn filtered(&self, filter: &ProviderFilter) -> Vec<&Provider> {
        self.providers
            .iter()
            .filter(|p| p.enabled || filter.include_disabled)
            .filter(|p| !filter.only_critical || p.critical)
            .filter(|p| match &filter.names {
                Some(names) => names.iter().any(|n| n == &p.name),
                None => true,
            })
            .collect()
    }
}

pub(crate) fn api_key_env_var(provider: &str) -> String {
    let upper: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();

    format!("{upper}_API_KEY")
}

#[derive(Debug, Error)]
pub(crate) enum FetchError {
    #[error("provider \"{0}\" is unreachable: {1}")]
    Unreachable(String, #[source] reqwest::Error),

    #[error("provider \"{0}\" answered with status {1}")]
    Status(String, reqwest::StatusCode),

    #[error("provider \"{0}\" returned a body that is not JSON: {1}")]
    NotJson(String, #[source] reqwest::Error),
}

impl FetchError {
    pub(crate) fn taxonomy(&self) -> ParseErrorKind {
        match self {
            FetchError::Unreachable(_, _) | FetchError::Status(_, _) => {
                ParseErrorKind::ProviderUnreachable
            }
            FetchError::NotJson(_, _) => ParseErrorKind::ParsingFailed,
        }
    }
}

/// Fetches one provider's raw model listing. Implementations must apply
/// their own request timeout; callers treat a hung fetch as a bug.
#[async_trait]
pub(crate) trait CatalogFetcher: Send + Sync {
    async fn fetch(&self, provider: &Provider) -> Result<Value, FetchError>;
}

pub(crate) struct HttpCatalogFetcher {
    client: reqwest::Client,
}

impl HttpCatalogFetcher {
    pub(crate) fn new(timeout: Duration) -> HttpCatalogFetcher {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client construction only fails on TLS misconfiguration");

        HttpCatalogFetcher { client }
    }
}

#[async_trait]
impl CatalogFetcher for HttpCatalogFetcher {
    async fn fetch(&self, provider: &Provider) -> Result<Value, FetchError> {
        let mut request = self.client.get(provider.models_url());

        if let Some(api_key) = &provider.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::Unreachable(provider.name.clone(), err))?;

        let status = response.status();

        if !status.is_success() {
            return Err(FetchError::Status(provider.name.clone(), status));
        }

        response
            .json()
            .await
            .map_err(|err| FetchError::NotJson(provider.name.clone(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProviderSection};
    use assert_matches::assert_matches;

    fn config_with(name: &str, base_url: &str) -> Config {
        let mut config = Config::default();

        config.providers.insert(
            name.to_string(),
            ProviderSection {
                base_url: base_url.to_string(),
                ..ProviderSection::default()
            },
        );

        config
    }

    #[test]
    fn invalid_base_url_is_a_validation_error() {
        let config = config_with("acme", "not a url");

        let err = ProviderRegistry::from_config(&config).unwrap_err();

        assert_matches!(err, ProviderError::InvalidBaseUrl(_, _, _));
        assert_eq!(err.taxonomy(), ParseErrorKind::ValidationError);
    }

    #[test]
    fn empty_name_is_rejected() {
        let config = config_with("  ", "https://api.acme.test");

        assert_matches!(
            ProviderRegistry::from_config(&config),
            Err(ProviderError::EmptyName)
        );
    }

    #[test]
    fn models_url_joins_without_doubled_slashes() {
        let mut provider = Provider::new("acme", "https://api.acme.test/");
        provider.models_path = "/v1/models".to_string();

        assert_eq!(provider.models_url(), "https://api.acme.test/v1/models");
    }

    #[test]
    fn filtered_honors_names_and_enabled() {
        let mut config = config_with("acme", "https://api.acme.test");
        config.providers.insert(
            "beta".to_string(),
            ProviderSection {
                base_url: "https://api.beta.test".to_string(),
                enabled: Some(false),
                ..ProviderSection::default()
            },
        );

        let registry = ProviderRegistry::from_config(&config).unwrap();

        assert_eq!(registry.filtered(&ProviderFilter::default()).len(), 1);

        let with_disabled = ProviderFilter {
            include_disabled: true,
            ..ProviderFilter::default()
        };

        assert_eq!(registry.filtered(&with_disabled).len(), 2);
        assert_eq!(registry.filtered(&ProviderFilter::by_name("beta")).len(), 0);
    }

    #[test]
    fn registry_orders_by_priority_then_name() {
        let mut config = config_with("zeta", "https://api.zeta.test");
        config.providers.insert(
            "alpha".to_string(),
            ProviderSection {
                base_url: "https://api.alpha.test".to_string(),
                priority: Some(50),
                ..ProviderSection::default()
            },
        );

        let registry = ProviderRegistry::from_config(&config).unwrap();
        let names: Vec<&str> = registry.all().iter().map(|p| p.name.as_str()).collect();

        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn api_key_env_var_is_sanitized() {
        assert_eq!(api_key_env_var("hugging-face"), "HUGGING_FACE_API_KEY");
        assert_eq!(api_key_env_var("acme"), "ACME_API_KEY");
    }
}
