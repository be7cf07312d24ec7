//! The parsing engine: strategy resolution, enrichment, caching, and
//! statistics.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::catalog::ModelRecord;
use crate::parser::strategy::{ParseStrategy, StrategyPriority, StrategyRegistry};
use crate::parser::{fallback, freetier, infer_capabilities};
use crate::parser::{ModelPartition, ParseErrorKind, ParseResult, RawModel};

#[derive(Debug, Clone)]
pub(crate) struct EngineConfig {
    /// How long a cached parse result stays valid.
    pub cache_ttl: Duration,
    /// Cached results beyond this are evicted oldest-first.
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 256,
        }
    }
}

/// Running counters exposed by [`ParserEngine::stats`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub(crate) struct EngineStats {
    pub total_parses: u64,
    pub successful_parses: u64,
    pub failed_parses: u64,
    pub models_extracted: u64,
    pub cache_hits: u64,
    pub success_rate: f64,
}

struct CacheEntry {
    result: ParseResult,
    inserted: Instant,
}

pub(crate) struct ParserEngine {
    registry: StrategyRegistry,
    config: EngineConfig,
    cache: HashMap<String, CacheEntry>,
    /// Cache keys in insertion order, for capacity eviction.
    cache_order: VecDeque<String>,
    stats: EngineStats,
}

impl ParserEngine {
    pub(crate) fn new(config: EngineConfig) -> ParserEngine {
        ParserEngine::with_registry(StrategyRegistry::with_builtins(), config)
    }

    pub(crate) fn with_registry(registry: StrategyRegistry, config: EngineConfig) -> ParserEngine {
        tracing::debug!(
            strategies = ?registry.names(),
            count = registry.len(),
            "parser engine ready"
        );

        ParserEngine {
            registry,
            config,
            cache: HashMap::new(),
            cache_order: VecDeque::new(),
            stats: EngineStats::default(),
        }
    }

    /// Parse one raw provider response into a [`ParseResult`].
    ///
    /// Repeated calls with the same response within the cache TTL return a
    /// clone of the first result and count as cache hits, not as new
    /// parses. Strategy failures are recovered into the result's `error`
    /// tag; this method never panics on provider input.
    pub(crate) fn parse_response(&mut self, raw: &Value, provider: &str) -> ParseResult {
        let key = cache_key(provider, raw);

        if let Some(entry) = self.cache.get(&key) {
            if entry.inserted.elapsed() <= self.config.cache_ttl {
                self.stats.cache_hits += 1;
                tracing::debug!(provider, "parse cache hit");

                return entry.result.clone();
            }
        }

        self.stats.total_parses += 1;

        let result = self.parse_uncached(raw, provider);

        if result.is_success() {
            self.stats.successful_parses += 1;
            self.stats.models_extracted += result.models.len() as u64;
        } else {
            self.stats.failed_parses += 1;
            tracing::warn!(
                provider,
                strategy = %result.strategy_used,
                error = ?result.error,
                "parse failed"
            );
        }

        self.insert_cached(key, result.clone());

        result
    }

    /// Parse and partition into the full model set and the free subset.
    pub(crate) fn extract_models(&mut self, raw: &Value, provider: &str) -> ModelPartition {
        let result = self.parse_response(raw, provider);

        let free = result
            .models
            .iter()
            .filter(|m| m.is_free)
            .cloned()
            .collect();

        ModelPartition {
            all: result.models,
            free,
        }
    }

    pub(crate) fn add_strategy(&mut self, strategy: Box<dyn ParseStrategy>, priority: StrategyPriority) {
        self.registry.register(strategy, priority);
        // the ordering contract changed, cached resolutions may be wrong
        self.clear_cache();
    }

    pub(crate) fn remove_strategy(&mut self, name: &str) -> bool {
        let removed = self.registry.remove(name);

        if removed {
            self.clear_cache();
        }

        removed
    }

    pub(crate) fn stats(&self) -> EngineStats {
        let mut stats = self.stats;

        stats.success_rate = if stats.total_parses == 0 {
            0.0
        } else {
            stats.successful_parses as f64 / stats.total_parses as f64
        };

        stats
    }

    pub(crate) fn reset_stats(&mut self) {
        self.stats = EngineStats::default();
    }

    pub(crate) fn clear_cache(&mut self) {
        self.cache.clear();
        self.cache_order.clear();
    }

    fn parse_uncached(&mut self, raw: &Value, provider: &str) -> ParseResult {
        let (name, certainty, fallback_used, extracted) = match self.registry.claimant(raw) {
            Some(strategy) => (
                strategy.name().to_string(),
                strategy.certainty(),
                false,
                strategy.extract(raw),
            ),
            None => {
                tracing::info!(provider, "no strategy claimed response, engaging fallback");

                match fallback::scan(raw) {
                    Some(models) => ("fallback".to_string(), fallback::CERTAINTY, true, Ok(models)),
                    None => {
                        return ParseResult::failed("fallback", true, ParseErrorKind::ParsingFailed)
                    }
                }
            }
        };

        let raw_models = match extracted {
            Ok(models) => models,
            Err(err) => {
                tracing::warn!(provider, strategy = %name, %err, "strategy failed to extract");

                return ParseResult::failed(&name, fallback_used, ParseErrorKind::ParserException);
            }
        };

        let models = enrich(raw_models, provider, &name);

        let confidence = derive_confidence(certainty, &models);

        ParseResult {
            strategy_used: name,
            fallback_used,
            models,
            error: None,
            confidence,
        }
    }

    fn insert_cached(&mut self, key: String, result: ParseResult) {
        // expired entries first, then oldest beyond capacity
        let ttl = self.config.cache_ttl;
        let expired: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.inserted.elapsed() > ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            self.cache.remove(&key);
        }
        self.cache_order.retain(|k| self.cache.contains_key(k));

        while self.cache.len() >= self.config.cache_capacity.max(1) {
            match self.cache_order.pop_front() {
                Some(oldest) => {
                    self.cache.remove(&oldest);
                }
                None => break,
            }
        }

        self.cache_order.push_back(key.clone());
        self.cache.insert(
            key,
            CacheEntry {
                result,
                inserted: Instant::now(),
            },
        );
    }
}

/// Stable fingerprint of a `(provider, response)` pair.
fn cache_key(provider: &str, raw: &Value) -> String {
    let mut hasher = Sha256::new();

    hasher.update(provider.as_bytes());
    hasher.update([0u8]);
    hasher.update(raw.to_string().as_bytes());

    format!("{:x}", hasher.finalize())
}

fn enrich(raw_models: Vec<RawModel>, provider: &str, source: &str) -> Vec<ModelRecord> {
    let now = Utc::now();

    raw_models
        .into_iter()
        .map(|raw| {
            let mut tags = raw.tags.clone();

            if let Some(pipeline_tag) = &raw.pipeline_tag {
                tags.push(pipeline_tag.clone());
            }

            let capabilities = infer_capabilities(&raw.id, &tags);

            let pricing = raw.metadata.get("pricing");
            let analysis = freetier::analyze_model_pricing(&raw, pricing);

            ModelRecord {
                id: qualified_id(provider, &raw.id),
                provider: provider.to_string(),
                capabilities,
                is_free: analysis.is_free,
                cost_level: analysis.cost_level,
                discovered_at: now,
                last_verified: now,
                source: source.to_string(),
                downloads: raw.downloads,
                likes: raw.likes,
            }
        })
        .collect()
}

fn qualified_id(provider: &str, raw_id: &str) -> String {
    let prefix = format!("{provider}/");

    if raw_id.starts_with(&prefix) {
        raw_id.to_string()
    } else {
        format!("{prefix}{raw_id}")
    }
}

/// Strategy certainty scaled by how confidently the classifier handled the
/// extracted models. An empty extraction keeps the bare certainty floor.
fn derive_confidence(certainty: f64, models: &[ModelRecord]) -> f64 {
    if models.is_empty() {
        return certainty * 0.5;
    }

    let classified = models
        .iter()
        .filter(|m| m.cost_level != crate::catalog::CostLevel::Unknown)
        .count() as f64;

    let classifier_share = classified / models.len() as f64;

    certainty * (0.5 + 0.5 * classifier_share)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::StrategyError;
    use serde_json::json;

    fn engine() -> ParserEngine {
        ParserEngine::new(EngineConfig::default())
    }

    #[test]
    fn cache_hit_is_idempotent() {
        let mut engine = engine();
        let raw = json!({"data": [{"id": "gpt-4o"}]});

        let first = engine.parse_response(&raw, "openai");
        let second = engine.parse_response(&raw, "openai");

        assert_eq!(first.models.len(), second.models.len());
        assert_eq!(first.strategy_used, second.strategy_used);

        let stats = engine.stats();

        assert_eq!(stats.total_parses, 1);
        assert_eq!(stats.successful_parses, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn same_response_different_provider_is_a_fresh_parse() {
        let mut engine = engine();
        let raw = json!({"data": [{"id": "m"}]});

        engine.parse_response(&raw, "alpha");
        engine.parse_response(&raw, "beta");

        assert_eq!(engine.stats().total_parses, 2);
        assert_eq!(engine.stats().cache_hits, 0);
    }

    #[test]
    fn fallback_engages_on_unclaimed_shape() {
        let mut engine = engine();
        let raw = json!({"weird": {"nested": [{"modelId": "x"}]}});

        let result = engine.parse_response(&raw, "oddball");

        assert!(result.fallback_used);
        assert!(result.is_success());
        assert_eq!(result.models[0].id, "oddball/x");
    }

    #[test]
    fn unparseable_response_fails_without_panicking() {
        let mut engine = engine();

        let result = engine.parse_response(&json!({"status": "ok"}), "p");

        assert!(result.fallback_used);
        assert_eq!(result.error, Some(ParseErrorKind::ParsingFailed));
        assert_eq!(engine.stats().failed_parses, 1);
    }

    struct Exploding;

    impl ParseStrategy for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn can_handle(&self, raw: &Value) -> bool {
            raw.get("boom").is_some()
        }

        fn extract(&self, _raw: &Value) -> Result<Vec<RawModel>, StrategyError> {
            Err(StrategyError::ShapeMismatch("synthetic".to_string()))
        }
    }

    #[test]
    fn strategy_failure_is_isolated() {
        let mut engine = engine();
        engine.add_strategy(Box::new(Exploding), StrategyPriority::High);

        let failed = engine.parse_response(&json!({"boom": true}), "p");

        assert_eq!(failed.error, Some(ParseErrorKind::ParserException));

        // the engine keeps working for other inputs
        let ok = engine.parse_response(&json!({"data": [{"id": "m"}]}), "p");

        assert!(ok.is_success());
        assert_eq!(engine.stats().failed_parses, 1);
        assert_eq!(engine.stats().successful_parses, 1);
    }

    #[test]
    fn enrichment_qualifies_ids_and_infers_capabilities() {
        let mut engine = engine();
        let raw = json!({"data": [{"id": "text-embedding-3-small"}]});

        let result = engine.parse_response(&raw, "openai");
        let model = &result.models[0];

        assert_eq!(model.id, "openai/text-embedding-3-small");
        assert_eq!(model.provider, "openai");
        assert!(model
            .capabilities
            .contains(&crate::catalog::Capability::Embeddings));
        assert_eq!(model.source, "openai_list");
    }

    #[test]
    fn already_qualified_ids_are_not_doubled() {
        assert_eq!(qualified_id("hf", "hf/bert"), "hf/bert");
        assert_eq!(qualified_id("hf", "org/bert"), "hf/org/bert");
    }

    #[test]
    fn embedded_pricing_drives_free_partition() {
        let mut engine = engine();
        let raw = json!({"data": [
            {"id": "payg", "pricing": {"input_cost": 0.4}},
            {"id": "promo", "pricing": "free while in beta"}
        ]});

        let partition = engine.extract_models(&raw, "p");

        assert_eq!(partition.all.len(), 2);
        assert_eq!(partition.free.len(), 1);
        assert_eq!(partition.free[0].id, "p/promo");
    }

    #[test]
    fn removing_a_strategy_changes_resolution() {
        let mut engine = engine();
        let hub = json!([{"modelId": "org/bert", "private": false, "gated": false}]);

        assert_eq!(engine.parse_response(&hub, "hf").strategy_used, "huggingface_hub");

        assert!(engine.remove_strategy("huggingface_hub"));

        // cache was cleared, the next claimant in order takes over
        assert_eq!(engine.parse_response(&hub, "hf").strategy_used, "bare_array");
    }

    #[test]
    fn reset_stats_zeroes_counters() {
        let mut engine = engine();

        engine.parse_response(&json!(["m1"]), "p");
        engine.reset_stats();

        let stats = engine.stats();

        assert_eq!(stats.total_parses, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[test]
    fn cache_capacity_is_bounded() {
        let mut engine = ParserEngine::new(EngineConfig {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 2,
        });

        engine.parse_response(&json!(["a"]), "p");
        engine.parse_response(&json!(["b"]), "p");
        engine.parse_response(&json!(["c"]), "p");

        // "a" was evicted, so this is a fresh parse rather than a hit
        engine.parse_response(&json!(["a"]), "p");

        assert_eq!(engine.stats().cache_hits, 0);
        assert_eq!(engine.stats().total_parses, 4);
    }
}
