//! The ordered strategy registry.
//!
//! Strategies are stateless and shareable; the registry owns them behind
//! trait objects. Resolution is first-match: the registry walks its list in
//! order and the first strategy whose `can_handle` returns true is used.
//! Order is the only tie-break mechanism, so insertion position is part of
//! the public contract: `High` priority inserts at the head, `Low` appends
//! at the tail.

use serde_json::Value;

use crate::parser::{RawModel, StrategyError};

pub(crate) trait ParseStrategy: Send + Sync {
    /// Stable name, used as the `source` of every record this strategy
    /// produces and as the handle for [`StrategyRegistry::remove`].
    fn name(&self) -> &'static str;

    /// Whether this strategy recognizes the response shape. Must be cheap
    /// and must not allocate per call beyond trivial amounts; it runs for
    /// every unclaimed response ahead of it in the list.
    fn can_handle(&self, raw: &Value) -> bool;

    /// Extract raw model descriptors, preserving provider-returned order.
    fn extract(&self, raw: &Value) -> Result<Vec<RawModel>, StrategyError>;

    /// How certain the strategy is that a claimed response was interpreted
    /// correctly. Feeds the parse-result confidence.
    fn certainty(&self) -> f64 {
        0.9
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StrategyPriority {
    /// Insert ahead of every existing strategy.
    High,
    /// Append after every existing strategy.
    Low,
}

pub(crate) struct StrategyRegistry {
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl StrategyRegistry {
    pub(crate) fn new() -> StrategyRegistry {
        StrategyRegistry {
            strategies: Vec::new(),
        }
    }

    /// A registry preloaded with the built-in strategies in their
    /// documented order.
    pub(crate) fn with_builtins() -> StrategyRegistry {
        let mut registry = StrategyRegistry::new();

        for strategy in super::strategies::builtins() {
            registry.register(strategy, StrategyPriority::Low);
        }

        registry
    }

    /// Registration never replaces an existing entry, even under the same
    /// name; call [`StrategyRegistry::remove`] first to swap one out.
    pub(crate) fn register(&mut self, strategy: Box<dyn ParseStrategy>, priority: StrategyPriority) {
        tracing::debug!(strategy = strategy.name(), ?priority, "registering parse strategy");

        match priority {
            StrategyPriority::High => self.strategies.insert(0, strategy),
            StrategyPriority::Low => self.strategies.push(strategy),
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let before = self.strategies.len();

        self.strategies.retain(|s| s.name() != name);

        self.strategies.len() != before
    }

    /// First registered strategy claiming the response, if any.
    pub(crate) fn claimant(&self, raw: &Value) -> Option<&dyn ParseStrategy> {
        self.strategies
            .iter()
            .map(|s| s.as_ref())
            .find(|s| s.can_handle(raw))
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.strategies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClaimAll {
        name: &'static str,
    }

    impl ParseStrategy for ClaimAll {
        fn name(&self) -> &'static str {
            self.name
        }

        fn can_handle(&self, _raw: &Value) -> bool {
            true
        }

        fn extract(&self, _raw: &Value) -> Result<Vec<RawModel>, StrategyError> {
            Ok(vec![RawModel::from_id(self.name)])
        }
    }

    fn claim_all(name: &'static str) -> Box<dyn ParseStrategy> {
        Box::new(ClaimAll { name })
    }

    #[test]
    fn first_registered_wins() {
        let mut registry = StrategyRegistry::new();

        registry.register(claim_all("first"), StrategyPriority::Low);
        registry.register(claim_all("second"), StrategyPriority::Low);

        let claimant = registry.claimant(&serde_json::json!({})).unwrap();

        assert_eq!(claimant.name(), "first");
    }

    #[test]
    fn high_priority_inserts_at_head() {
        let mut registry = StrategyRegistry::new();

        registry.register(claim_all("first"), StrategyPriority::Low);
        registry.register(claim_all("preempt"), StrategyPriority::High);

        assert_eq!(registry.names(), vec!["preempt", "first"]);

        let claimant = registry.claimant(&serde_json::json!({})).unwrap();

        assert_eq!(claimant.name(), "preempt");
    }

    #[test]
    fn remove_by_name() {
        let mut registry = StrategyRegistry::new();

        registry.register(claim_all("first"), StrategyPriority::Low);
        registry.register(claim_all("second"), StrategyPriority::Low);

        assert!(registry.remove("first"));
        assert!(!registry.remove("first"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.claimant(&serde_json::json!({})).unwrap().name(), "second");
    }

    #[test]
    fn builtin_order_is_documented_order() {
        let registry = StrategyRegistry::with_builtins();

        assert_eq!(
            registry.names(),
            vec!["openai_list", "huggingface_hub", "bare_array", "nested_catalog"]
        );
    }
}
