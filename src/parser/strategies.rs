//! Built-in strategies for the provider response shapes seen in the wild.
//!
//! Registration order matters: Hugging Face hub listings are plain JSON
//! arrays, so `huggingface_hub` must be probed before the generic
//! `bare_array` strategy or its metadata would be dropped on the floor.

use serde_json::Value;

use crate::parser::strategy::ParseStrategy;
use crate::parser::{RawModel, StrategyError};

/// Built-ins in registration order.
pub(crate) fn builtins() -> Vec<Box<dyn ParseStrategy>> {
    vec![
        Box::new(OpenAiList),
        Box::new(HuggingFaceHub),
        Box::new(BareArray),
        Box::new(NestedCatalog),
    ]
}

fn lift_all(entries: &[Value]) -> Vec<RawModel> {
    entries.iter().filter_map(RawModel::from_value).collect()
}

/// `{"data": [{"id": ...}]}`, with `{"choices": [...]}` as the older
/// completion-style variant.
pub(crate) struct OpenAiList;

impl OpenAiList {
    fn entries<'v>(raw: &'v Value) -> Option<&'v Vec<Value>> {
        let object = raw.as_object()?;

        object
            .get("data")
            .or_else(|| object.get("choices"))
            .and_then(Value::as_array)
    }
}

impl ParseStrategy for OpenAiList {
    fn name(&self) -> &'static str {
        "openai_list"
    }

    fn can_handle(&self, raw: &Value) -> bool {
        Self::entries(raw).is_some()
    }

    fn extract(&self, raw: &Value) -> Result<Vec<RawModel>, StrategyError> {
        let entries = Self::entries(raw).ok_or(StrategyError::MalformedField("data"))?;

        Ok(lift_all(entries))
    }

    fn certainty(&self) -> f64 {
        0.95
    }
}

/// Hub-style listing: a JSON array whose objects carry `pipeline_tag`,
/// `tags`, `private`, `gated`, or `modelId` fields.
pub(crate) struct HuggingFaceHub;

const HUB_MARKERS: [&str; 5] = ["pipeline_tag", "tags", "private", "gated", "modelId"];

impl ParseStrategy for HuggingFaceHub {
    fn name(&self) -> &'static str {
        "huggingface_hub"
    }

    fn can_handle(&self, raw: &Value) -> bool {
        let Some(entries) = raw.as_array() else {
            return false;
        };

        entries.iter().any(|entry| {
            entry
                .as_object()
                .map(|o| HUB_MARKERS.iter().any(|&marker| o.contains_key(marker)))
                .unwrap_or(false)
        })
    }

    fn extract(&self, raw: &Value) -> Result<Vec<RawModel>, StrategyError> {
        let entries = raw.as_array().ok_or(StrategyError::MalformedField("array"))?;

        Ok(lift_all(entries))
    }
}

/// A bare JSON array of model names, or of objects with an id/name-like
/// field.
pub(crate) struct BareArray;

impl ParseStrategy for BareArray {
    fn name(&self) -> &'static str {
        "bare_array"
    }

    fn can_handle(&self, raw: &Value) -> bool {
        let Some(entries) = raw.as_array() else {
            return false;
        };

        !entries.is_empty()
            && entries
                .iter()
                .all(|entry| RawModel::from_value(entry).is_some())
    }

    fn extract(&self, raw: &Value) -> Result<Vec<RawModel>, StrategyError> {
        let entries = raw.as_array().ok_or(StrategyError::MalformedField("array"))?;

        Ok(lift_all(entries))
    }

    fn certainty(&self) -> f64 {
        0.8
    }
}

/// `{"models": [...]}` or `{"catalog": {"models": [...]}}`.
pub(crate) struct NestedCatalog;

impl NestedCatalog {
    fn entries<'v>(raw: &'v Value) -> Option<&'v Vec<Value>> {
        let object = raw.as_object()?;

        if let Some(models) = object.get("models").and_then(Value::as_array) {
            return Some(models);
        }

        object
            .get("catalog")?
            .as_object()?
            .get("models")
            .and_then(Value::as_array)
    }
}

impl ParseStrategy for NestedCatalog {
    fn name(&self) -> &'static str {
        "nested_catalog"
    }

    fn can_handle(&self, raw: &Value) -> bool {
        Self::entries(raw).is_some()
    }

    fn extract(&self, raw: &Value) -> Result<Vec<RawModel>, StrategyError> {
        let entries = Self::entries(raw).ok_or(StrategyError::MalformedField("models"))?;

        Ok(lift_all(entries))
    }

    fn certainty(&self) -> f64 {
        0.85
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::strategy::StrategyRegistry;
    use serde_json::json;

    const OPENAI_LISTING: &str = r#"
    {
        "object": "list",
        "data": [
            {"id": "gpt-4o", "object": "model", "owned_by": "openai"},
            {"id": "text-embedding-3-small", "object": "model", "owned_by": "openai"}
        ]
    }"#;

    const HUB_LISTING: &str = r#"
    [
        {"modelId": "org/bert", "pipeline_tag": "fill-mask", "private": false, "gated": false, "downloads": 5000},
        {"modelId": "org/llama-ft", "tags": ["text-generation"], "private": false, "gated": true}
    ]"#;

    #[test]
    fn openai_list_extracts_in_order() {
        let raw: Value = serde_json::from_str(OPENAI_LISTING).unwrap();
        let strategy = OpenAiList;

        assert!(strategy.can_handle(&raw));

        let models = strategy.extract(&raw).unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "gpt-4o");
        assert_eq!(models[1].id, "text-embedding-3-small");
    }

    #[test]
    fn openai_list_accepts_choices_variant() {
        let raw = json!({"choices": [{"id": "davinci"}]});

        assert!(OpenAiList.can_handle(&raw));
        assert_eq!(OpenAiList.extract(&raw).unwrap()[0].id, "davinci");
    }

    #[test]
    fn hub_listing_keeps_gating_metadata() {
        let raw: Value = serde_json::from_str(HUB_LISTING).unwrap();
        let strategy = HuggingFaceHub;

        assert!(strategy.can_handle(&raw));

        let models = strategy.extract(&raw).unwrap();

        assert_eq!(models[0].downloads, Some(5000));
        assert_eq!(models[1].gated, Some(true));
    }

    #[test]
    fn bare_array_of_strings() {
        let raw = json!(["llama3", "gemma:2b"]);
        let strategy = BareArray;

        assert!(strategy.can_handle(&raw));

        let models = strategy.extract(&raw).unwrap();

        assert_eq!(models[0].id, "llama3");
        assert_eq!(models[1].id, "gemma:2b");
    }

    #[test]
    fn bare_array_rejects_unliftable_entries() {
        assert!(!BareArray.can_handle(&json!([{"context": 8192}])));
        assert!(!BareArray.can_handle(&json!([])));
        assert!(!BareArray.can_handle(&json!({"data": []})));
    }

    #[test]
    fn nested_catalog_both_nestings() {
        let flat = json!({"models": [{"name": "m1"}]});
        let deep = json!({"catalog": {"models": [{"name": "m2"}]}});

        assert_eq!(NestedCatalog.extract(&flat).unwrap()[0].id, "m1");
        assert_eq!(NestedCatalog.extract(&deep).unwrap()[0].id, "m2");
    }

    /// A hub listing is also a valid bare array; the registry must hand it
    /// to the hub strategy because of registration order.
    #[test]
    fn hub_listing_wins_over_bare_array() {
        let raw: Value = serde_json::from_str(HUB_LISTING).unwrap();
        let registry = StrategyRegistry::with_builtins();

        assert!(BareArray.can_handle(&raw));
        assert_eq!(registry.claimant(&raw).unwrap().name(), "huggingface_hub");
    }
}
