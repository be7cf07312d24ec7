//! Traits and type definitions for turning arbitrary provider JSON into
//! canonical model records.
//!
//! The `parser` module contains the response-parsing engine and its parts.
//! Parsing is strategy-driven: each known provider response shape is handled
//! by one [`strategy::ParseStrategy`], and the strategies live in an ordered
//! registry where the first strategy to claim a response wins. Registration
//! order is therefore part of the contract, not an implementation detail.
//!
//! ## Strategies and fallback
//!
//! A strategy answers two questions: does this response look like my shape
//! (`can_handle`), and what models are in it (`extract`). When no registered
//! strategy claims a response, a best-effort structural scan
//! ([`fallback`]) walks the object graph looking for the first array whose
//! elements resemble model descriptors. Only when the fallback also comes up
//! empty does the parse fail.
//!
//! ## Error handling
//!
//! A malformed response must never take down an aggregation pass. Strategy
//! and fallback failures are recovered into a [`ParseResult`] carrying a
//! [`ParseErrorKind`] tag; the engine's statistics are the visibility
//! mechanism for persistent failures. Nothing in this module panics on
//! provider input.

pub(crate) mod engine;
pub(crate) mod fallback;
pub(crate) mod freetier;
pub(crate) mod strategies;
pub(crate) mod strategy;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::{Capability, ModelRecord};

/// Failure taxonomy shared by the parsing, fetch, and health layers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ParseErrorKind {
    /// No strategy claimed the response and the fallback scan found nothing.
    ParsingFailed,
    /// A strategy claimed the response but failed while extracting from it.
    ParserException,
    /// The provider could not be reached or the request timed out.
    ProviderUnreachable,
    /// Policy state, not a failure: the provider was skipped because its
    /// health or age disqualified it from this pass.
    StaleProvider,
    /// The provider configuration itself is malformed.
    ValidationError,
}

#[derive(Debug, Error)]
pub(crate) enum StrategyError {
    #[error("expected field \"{0}\" is missing or not the right type")]
    MalformedField(&'static str),

    #[error("response shape changed mid-extraction: {0}")]
    ShapeMismatch(String),
}

/// One model blob lifted out of a provider response, before enrichment.
///
/// `metadata` keeps the originating JSON value so the free-tier classifier
/// can inspect pricing and licensing fields the strategy did not model.
#[derive(Debug, Clone)]
pub(crate) struct RawModel {
    pub id: String,
    pub tags: Vec<String>,
    pub pipeline_tag: Option<String>,
    pub private: Option<bool>,
    pub gated: Option<bool>,
    pub downloads: Option<u64>,
    pub likes: Option<u64>,
    pub metadata: Value,
}

impl RawModel {
    pub(crate) fn from_id(id: &str) -> RawModel {
        RawModel {
            id: id.to_string(),
            tags: Vec::new(),
            pipeline_tag: None,
            private: None,
            gated: None,
            downloads: None,
            likes: None,
            metadata: Value::Null,
        }
    }

    /// Defensive field lookup over an untyped model descriptor. Returns
    /// `None` when no id/name-like field with a usable value is present.
    pub(crate) fn from_value(value: &Value) -> Option<RawModel> {
        if let Some(id) = value.as_str() {
            if id.is_empty() {
                return None;
            }

            return Some(RawModel::from_id(id));
        }

        let object = value.as_object()?;

        let id = ID_KEYS
            .iter()
            .find_map(|&key| object.get(key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| {
                object.iter().find_map(|(key, v)| {
                    if key_is_id_like(key) {
                        v.as_str().map(str::to_string)
                    } else {
                        None
                    }
                })
            })?;

        if id.is_empty() {
            return None;
        }

        let tags = object
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(RawModel {
            id,
            tags,
            pipeline_tag: object
                .get("pipeline_tag")
                .and_then(Value::as_str)
                .map(str::to_string),
            private: object.get("private").and_then(Value::as_bool),
            gated: object.get("gated").and_then(Value::as_bool),
            downloads: object.get("downloads").and_then(Value::as_u64),
            likes: object.get("likes").and_then(Value::as_u64),
            metadata: value.clone(),
        })
    }
}

/// Exact keys tried first, in order, when lifting a model descriptor.
const ID_KEYS: [&str; 7] = [
    "id",
    "name",
    "model",
    "slug",
    "model_id",
    "modelId",
    "model_name",
];

pub(crate) fn key_is_id_like(key: &str) -> bool {
    let key = key.to_ascii_lowercase();

    key == "id"
        || key == "name"
        || key == "model"
        || key == "slug"
        || key.ends_with("id")
        || key.ends_with("name")
        || key.ends_with("model")
        || key.ends_with("slug")
}

/// Capability inference by case-insensitive substring match. The union of
/// every matched tag is returned, so "gpt-4-embed" carries both
/// text-generation and embeddings.
pub(crate) fn infer_capabilities(name: &str, tags: &[String]) -> std::collections::BTreeSet<Capability> {
    const KEYWORDS: [(&str, Capability); 15] = [
        ("embed", Capability::Embeddings),
        ("dall-e", Capability::ImageGeneration),
        ("stable-diffusion", Capability::ImageGeneration),
        ("sdxl", Capability::ImageGeneration),
        ("image", Capability::ImageGeneration),
        ("gpt", Capability::TextGeneration),
        ("claude", Capability::TextGeneration),
        ("llama", Capability::TextGeneration),
        ("mistral", Capability::TextGeneration),
        ("gemma", Capability::TextGeneration),
        ("qwen", Capability::TextGeneration),
        ("text-generation", Capability::TextGeneration),
        ("chat", Capability::TextGeneration),
        ("whisper", Capability::Audio),
        ("tts", Capability::Audio),
    ];

    let mut haystacks: Vec<String> = Vec::with_capacity(tags.len() + 1);
    haystacks.push(name.to_ascii_lowercase());
    haystacks.extend(tags.iter().map(|t| t.to_ascii_lowercase()));

    let mut capabilities = std::collections::BTreeSet::new();

    for haystack in &haystacks {
        for (keyword, capability) in KEYWORDS {
            if haystack.contains(keyword) {
                capabilities.insert(capability);
            }
        }
    }

    if capabilities.is_empty() {
        capabilities.insert(Capability::Other);
    }

    capabilities
}

/// Output of one parsing attempt. Never mutated after creation; the engine
/// cache hands out clones.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ParseResult {
    pub strategy_used: String,
    pub fallback_used: bool,
    /// Models in provider-returned order.
    pub models: Vec<ModelRecord>,
    pub error: Option<ParseErrorKind>,
    pub confidence: f64,
}

impl ParseResult {
    pub(crate) fn failed(strategy_used: &str, fallback_used: bool, kind: ParseErrorKind) -> ParseResult {
        ParseResult {
            strategy_used: strategy_used.to_string(),
            fallback_used,
            models: Vec::new(),
            error: Some(kind),
            confidence: 0.0,
        }
    }

    pub(crate) fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Models split into the full set and the free subset, both in
/// provider-returned order.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ModelPartition {
    pub all: Vec<ModelRecord>,
    pub free: Vec<ModelRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifts_model_from_plain_string() {
        let raw = RawModel::from_value(&json!("gpt-4o")).unwrap();

        assert_eq!(raw.id, "gpt-4o");
        assert!(raw.tags.is_empty());
    }

    #[test]
    fn lifts_model_from_alternate_id_keys() {
        for key in ["id", "name", "model", "slug", "modelId", "model_name"] {
            let raw = RawModel::from_value(&json!({ key: "m" })).unwrap();

            assert_eq!(raw.id, "m", "key {key} should be id-like");
        }
    }

    #[test]
    fn rejects_descriptor_without_id() {
        assert!(RawModel::from_value(&json!({"context_length": 8192})).is_none());
        assert!(RawModel::from_value(&json!("")).is_none());
        assert!(RawModel::from_value(&json!(42)).is_none());
    }

    #[test]
    fn captures_hub_metadata() {
        let raw = RawModel::from_value(&json!({
            "modelId": "org/bert",
            "pipeline_tag": "fill-mask",
            "tags": ["pytorch", "bert"],
            "private": false,
            "gated": false,
            "downloads": 120000,
            "likes": 37
        }))
        .unwrap();

        assert_eq!(raw.pipeline_tag.as_deref(), Some("fill-mask"));
        assert_eq!(raw.tags, vec!["pytorch", "bert"]);
        assert_eq!(raw.private, Some(false));
        assert_eq!(raw.downloads, Some(120000));
    }

    #[test]
    fn capability_inference_unions_matches() {
        let caps = infer_capabilities("gpt-4-embed", &[]);

        assert!(caps.contains(&Capability::TextGeneration));
        assert!(caps.contains(&Capability::Embeddings));
    }

    #[test]
    fn capability_inference_reads_tags() {
        let caps = infer_capabilities("mysterious-7b", &["text-generation".to_string()]);

        assert_eq!(caps.len(), 1);
        assert!(caps.contains(&Capability::TextGeneration));
    }

    #[test]
    fn unmatched_capability_defaults_to_other() {
        let caps = infer_capabilities("bert-base-uncased", &[]);

        assert!(caps.contains(&Capability::Other));
    }
}
