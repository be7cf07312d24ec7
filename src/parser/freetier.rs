//! Free-tier classification and cost bucketing.
//!
//! Pure functions over untyped pricing and metadata blobs. The decision
//! order is fixed: explicit pricing beats metadata, metadata beats naming
//! heuristics, and anything unclassifiable is treated as not free with zero
//! confidence.

use lazy_static::lazy_static;
use serde_json::Value;

use crate::catalog::{Capability, CostLevel};
use crate::parser::RawModel;

/// Anything at or below this is considered zero cost.
pub(crate) const ZERO_COST_EPSILON: f64 = 1e-6;

lazy_static! {
    /// Substrings that mark a pricing string, name, or tag as free tier.
    pub(crate) static ref FREE_INDICATORS: [&'static str; 9] = [
        "free",
        "trial",
        "demo",
        "preview",
        "beta",
        "community",
        "open-source",
        "academic",
        "gratis",
    ];

    /// Fields of a pricing object that carry a numeric cost.
    static ref COST_FIELDS: [&'static str; 6] = [
        "cost",
        "price",
        "input_cost",
        "output_cost",
        "per_token",
        "per_request",
    ];

    static ref FREE_TIERS: [&'static str; 3] = ["free", "community", "open"];

    static ref PERMISSIVE_LICENSES: [&'static str; 3] = ["mit", "apache", "bsd"];
}

#[derive(Debug, Clone)]
pub(crate) struct PricingAnalysis {
    pub is_free: bool,
    pub cost_level: CostLevel,
    pub confidence: f64,
    /// Which signals produced the verdict, for reporting.
    pub indicators: Vec<String>,
}

impl PricingAnalysis {
    fn free(confidence: f64, indicator: String) -> PricingAnalysis {
        PricingAnalysis {
            is_free: true,
            cost_level: CostLevel::Free,
            confidence,
            indicators: vec![indicator],
        }
    }

    fn unclassified() -> PricingAnalysis {
        PricingAnalysis {
            is_free: false,
            cost_level: CostLevel::Unknown,
            confidence: 0.0,
            indicators: Vec::new(),
        }
    }
}

pub(crate) fn is_free_tier(model: &RawModel, pricing: Option<&Value>) -> bool {
    analyze_model_pricing(model, pricing).is_free
}

pub(crate) fn analyze_model_pricing(model: &RawModel, pricing: Option<&Value>) -> PricingAnalysis {
    if let Some(pricing) = pricing {
        if let Some(analysis) = analyze_pricing_value(model, pricing) {
            return analysis;
        }
    }

    if let Some(analysis) = analyze_metadata(model) {
        return analysis;
    }

    if let Some(indicator) = indicator_in_name_or_tags(model) {
        return PricingAnalysis::free(0.6, indicator);
    }

    PricingAnalysis::unclassified()
}

fn analyze_pricing_value(model: &RawModel, pricing: &Value) -> Option<PricingAnalysis> {
    match pricing {
        Value::Number(n) => {
            let cost = n.as_f64()?;

            if cost <= ZERO_COST_EPSILON {
                Some(PricingAnalysis::free(0.9, "pricing:zero".to_string()))
            } else {
                Some(costed(model, cost))
            }
        }
        Value::String(s) => {
            let lowered = s.to_ascii_lowercase();

            let indicator = FREE_INDICATORS
                .iter()
                .find(|&&ind| lowered.contains(ind))
                .map(|&ind| format!("pricing:{ind}"));

            if let Some(indicator) = indicator {
                return Some(PricingAnalysis::free(0.9, indicator));
            }

            if lowered.contains("$0") || lowered.contains("0.00") {
                return Some(PricingAnalysis::free(0.9, "pricing:zero-string".to_string()));
            }

            None
        }
        Value::Object(object) => {
            let flagged_free = ["free", "is_free"]
                .iter()
                .any(|&flag| object.get(flag).and_then(Value::as_bool) == Some(true));

            if flagged_free {
                return Some(PricingAnalysis::free(0.9, "pricing:flag".to_string()));
            }

            if let Some(tier) = object.get("tier").and_then(Value::as_str) {
                let tier = tier.to_ascii_lowercase();

                if FREE_TIERS.contains(&tier.as_str()) {
                    return Some(PricingAnalysis::free(0.9, format!("tier:{tier}")));
                }
            }

            let costs: Vec<(&str, f64)> = COST_FIELDS
                .iter()
                .filter_map(|&field| {
                    object
                        .get(field)
                        .and_then(Value::as_f64)
                        .map(|cost| (field, cost))
                })
                .collect();

            if let Some(&(field, _)) = costs
                .iter()
                .find(|(_, cost)| *cost <= ZERO_COST_EPSILON)
            {
                return Some(PricingAnalysis::free(0.9, format!("cost-field:{field}")));
            }

            if let Some(&(_, cost)) = costs.first() {
                return Some(costed(model, cost));
            }

            // a quota with no price attached is a free tier in practice
            if object.contains_key("rate_limit") {
                return Some(PricingAnalysis::free(0.7, "rate-limit-only".to_string()));
            }

            None
        }
        _ => None,
    }
}

fn analyze_metadata(model: &RawModel) -> Option<PricingAnalysis> {
    if let Some(object) = model.metadata.as_object() {
        let flagged = ["free", "is_free", "public"]
            .iter()
            .any(|&flag| object.get(flag).and_then(Value::as_bool) == Some(true));

        if flagged {
            return Some(PricingAnalysis::free(0.9, "metadata:flag".to_string()));
        }

        if let Some(license) = object.get("license").and_then(Value::as_str) {
            let lowered = license.to_ascii_lowercase();

            if let Some(&hit) = PERMISSIVE_LICENSES.iter().find(|&&l| lowered.contains(l)) {
                return Some(PricingAnalysis::free(0.7, format!("license:{hit}")));
            }
        }
    }

    // public-repository heuristic: listed, not private, not gated
    if model.private == Some(false) && model.gated == Some(false) {
        return Some(PricingAnalysis::free(0.7, "public-repository".to_string()));
    }

    None
}

fn indicator_in_name_or_tags(model: &RawModel) -> Option<String> {
    let name = model.id.to_ascii_lowercase();

    if let Some(&hit) = FREE_INDICATORS.iter().find(|&&ind| name.contains(ind)) {
        return Some(format!("name:{hit}"));
    }

    for tag in &model.tags {
        let tag = tag.to_ascii_lowercase();

        if let Some(&hit) = FREE_INDICATORS.iter().find(|&&ind| tag.contains(ind)) {
            return Some(format!("tag:{hit}"));
        }
    }

    None
}

fn costed(model: &RawModel, cost: f64) -> PricingAnalysis {
    let capability = primary_capability(model);

    PricingAnalysis {
        is_free: false,
        cost_level: classify_cost_level(cost, capability),
        confidence: 0.9,
        indicators: vec![format!("priced:{capability}")],
    }
}

fn primary_capability(model: &RawModel) -> Capability {
    let capabilities = crate::parser::infer_capabilities(&model.id, &model.tags);

    capabilities
        .into_iter()
        .find(|c| *c != Capability::Other)
        .unwrap_or(Capability::Other)
}

/// Bucketed thresholds per capability class. Units follow the provider
/// convention of USD per thousand units (tokens, images, or embeddings).
/// Capabilities without their own table use the text-generation one.
pub(crate) fn classify_cost_level(cost: f64, capability: Capability) -> CostLevel {
    let (low, medium) = match capability {
        Capability::ImageGeneration => (0.02, 0.08),
        Capability::Embeddings => (0.0001, 0.001),
        Capability::TextGeneration | Capability::Audio | Capability::Other => (0.5, 2.0),
    };

    if cost <= ZERO_COST_EPSILON {
        CostLevel::Free
    } else if cost <= low {
        CostLevel::Low
    } else if cost <= medium {
        CostLevel::Medium
    } else {
        CostLevel::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(id: &str) -> RawModel {
        RawModel::from_id(id)
    }

    #[test]
    fn zero_numeric_pricing_is_free() {
        let analysis = analyze_model_pricing(&model("m"), Some(&json!(0)));

        assert!(analysis.is_free);
        assert_eq!(analysis.cost_level, CostLevel::Free);
        assert_eq!(analysis.confidence, 0.9);
    }

    #[test]
    fn sub_epsilon_pricing_is_free() {
        assert!(is_free_tier(&model("m"), Some(&json!(1e-9))));
        assert!(!is_free_tier(&model("m"), Some(&json!(0.002))));
    }

    #[test]
    fn string_pricing_indicators() {
        for s in ["Free tier", "public BETA", "$0 / month", "0.00 USD", "gratis"] {
            assert!(is_free_tier(&model("m"), Some(&json!(s))), "{s} should be free");
        }

        assert!(!is_free_tier(&model("m"), Some(&json!("$12 per month"))));
    }

    #[test]
    fn pricing_object_flags_and_tiers() {
        assert!(is_free_tier(&model("m"), Some(&json!({"is_free": true}))));
        assert!(is_free_tier(&model("m"), Some(&json!({"tier": "Community"}))));
        assert!(is_free_tier(&model("m"), Some(&json!({"input_cost": 0.0}))));
        assert!(is_free_tier(&model("m"), Some(&json!({"rate_limit": 60}))));

        // a rate limit next to a real price is not a free tier
        assert!(!is_free_tier(
            &model("m"),
            Some(&json!({"rate_limit": 60, "price": 0.8}))
        ));
    }

    #[test]
    fn metadata_license_and_public_repository() {
        let mut licensed = model("m");
        licensed.metadata = json!({"license": "Apache-2.0"});

        let analysis = analyze_model_pricing(&licensed, None);
        assert!(analysis.is_free);
        assert_eq!(analysis.confidence, 0.7);

        let mut public = model("m");
        public.private = Some(false);
        public.gated = Some(false);

        assert!(is_free_tier(&public, None));

        let mut gated = model("m");
        gated.private = Some(false);
        gated.gated = Some(true);

        assert!(!is_free_tier(&gated, None));
    }

    #[test]
    fn name_indicator_is_last_resort() {
        let analysis = analyze_model_pricing(&model("llama-3-free"), None);

        assert!(analysis.is_free);
        assert_eq!(analysis.confidence, 0.6);
        assert_eq!(analysis.indicators, vec!["name:free"]);
    }

    #[test]
    fn unclassifiable_has_zero_confidence() {
        let analysis = analyze_model_pricing(&model("mystery-model"), None);

        assert!(!analysis.is_free);
        assert_eq!(analysis.cost_level, CostLevel::Unknown);
        assert_eq!(analysis.confidence, 0.0);
    }

    #[test]
    fn cost_level_buckets_per_capability() {
        assert_eq!(
            classify_cost_level(0.3, Capability::TextGeneration),
            CostLevel::Low
        );
        assert_eq!(
            classify_cost_level(1.2, Capability::TextGeneration),
            CostLevel::Medium
        );
        assert_eq!(
            classify_cost_level(8.0, Capability::TextGeneration),
            CostLevel::High
        );
        assert_eq!(
            classify_cost_level(0.05, Capability::ImageGeneration),
            CostLevel::Medium
        );
        assert_eq!(
            classify_cost_level(0.05, Capability::Embeddings),
            CostLevel::High
        );
        // unknown capability classes borrow the text thresholds
        assert_eq!(classify_cost_level(0.3, Capability::Other), CostLevel::Low);
    }

    #[test]
    fn explicit_pricing_beats_name_heuristic() {
        // name says free, pricing says otherwise
        let analysis = analyze_model_pricing(&model("free-model"), Some(&json!(1.5)));

        assert!(!analysis.is_free);
        assert_eq!(analysis.cost_level, CostLevel::Medium);
    }
}
