//! Best-effort structural scan for responses no strategy claims.
//!
//! The scan walks the object graph depth-first and stops at the first
//! array-valued field whose elements look like model descriptors, checking
//! the arrays of each object before recursing into its children. It is intentionally loose: the goal is to salvage a model
//! list from a shape nobody has written a strategy for yet, not to
//! validate it.

use serde_json::Value;

use crate::parser::RawModel;

/// Certainty assigned to fallback-extracted results.
pub(crate) const CERTAINTY: f64 = 0.5;

pub(crate) fn scan(raw: &Value) -> Option<Vec<RawModel>> {
    match raw {
        Value::Array(entries) => {
            if let Some(models) = lift_model_array(entries) {
                return Some(models);
            }

            // not a model array itself; maybe one of its elements holds one
            entries.iter().find_map(scan)
        }
        Value::Object(object) => {
            // arrays at this level first, then recursion into children
            for value in object.values() {
                if let Value::Array(entries) = value {
                    if let Some(models) = lift_model_array(entries) {
                        return Some(models);
                    }
                }
            }

            object.values().find_map(scan)
        }
        _ => None,
    }
}

/// An array qualifies when every element can be lifted into a model
/// descriptor and at least one element exists.
fn lift_model_array(entries: &[Value]) -> Option<Vec<RawModel>> {
    if entries.is_empty() {
        return None;
    }

    let models: Vec<RawModel> = entries.iter().filter_map(RawModel::from_value).collect();

    if models.len() == entries.len() {
        Some(models)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_deeply_nested_model_array() {
        let raw = json!({"weird": {"nested": [{"modelId": "x"}]}});

        let models = scan(&raw).unwrap();

        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "x");
    }

    #[test]
    fn finds_array_of_strings() {
        let raw = json!({"payload": {"names": ["m1", "m2"]}});

        let models = scan(&raw).unwrap();

        assert_eq!(models[0].id, "m1");
        assert_eq!(models[1].id, "m2");
    }

    #[test]
    fn shallow_array_wins_over_deeper_one() {
        let raw = json!({
            "entries": [{"name": "shallow"}],
            "deep": {"entries": [{"name": "deep"}]}
        });

        let models = scan(&raw).unwrap();

        assert_eq!(models[0].id, "shallow");
    }

    #[test]
    fn nothing_liftable_yields_none() {
        assert!(scan(&json!({"counts": [1, 2, 3]})).is_none());
        assert!(scan(&json!({"flag": true})).is_none());
        assert!(scan(&json!("just a string")).is_none());
    }

    #[test]
    fn mixed_array_is_not_a_model_array() {
        // one unliftable element disqualifies the whole array
        assert!(scan(&json!({"data": [{"id": "ok"}, 42]})).is_none());
    }
}
