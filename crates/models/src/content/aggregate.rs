use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value;

/// Content of an AGGREGATE message: one contribution merged, in arrival
/// order, into the aggregate keyed by `(address, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateContent {
    pub address: String,
    pub key: String,
    pub content: JsonMap<String, Value>,
    pub time: f64,
}

/// Shallow-merges `base` with `overlay`, overlay's keys taking precedence --
/// the `⊕` operator of spec §4.5. This mirrors a plain Python dict `.update`
/// call: nested objects are replaced wholesale, not deep-merged.
pub fn merge(base: &JsonMap<String, Value>, overlay: &JsonMap<String, Value>) -> JsonMap<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Folds an ordered sequence of element contents left-to-right with `merge`.
pub fn fold<'a>(elements: impl IntoIterator<Item = &'a JsonMap<String, Value>>) -> JsonMap<String, Value> {
    let mut acc = JsonMap::new();
    for element in elements {
        acc = merge(&acc, element);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overlay_wins() {
        let base: JsonMap<String, Value> = json!({"a": 1, "b": 2}).as_object().unwrap().clone();
        let overlay: JsonMap<String, Value> = json!({"b": 3, "c": 4}).as_object().unwrap().clone();
        let merged = merge(&base, &overlay);
        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(3)));
        assert_eq!(merged.get("c"), Some(&json!(4)));
    }

    #[test]
    fn fold_is_left_to_right() {
        let elements: Vec<JsonMap<String, Value>> = vec![
            json!({"a": 1}).as_object().unwrap().clone(),
            json!({"b": 2}).as_object().unwrap().clone(),
        ];
        let folded = fold(elements.iter());
        assert_eq!(folded, json!({"a": 1, "b": 2}).as_object().unwrap().clone());
    }
}
