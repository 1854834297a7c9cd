//! Structural containment for payload documents
//!
//! Payloads and read filters are untyped JSON documents. A filter matches a
//! payload when every key/value pair of the filter is present, with an equal
//! value, in the payload. Extra payload keys are ignored. This is the same
//! relation as the engine's `jsonb @>` operator.

use serde_json::{Map, Number, Value};

/// An empty filter, which matches every payload
pub fn empty_filter() -> Value {
    Value::Object(Map::new())
}

/// Whether `filter` is empty (`null` or `{}`)
pub fn is_empty_filter(filter: &Value) -> bool {
    match filter {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Returns true when `payload` structurally contains `filter`.
///
/// Only at the top level may a scalar filter match an array payload holding
/// it. Nested values must have the same type to match.
pub fn contains(payload: &Value, filter: &Value) -> bool {
    match (payload, filter) {
        (Value::Array(p), scalar) if !scalar.is_object() && !scalar.is_array() => {
            p.iter().any(|pv| scalar_eq(pv, scalar))
        }
        _ => contains_nested(payload, filter),
    }
}

fn contains_nested(payload: &Value, filter: &Value) -> bool {
    match (payload, filter) {
        (Value::Object(p), Value::Object(f)) => f
            .iter()
            .all(|(key, fv)| p.get(key).is_some_and(|pv| contains_nested(pv, fv))),
        // Every filter element must be contained in some payload element
        (Value::Array(p), Value::Array(f)) => {
            f.iter().all(|fv| p.iter().any(|pv| contains_nested(pv, fv)))
        }
        (p, f) => scalar_eq(p, f),
    }
}

/// Numbers compare by exact value, so `1` and `1.0` are equal
fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_eq(x, y),
        _ => a == b,
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn number_eq(x: &Number, y: &Number) -> bool {
    match (as_integer(x), as_integer(y)) {
        (Some(a), Some(b)) => a == b,
        (Some(i), None) => float_is_integer(y, i),
        (None, Some(i)) => float_is_integer(x, i),
        (None, None) => x.as_f64() == y.as_f64(),
    }
}

/// Whether the float `n` is exactly the integer `i`
fn float_is_integer(n: &Number, i: i128) -> bool {
    // 2^64 bounds every integer serde_json can hold
    const LIMIT: f64 = 18_446_744_073_709_551_616.0;
    n.as_f64()
        .is_some_and(|f| f.fract() == 0.0 && f.abs() <= LIMIT && f as i128 == i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(contains(&json!({"a": 1}), &empty_filter()));
        assert!(contains(&json!({}), &json!({})));
        assert!(is_empty_filter(&Value::Null));
        assert!(!is_empty_filter(&json!({"a": 1})));
    }

    #[test]
    fn test_extra_payload_keys_ignored() {
        let payload = json!({"kind": "order", "id": 9, "lines": 3});
        assert!(contains(&payload, &json!({"kind": "order"})));
        assert!(!contains(&payload, &json!({"kind": "refund"})));
        assert!(!contains(&payload, &json!({"missing": null})));
    }

    #[test]
    fn test_nested_documents() {
        let payload = json!({"meta": {"region": "eu", "tier": 2}, "n": 1});
        assert!(contains(&payload, &json!({"meta": {"region": "eu"}})));
        assert!(!contains(&payload, &json!({"meta": {"region": "us"}})));
        assert!(!contains(&payload, &json!({"meta": "eu"})));
    }

    #[test]
    fn test_arrays() {
        let payload = json!({"tags": ["a", "b", "c"], "items": [{"sku": 1, "qty": 2}]});
        assert!(contains(&payload, &json!({"tags": ["c", "a"]})));
        assert!(!contains(&payload, &json!({"tags": "b"})));
        assert!(!contains(&payload, &json!({"tags": ["z"]})));
        assert!(contains(&payload, &json!({"items": [{"sku": 1}]})));
    }

    #[test]
    fn test_scalar_in_array_only_at_top_level() {
        assert!(contains(&json!(["a", "b"]), &json!("b")));
        assert!(!contains(&json!(["a", "b"]), &json!("z")));
        assert!(!contains(&json!({"tags": ["a", "b"]}), &json!({"tags": "b"})));
        assert!(!contains(&json!([["a", "b"]]), &json!(["a"])));
    }

    #[test]
    fn test_numeric_equality() {
        assert!(contains(&json!({"n": 1.0}), &json!({"n": 1})));
        assert!(!contains(&json!({"n": 1.5}), &json!({"n": 1})));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let big = u64::MAX;
        let big_float = big as f64;
        assert!(contains(&json!({"n": big}), &json!({"n": big})));
        assert!(!contains(&json!({"n": big}), &json!({"n": big - 1})));
        assert!(!contains(&json!({"n": big}), &json!({"n": big_float})));
        let above_f64_precision = 9_007_199_254_740_993_i64;
        assert!(!contains(
            &json!({"n": above_f64_precision}),
            &json!({"n": 9_007_199_254_740_992.0})
        ));
    }
}
