//! Canonical JSON: object keys sorted, compact separators.
//!
//! Values round-trip through `serde_json::Value`, whose map type is ordered,
//! so struct field order never leaks into the output.

use serde::Serialize;

/// Serialize `value` to canonical JSON text.
pub fn to_canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}

/// True when both values serialize to the same canonical text.
pub fn canonical_eq<A: Serialize, B: Serialize>(left: &A, right: &B) -> serde_json::Result<bool> {
    Ok(to_canonical_json(left)? == to_canonical_json(right)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Unsorted {
        zeta: u8,
        alpha: &'static str,
    }

    #[test]
    fn sorts_keys_and_drops_whitespace() {
        let unsorted = Unsorted {
            zeta: 1,
            alpha: "a",
        };
        let text = to_canonical_json(&unsorted).expect("serialize");
        assert_eq!(text, r#"{"alpha":"a","zeta":1}"#);
    }

    #[test]
    fn nested_objects_are_sorted() {
        let value = json!({"b": {"d": 1, "c": [ {"y": 2, "x": 1} ]}, "a": null});
        let text = to_canonical_json(&value).expect("serialize");
        assert_eq!(text, r#"{"a":null,"b":{"c":[{"x":1,"y":2}],"d":1}}"#);
        let reordered = json!({"a": null, "b": {"d": 1, "c": [{"x": 1, "y": 2}]}});
        assert!(canonical_eq(&value, &reordered).expect("compare"));
    }
}
