//! Map algebra over `serde_json::Value`.
//!
//! Parameter bags, generated templates and mirrored entities are all plain
//! JSON maps; the overlay and comparison rules below are shared by the
//! parameter resolver, the mirror store and the reconciler.

use serde_json::{Map, Value};

/// Inserts entries of `src` into `dst` for keys `dst` does not have yet.
pub fn map_add(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (k, v) in src {
        if !dst.contains_key(k) {
            dst.insert(k.clone(), v.clone());
        }
    }
}

/// Overwrites entries of `dst` with values from `src`, but only for keys
/// that already exist in `dst`. Keys unique to `src` are dropped.
pub fn map_replace(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (k, v) in src {
        if dst.contains_key(k) {
            dst.insert(k.clone(), v.clone());
        }
    }
}

/// Shallow merge: every entry of `src` is written into `dst`, overwriting
/// existing keys. This is the patch-update semantics of the mirror store.
pub fn map_combine(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (k, v) in src {
        dst.insert(k.clone(), v.clone());
    }
}

/// Structural match of `value` against `criteria`.
///
/// A null criteria matches anything. Map criteria match when every one of
/// their entries matches the corresponding entry of the candidate (the
/// candidate may carry extra keys). Arrays must agree in length and match
/// element-wise. Numbers compare as floats because JSON decoding does not
/// preserve the integer/float distinction.
#[must_use]
pub fn interface_equals(criteria: &Value, value: &Value) -> bool {
    if criteria.is_null() {
        return true;
    }
    subset_equals(criteria, value)
}

fn subset_equals(criteria: &Value, value: &Value) -> bool {
    match (criteria, value) {
        (Value::Object(cm), Value::Object(vm)) => cm
            .iter()
            .all(|(k, cv)| vm.get(k).is_some_and(|vv| subset_equals(cv, vv))),
        (Value::Array(ca), Value::Array(va)) => {
            ca.len() == va.len() && ca.iter().zip(va).all(|(c, v)| subset_equals(c, v))
        }
        (Value::Number(a), Value::Number(b)) => number_equals(a, b),
        _ => criteria == value,
    }
}

/// Strict deep equality with integer/float unification. Unlike
/// [`interface_equals`] both sides must have exactly the same shape.
#[must_use]
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(am), Value::Object(bm)) => {
            am.len() == bm.len()
                && am
                    .iter()
                    .all(|(k, av)| bm.get(k).is_some_and(|bv| deep_equals(av, bv)))
        }
        (Value::Array(aa), Value::Array(ba)) => {
            aa.len() == ba.len() && aa.iter().zip(ba).all(|(x, y)| deep_equals(x, y))
        }
        (Value::Number(an), Value::Number(bn)) => number_equals(an, bn),
        _ => a == b,
    }
}

fn number_equals(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Coerces a parameter bag into the string pairs an HTTP request wants.
/// String values are used verbatim, everything else is rendered as JSON.
#[must_use]
pub fn to_string_pairs(map: &Map<String, Value>) -> Vec<(String, String)> {
    map.iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect()
}

/// Renders a single value the way it should appear inside a URL or header.
#[must_use]
pub fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
