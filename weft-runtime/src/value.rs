//! JSON value helpers shared by conditions, queries, bindings and
//! templates.

use serde_json::Value;
use std::cmp::Ordering;

pub use weft_model::display;

/// Follows a dotted path into a value. Numeric segments index arrays.
/// Missing segments resolve to `Null`.
pub fn lookup_path(value: &Value, path: &str) -> Value {
    if path.is_empty() {
        return value.clone();
    }
    let mut current = value;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Writes `new` at a dotted path inside `target`, creating intermediate
/// objects as needed.
pub fn set_path(target: &mut Value, path: &str, new: Value) {
    if path.is_empty() {
        *target = new;
        return;
    }
    let mut current = target;
    for segment in path.split('.') {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map.entry(segment.to_string()).or_insert(Value::Null);
    }
    *current = new;
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Equality that treats numbers and numeric strings as comparable, since
/// form input arrives as text.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (as_number(left), as_number(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Orders numbers (or numeric strings) numerically and strings
/// lexically. Anything else is unordered.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        if let (Ok(x), Ok(y)) = (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
            return x.partial_cmp(&y);
        }
        return Some(a.cmp(b));
    }
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => None,
    }
}

/// Substring for strings, membership for arrays, key presence for objects.
pub fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::String(h), other) => h.contains(&display(other)),
        (Value::Array(items), n) => items.iter().any(|item| loose_eq(item, n)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

/// Null, whitespace-only strings and empty collections are empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
