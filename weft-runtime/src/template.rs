//! `{{path}}` interpolation for action parameters.

use crate::conditions::Resolver;
use crate::value::display;
use serde_json::Value;
use weft_model::JsonMap;

/// Interpolates a string. Unresolved paths render as empty text; an
/// unterminated `{{` is kept literally.
pub fn interpolate_str(template: &str, resolver: &dyn Resolver) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                out.push_str(&display(&resolver.resolve(after[..end].trim())));
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Interpolates every string inside a JSON value. A string that is exactly
/// one `{{path}}` is replaced by the resolved value itself, keeping its
/// type.
pub fn interpolate(value: &Value, resolver: &dyn Resolver) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Some(path) = trimmed.strip_prefix("{{").and_then(|t| t.strip_suffix("}}"))
                && !path.contains("{{")
            {
                return resolver.resolve(path.trim());
            }
            if s.contains("{{") {
                Value::String(interpolate_str(s, resolver))
            } else {
                value.clone()
            }
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| interpolate(v, resolver)).collect())
        }
        Value::Object(map) => Value::Object(interpolate_map(map, resolver)),
        other => other.clone(),
    }
}

pub fn interpolate_map(map: &JsonMap, resolver: &dyn Resolver) -> JsonMap {
    map.iter()
        .map(|(k, v)| (k.clone(), interpolate(v, resolver)))
        .collect()
}
