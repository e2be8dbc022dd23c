//! Pure value transforms applied between a binding source and its target.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// A deterministic, side-effect-free value transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    Uppercase,
    Lowercase,
    Trim,
    ToString,
    ToNumber,
    ToBoolean,
    Not,
    /// Length of an array, string or object.
    Count,
    /// Replaces null/empty with `value`.
    Default { value: Value },
    Prefix { value: String },
    Suffix { value: String },
    Currency {
        #[serde(default = "default_symbol")]
        symbol: String,
        #[serde(default = "default_decimals")]
        decimals: u32,
    },
    Truncate { length: usize },
    /// Formats epoch milliseconds, RFC 3339 strings or `YYYY-MM-DD` dates
    /// with a `strftime` pattern.
    Date {
        #[serde(default = "default_date_format")]
        format: String,
    },
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_symbol() -> String {
    "$".to_string()
}

fn default_decimals() -> u32 {
    2
}

impl Transform {
    /// Applies the transform.
    pub fn apply(&self, value: &Value) -> Value {
        match self {
            Self::Uppercase => map_str(value, |s| s.to_uppercase()),
            Self::Lowercase => map_str(value, |s| s.to_lowercase()),
            Self::Trim => map_str(value, |s| s.trim().to_string()),
            Self::ToString => Value::String(display(value)),
            Self::ToNumber => to_number(value),
            Self::ToBoolean => Value::Bool(truthy(value)),
            Self::Not => Value::Bool(!truthy(value)),
            Self::Count => Value::from(match value {
                Value::Array(a) => a.len(),
                Value::String(s) => s.chars().count(),
                Value::Object(o) => o.len(),
                Value::Null => 0,
                _ => 1,
            }),
            Self::Default { value: fallback } => {
                if is_blank(value) {
                    fallback.clone()
                } else {
                    value.clone()
                }
            }
            Self::Prefix { value: prefix } => {
                Value::String(format!("{prefix}{}", display(value)))
            }
            Self::Suffix { value: suffix } => {
                Value::String(format!("{}{suffix}", display(value)))
            }
            Self::Currency { symbol, decimals } => match value.as_f64() {
                Some(n) => Value::String(format!("{symbol}{n:.prec$}", prec = *decimals as usize)),
                None => value.clone(),
            },
            Self::Truncate { length } => map_str(value, |s| {
                if s.chars().count() > *length {
                    let cut: String = s.chars().take(*length).collect();
                    format!("{cut}…")
                } else {
                    s.to_string()
                }
            }),
            Self::Date { format } => match parse_date(value) {
                Some(date) => Value::String(date.format(format).to_string()),
                None => value.clone(),
            },
        }
    }

    /// Maps a target-side value back to the source side, when the transform
    /// is invertible.
    pub fn inverse(&self, value: &Value) -> Option<Value> {
        match self {
            Self::Not => Some(Value::Bool(!truthy(value))),
            Self::ToNumber => Some(Value::String(display(value))),
            Self::ToString => Some(to_number_or_keep(value)),
            Self::ToBoolean => Some(value.clone()),
            Self::Prefix { value: prefix } => value
                .as_str()
                .map(|s| Value::String(s.strip_prefix(prefix.as_str()).unwrap_or(s).to_string())),
            Self::Suffix { value: suffix } => value
                .as_str()
                .map(|s| Value::String(s.strip_suffix(suffix.as_str()).unwrap_or(s).to_string())),
            _ => None,
        }
    }

    /// Applies a pipeline left to right.
    pub fn apply_all(pipeline: &[Transform], value: &Value) -> Value {
        pipeline
            .iter()
            .fold(value.clone(), |acc, transform| transform.apply(&acc))
    }

    /// Inverts a pipeline right to left. If any step has no inverse the raw
    /// value is returned unchanged.
    pub fn invert_all(pipeline: &[Transform], value: &Value) -> Value {
        let mut current = value.clone();
        for transform in pipeline.iter().rev() {
            match transform.inverse(&current) {
                Some(next) => current = next,
                None => return value.clone(),
            }
        }
        current
    }
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|d| d.and_utc())
            }),
        _ => None,
    }
}

/// JSON truthiness: null, false, 0, "" and empty collections are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Text form of a value: strings unquoted, null empty.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_str(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}

fn to_number(value: &Value) -> Value {
    match value {
        Value::Number(_) => value.clone(),
        Value::Bool(b) => Value::from(u8::from(*b)),
        Value::String(s) => parse_number(s.trim()).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn to_number_or_keep(value: &Value) -> Value {
    match value {
        Value::String(s) => parse_number(s.trim()).unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
