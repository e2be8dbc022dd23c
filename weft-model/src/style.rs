use crate::{Condition, JsonMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Style declaration for a component.
///
/// Resolution order (later wins): `base`, then `tokens` (property → theme
/// token path), then each matching rule in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSpec {
    #[serde(default)]
    pub base: JsonMap,
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: Vec<StyleRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRule {
    pub when: Condition,
    #[serde(default)]
    pub style: JsonMap,
}
