use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Light or dark presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

/// Design tokens: colors, typography, spacing, shadows, radii.
///
/// Token paths are dotted: `colors.primary`, `spacing.md`,
/// `typography.fontSize.lg`. In dark mode, `darkColors` entries override
/// `colors` entries with the same name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
    #[serde(default)]
    pub dark_colors: BTreeMap<String, String>,
    #[serde(default)]
    pub typography: BTreeMap<String, Value>,
    #[serde(default)]
    pub spacing: BTreeMap<String, Value>,
    #[serde(default)]
    pub shadows: BTreeMap<String, String>,
    #[serde(default)]
    pub radii: BTreeMap<String, Value>,
    #[serde(default)]
    pub mode: ThemeMode,
}

impl Theme {
    /// Looks up a token by dotted path for the given mode.
    pub fn lookup(&self, path: &str, mode: ThemeMode) -> Option<Value> {
        let (group, rest) = path.split_once('.')?;
        match group {
            "colors" => {
                let dark = (mode == ThemeMode::Dark)
                    .then(|| self.dark_colors.get(rest))
                    .flatten();
                dark.or_else(|| self.colors.get(rest))
                    .map(|c| Value::String(c.clone()))
            }
            "shadows" => self.shadows.get(rest).map(|s| Value::String(s.clone())),
            "typography" => nested(&self.typography, rest),
            "spacing" => nested(&self.spacing, rest),
            "radii" => nested(&self.radii, rest),
            _ => None,
        }
    }
}

fn nested(group: &BTreeMap<String, Value>, path: &str) -> Option<Value> {
    let mut parts = path.split('.');
    let mut current = group.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current.clone())
}
