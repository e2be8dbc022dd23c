//! Computed component styles: base literal, then theme tokens, then
//! conditional rules. Later sources win per property.

use crate::conditions::{evaluate, Resolver};
use crate::subscription::lock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;
use weft_model::{JsonMap, StyleSpec, Theme, ThemeMode};

/// Resolved CSS-like properties.
pub type ComputedStyle = BTreeMap<String, Value>;

/// Resolves styles on demand. Nothing resolved is kept, so a theme swap
/// shows up on the next read.
pub struct DynamicStyler {
    theme: Mutex<Theme>,
    specs: Mutex<HashMap<String, StyleSpec>>,
}

impl DynamicStyler {
    pub fn new(theme: Theme) -> Self {
        Self {
            theme: Mutex::new(theme),
            specs: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, component_id: &str, spec: StyleSpec) {
        lock(&self.specs).insert(component_id.to_string(), spec);
    }

    pub fn unregister(&self, component_id: &str) -> bool {
        lock(&self.specs).remove(component_id).is_some()
    }

    pub fn set_theme(&self, theme: Theme) {
        *lock(&self.theme) = theme;
    }

    pub fn theme(&self) -> Theme {
        lock(&self.theme).clone()
    }

    pub fn clear(&self) {
        lock(&self.specs).clear();
    }

    /// Style of a registered component; unregistered components get an
    /// empty style.
    pub fn resolve(
        &self,
        component_id: &str,
        resolver: &dyn Resolver,
        mode: ThemeMode,
    ) -> ComputedStyle {
        let spec = lock(&self.specs).get(component_id).cloned();
        match spec {
            Some(spec) => self.resolve_spec(&spec, resolver, mode),
            None => ComputedStyle::new(),
        }
    }

    pub fn resolve_spec(
        &self,
        spec: &StyleSpec,
        resolver: &dyn Resolver,
        mode: ThemeMode,
    ) -> ComputedStyle {
        let theme = self.theme();
        let mut style = ComputedStyle::new();
        merge(&mut style, &spec.base, &theme, mode);

        for (property, token) in &spec.tokens {
            match theme.lookup(token, mode) {
                Some(value) => {
                    style.insert(property.clone(), value);
                }
                None => debug!("unknown theme token '{}' for '{}'", token, property),
            }
        }

        for rule in &spec.rules {
            if evaluate(&rule.when, resolver) {
                merge(&mut style, &rule.style, &theme, mode);
            }
        }
        style
    }
}

/// Copies properties into `style`, expanding `$group.name` token
/// references. Unknown references are kept literally.
fn merge(style: &mut ComputedStyle, properties: &JsonMap, theme: &Theme, mode: ThemeMode) {
    for (property, value) in properties {
        let resolved = match value.as_str().and_then(|s| s.strip_prefix('$')) {
            Some(token) => theme.lookup(token, mode).unwrap_or_else(|| value.clone()),
            None => value.clone(),
        };
        style.insert(property.clone(), resolved);
    }
}
