use crate::{
    Action, BindingSource, BindingSpec, Condition, Flow, JsonMap, LayoutConfig,
    PermissionsConfig, RuleTarget, SchemaError, StyleSpec, Theme, Trigger,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A complete application description.
///
/// Treated as read-only configuration. Swapping schemas is a full reload
/// through the runtime, never an incremental patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSchema {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub data_models: Vec<DataModel>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    /// Layouts for sections other than pages (pages carry their own).
    #[serde(default)]
    pub layouts: BTreeMap<String, LayoutConfig>,
    /// Initial records per model id.
    #[serde(default)]
    pub seed: BTreeMap<String, Vec<JsonMap>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_page: Option<String>,
}

impl AppSchema {
    /// Parses a schema from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn page(&self, page_id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == page_id)
    }

    pub fn model(&self, model_id: &str) -> Option<&DataModel> {
        self.data_models.iter().find(|m| m.id == model_id)
    }

    pub fn flow(&self, flow_id: &str) -> Option<&Flow> {
        self.flows.iter().find(|f| f.id == flow_id)
    }

    /// Locates a component on any page.
    pub fn component(&self, component_id: &str) -> Option<(&Page, &ComponentDef)> {
        self.pages.iter().find_map(|page| {
            page.components
                .iter()
                .find(|c| c.id == component_id)
                .map(|c| (page, c))
        })
    }

    /// Explicit home page, or the first page.
    pub fn home_page_id(&self) -> Option<&str> {
        self.home_page
            .as_deref()
            .or_else(|| self.pages.first().map(|p| p.id.as_str()))
    }

    /// Structural validation: ids are non-empty and unique, the role
    /// hierarchy is usable.
    pub fn validate(&self) -> Result<(), SchemaError> {
        unique_ids("page", self.pages.iter().map(|p| p.id.as_str()))?;
        unique_ids("model", self.data_models.iter().map(|m| m.id.as_str()))?;
        unique_ids("flow", self.flows.iter().map(|f| f.id.as_str()))?;
        unique_ids(
            "component",
            self.pages
                .iter()
                .flat_map(|p| p.components.iter().map(|c| c.id.as_str())),
        )?;
        for model in &self.data_models {
            unique_ids("field", model.fields.iter().map(|f| f.name.as_str()))?;
        }
        for rows in self.seed.values() {
            let ids: Vec<String> = rows.iter().filter_map(seed_id).collect();
            unique_ids("seed record", ids.iter().map(String::as_str))?;
        }

        let perms = &self.permissions;
        if perms.roles.is_empty() {
            return Err(SchemaError::EmptyRoleHierarchy);
        }
        unique_ids("role", perms.roles.iter().map(String::as_str))?;
        if perms.rank(&perms.default_role).is_none() {
            return Err(SchemaError::UnknownDefaultRole(perms.default_role.clone()));
        }
        Ok(())
    }

    /// Reference checks that do not prevent loading. Broken references show
    /// up at execution time as failed actions; this lets hosts surface them
    /// earlier.
    pub fn lint(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        let models: HashSet<&str> = self.data_models.iter().map(|m| m.id.as_str()).collect();
        let pages: HashSet<&str> = self.pages.iter().map(|p| p.id.as_str()).collect();

        if let Some(home) = &self.home_page {
            if !pages.contains(home.as_str()) {
                let message = format!("home page '{home}' does not exist");
                issues.push(SchemaIssue::new("schema", message));
            }
        }

        for flow in &self.flows {
            if let Trigger::Record { model_id, .. } = &flow.trigger {
                if !models.contains(model_id.as_str()) {
                    issues.push(SchemaIssue::new(
                        &flow.id,
                        format!("trigger references unknown model '{model_id}'"),
                    ));
                }
            }
            lint_actions(&flow.id, &flow.actions, &models, &pages, &mut issues);
        }

        for page in &self.pages {
            for component in &page.components {
                for binding in &component.bindings {
                    let model = match &binding.source {
                        BindingSource::Field { model_id, .. }
                        | BindingSource::Collection { model_id } => Some(model_id),
                        BindingSource::State { .. } => None,
                    };
                    if let Some(model_id) = model.filter(|m| !models.contains(m.as_str())) {
                        issues.push(SchemaIssue::new(
                            &component.id,
                            format!(
                                "binding '{}' references unknown model '{model_id}'",
                                binding.prop
                            ),
                        ));
                    }
                }
            }
        }

        for rule in &self.permissions.rules {
            for role in &rule.roles {
                if self.permissions.rank(role).is_none() {
                    issues.push(SchemaIssue::new(
                        "permissions",
                        format!("rule names unknown role '{role}'"),
                    ));
                }
            }
            if let RuleTarget::Page { page_id } = &rule.target {
                if !pages.contains(page_id.as_str()) {
                    issues.push(SchemaIssue::new(
                        "permissions",
                        format!("rule targets unknown page '{page_id}'"),
                    ));
                }
            }
        }

        issues
    }
}

fn unique_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(SchemaError::EmptyId { kind });
        }
        if !seen.insert(id) {
            return Err(SchemaError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Explicit id of a seed row. Rows without one get a generated id on load.
fn seed_id(row: &JsonMap) -> Option<String> {
    match row.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lint_actions(
    flow_id: &str,
    actions: &[Action],
    models: &HashSet<&str>,
    pages: &HashSet<&str>,
    issues: &mut Vec<SchemaIssue>,
) {
    for action in actions {
        if let Some(model_id) = action.model_id() {
            if !models.contains(model_id) {
                issues.push(SchemaIssue::new(
                    flow_id,
                    format!("{} references unknown model '{model_id}'", action.kind()),
                ));
            }
        }
        match action {
            Action::Navigate { page_id, .. }
                if !page_id.contains("{{") && !pages.contains(page_id.as_str()) =>
            {
                issues.push(SchemaIssue::new(
                    flow_id,
                    format!("navigate targets unknown page '{page_id}'"),
                ));
            }
            Action::Conditional { then, otherwise, .. } => {
                lint_actions(flow_id, then, models, pages, issues);
                lint_actions(flow_id, otherwise, models, pages, issues);
            }
            _ => {}
        }
    }
}

/// A non-fatal schema problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    /// Id of the element the issue was found on.
    pub location: String,
    pub message: String,
}

impl SchemaIssue {
    fn new(location: &str, message: String) -> Self {
        Self {
            location: location.to_string(),
            message,
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// A record type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl DataModel {
    pub fn new(id: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One field of a data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed values for `select` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Target model for `reference` fields. Following references is the
    /// caller's job; the store performs no joins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl FieldDef {
    fn simple(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            options: None,
            reference: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::simple(name, FieldType::Text)
    }

    pub fn number(name: &str) -> Self {
        Self::simple(name, FieldType::Number)
    }

    pub fn boolean(name: &str) -> Self {
        Self::simple(name, FieldType::Boolean)
    }

    pub fn date(name: &str) -> Self {
        Self::simple(name, FieldType::Date)
    }

    pub fn select(name: &str, options: &[&str]) -> Self {
        Self {
            options: Some(options.iter().map(|o| o.to_string()).collect()),
            ..Self::simple(name, FieldType::Select)
        }
    }

    pub fn reference(name: &str, model_id: &str) -> Self {
        Self {
            reference: Some(model_id.to_string()),
            ..Self::simple(name, FieldType::Reference)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Value used when a new record omits this field: the declared default,
    /// else `false` for booleans and `[]` for lists.
    pub fn initial_value(&self) -> Option<Value> {
        self.default.clone().or(match self.field_type {
            FieldType::Boolean => Some(Value::Bool(false)),
            FieldType::List => Some(Value::Array(Vec::new())),
            _ => None,
        })
    }
}

/// Data type of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Boolean,
    Date,
    #[serde(alias = "datetime")]
    DateTime,
    Email,
    Select,
    Reference,
    List,
    Json,
}

/// A page of the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutConfig>,
}

impl Page {
    pub fn new(id: impl Into<String>, components: Vec<ComponentDef>) -> Self {
        Self {
            id: id.into(),
            components,
            ..Self::default()
        }
    }
}

/// A visual component instance on a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub props: JsonMap,
    #[serde(default)]
    pub bindings: Vec<BindingSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_when: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleSpec>,
}

impl ComponentDef {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_binding(mut self, binding: BindingSpec) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn visible_when(mut self, condition: Condition) -> Self {
        self.visible_when = Some(condition);
        self
    }

    pub fn disabled_when(mut self, condition: Condition) -> Self {
        self.disabled_when = Some(condition);
        self
    }

    pub fn with_style(mut self, style: StyleSpec) -> Self {
        self.style = Some(style);
        self
    }
}
