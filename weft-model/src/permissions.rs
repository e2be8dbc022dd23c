//! Role-based access rules.

use crate::Condition;
use serde::{Deserialize, Serialize};

/// What a rule protects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RuleTarget {
    Page { page_id: String },
    Model { model_id: String },
    Field { model_id: String, field: String },
    Action { action_id: String },
    /// Row-level rule; carries a condition evaluated per record.
    Row { model_id: String },
}

/// Kind of access a rule grants or denies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    View,
    Edit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// One access rule.
///
/// `roles` lists the roles the rule names explicitly. For row rules an
/// empty list means the rule applies to every role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    pub target: RuleTarget,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl AccessRule {
    pub fn allow(target: RuleTarget, roles: &[&str]) -> Self {
        Self {
            target,
            access: Access::View,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            effect: Effect::Allow,
            condition: None,
        }
    }

    pub fn deny(target: RuleTarget, roles: &[&str]) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(target, roles)
        }
    }

    pub fn row(model_id: &str, roles: &[&str], condition: Condition) -> Self {
        Self {
            condition: Some(condition),
            ..Self::allow(
                RuleTarget::Row {
                    model_id: model_id.to_string(),
                },
                roles,
            )
        }
    }

    pub fn for_edit(mut self) -> Self {
        self.access = Access::Edit;
        self
    }

    pub fn names_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Roles, rules and the default role of an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsConfig {
    /// Role hierarchy, lowest rank first.
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default)]
    pub rules: Vec<AccessRule>,
}

fn default_roles() -> Vec<String> {
    ["public", "viewer", "editor", "admin", "owner"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_role() -> String {
    "public".to_string()
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            default_role: default_role(),
            rules: Vec::new(),
        }
    }
}

impl PermissionsConfig {
    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rank of a role in the hierarchy; `None` for unknown roles.
    pub fn rank(&self, role: &str) -> Option<usize> {
        self.roles.iter().position(|r| r == role)
    }
}
