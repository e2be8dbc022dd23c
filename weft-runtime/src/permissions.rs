//! Role-based access decisions.
//!
//! Evaluation order for page, model, field and action targets:
//! 1. a rule naming the current role decides (deny beats allow);
//! 2. a rule with no roles applies to everybody;
//! 3. otherwise the hierarchy decides: an allow rule naming a role ranked
//!    at or below the current role grants access.
//!
//! Targets without rules are open. Row rules filter records through the
//! condition engine; a record whose rule does not hold is dropped, never
//! reported as an error.

use crate::conditions::{evaluate, Resolver};
use crate::subscription::lock;
use crate::value::lookup_path;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};
use weft_model::{Access, AccessRule, Effect, PermissionsConfig, Record, RuleTarget};

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionContext {
    pub role: String,
    pub user_id: Option<String>,
}

impl PermissionContext {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DecisionKey {
    Page(String),
    Model(String, Access),
    Field(String, String, Access),
    Action(String),
}

struct PermissionState {
    config: PermissionsConfig,
    context: PermissionContext,
    decisions: HashMap<DecisionKey, bool>,
}

impl PermissionState {
    fn decide(&self, access: Option<Access>, matches: impl Fn(&RuleTarget) -> bool) -> bool {
        let rules: Vec<&AccessRule> = self
            .config
            .rules
            .iter()
            .filter(|r| matches(&r.target) && access.is_none_or(|a| r.access == a))
            .collect();
        if rules.is_empty() {
            return true;
        }

        let role = self.context.role.as_str();
        if let Some(effect) = strongest(rules.iter().filter(|r| r.names_role(role))) {
            return effect == Effect::Allow;
        }
        if let Some(effect) = strongest(rules.iter().filter(|r| r.roles.is_empty())) {
            return effect == Effect::Allow;
        }

        let Some(rank) = self.config.rank(role) else {
            return false;
        };
        rules.iter().filter(|r| r.effect == Effect::Allow).any(|r| {
            r.roles
                .iter()
                .any(|named| self.config.rank(named).is_some_and(|n| n <= rank))
        })
    }

    fn cached(&mut self, key: DecisionKey, compute: impl FnOnce(&Self) -> bool) -> bool {
        if let Some(&decision) = self.decisions.get(&key) {
            return decision;
        }
        let decision = compute(self);
        self.decisions.insert(key, decision);
        decision
    }
}

/// Deny wins over allow among rules at the same precedence level.
fn strongest<'a>(rules: impl Iterator<Item = &'a &'a AccessRule>) -> Option<Effect> {
    rules.map(|r| r.effect).max_by_key(|e| matches!(e, Effect::Deny))
}

/// Answers access questions for the current role.
///
/// Decisions are memoized; `update_context` and `set_config` swap the
/// context and drop the memo under one lock, so no query can observe a
/// stale role.
pub struct PermissionsService {
    state: Mutex<PermissionState>,
}

impl PermissionsService {
    pub fn new(config: PermissionsConfig, role: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(PermissionState {
                config,
                context: PermissionContext::new(role),
                decisions: HashMap::new(),
            }),
        }
    }

    /// Replaces the permission context. Returns the previous one.
    pub fn update_context(&self, context: PermissionContext) -> PermissionContext {
        let mut state = lock(&self.state);
        state.decisions.clear();
        info!("permission context: role '{}' -> '{}'", state.context.role, context.role);
        std::mem::replace(&mut state.context, context)
    }

    pub fn context(&self) -> PermissionContext {
        lock(&self.state).context.clone()
    }

    pub fn role(&self) -> String {
        lock(&self.state).context.role.clone()
    }

    pub fn set_config(&self, config: PermissionsConfig) {
        let mut state = lock(&self.state);
        state.decisions.clear();
        debug!("permission config replaced ({} rules)", config.rules.len());
        state.config = config;
    }

    pub fn config(&self) -> PermissionsConfig {
        lock(&self.state).config.clone()
    }

    /// Rank of a role in the hierarchy, lowest first.
    pub fn role_rank(&self, role: &str) -> Option<usize> {
        lock(&self.state).config.rank(role)
    }

    /// Number of memoized decisions.
    pub fn cached_decisions(&self) -> usize {
        lock(&self.state).decisions.len()
    }

    pub fn can_view_page(&self, page_id: &str) -> bool {
        lock(&self.state).cached(DecisionKey::Page(page_id.to_string()), |s| {
            s.decide(Some(Access::View), |t| {
                matches!(t, RuleTarget::Page { page_id: p } if p == page_id)
            })
        })
    }

    pub fn can_view_model(&self, model_id: &str) -> bool {
        self.model_access(model_id, Access::View)
    }

    fn model_access(&self, model_id: &str, access: Access) -> bool {
        lock(&self.state).cached(DecisionKey::Model(model_id.to_string(), access), |s| {
            s.decide(Some(access), |t| {
                matches!(t, RuleTarget::Model { model_id: m } if m == model_id)
            })
        })
    }

    fn field_access(&self, model_id: &str, field: &str, access: Access) -> bool {
        let key = DecisionKey::Field(model_id.to_string(), field.to_string(), access);
        lock(&self.state).cached(key, |s| {
            s.decide(Some(access), |t| {
                matches!(
                    t,
                    RuleTarget::Field { model_id: m, field: f } if m == model_id && f == field
                )
            })
        })
    }

    /// Viewing a field requires viewing its model.
    pub fn can_view_field(&self, model_id: &str, field: &str) -> bool {
        self.can_view_model(model_id) && self.field_access(model_id, field, Access::View)
    }

    /// Editing a field requires viewing it plus edit access on both the
    /// model and the field.
    pub fn can_edit_field(&self, model_id: &str, field: &str) -> bool {
        self.can_view_field(model_id, field)
            && self.model_access(model_id, Access::Edit)
            && self.field_access(model_id, field, Access::Edit)
    }

    /// Action rules are matched regardless of their access kind.
    pub fn can_perform_action(&self, action_id: &str) -> bool {
        lock(&self.state).cached(DecisionKey::Action(action_id.to_string()), |s| {
            s.decide(None, |t| matches!(t, RuleTarget::Action { action_id: a } if a == action_id))
        })
    }

    /// Keeps the records the current role may see, in their original order.
    pub fn filter_rows(&self, model_id: &str, records: Vec<Record>) -> Vec<Record> {
        if !self.can_view_model(model_id) {
            return Vec::new();
        }
        let (rules, user) = {
            let state = lock(&self.state);
            let role = state.context.role.as_str();
            let rules: Vec<AccessRule> = state
                .config
                .rules
                .iter()
                .filter(|r| matches!(&r.target, RuleTarget::Row { model_id: m } if m == model_id))
                .filter(|r| r.roles.is_empty() || r.names_role(role))
                .cloned()
                .collect();
            let user = json!({ "role": state.context.role, "id": state.context.user_id });
            (rules, user)
        };
        if rules.is_empty() {
            return records;
        }

        records
            .into_iter()
            .filter(|record| {
                let scope = RowScope {
                    record: record.to_value(),
                    user: &user,
                };
                rules.iter().all(|rule| {
                    let holds = rule.condition.as_ref().is_none_or(|c| evaluate(c, &scope));
                    match rule.effect {
                        Effect::Allow => holds,
                        Effect::Deny => !holds,
                    }
                })
            })
            .collect()
    }
}

/// Row-rule resolver: `record.*` or bare fields, plus `user.role`/`user.id`.
struct RowScope<'a> {
    record: Value,
    user: &'a Value,
}

impl Resolver for RowScope<'_> {
    fn resolve(&self, path: &str) -> Value {
        match path.split_once('.') {
            Some(("record", rest)) => lookup_path(&self.record, rest),
            Some(("user", rest)) => lookup_path(self.user, rest),
            _ => lookup_path(&self.record, path),
        }
    }
}
