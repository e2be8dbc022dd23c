//! Condition evaluation and the per-component conditional renderer.

use crate::context::{EvalContext, RenderScope, RuntimeContext};
use crate::subscription::lock;
use crate::value::{compare, contains, is_empty, loose_eq};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use weft_model::{ComponentDef, Condition, Operand};

/// Resolves dotted paths to values.
pub trait Resolver {
    fn resolve(&self, path: &str) -> Value;
}

impl Resolver for Value {
    fn resolve(&self, path: &str) -> Value {
        crate::value::lookup_path(self, path)
    }
}

fn operand(op: &Operand, resolver: &dyn Resolver) -> Value {
    match op {
        Operand::Field(path) => resolver.resolve(path),
        Operand::Value(v) => v.clone(),
    }
}

fn ordered(
    left: &Operand,
    right: &Operand,
    resolver: &dyn Resolver,
    accept: fn(Ordering) -> bool,
) -> bool {
    compare(&operand(left, resolver), &operand(right, resolver)).is_some_and(accept)
}

/// Evaluates a condition tree. Unresolvable paths read as `null`, and
/// comparisons between unordered values are false.
pub fn evaluate(condition: &Condition, resolver: &dyn Resolver) -> bool {
    match condition {
        Condition::Equals { left, right } => {
            loose_eq(&operand(left, resolver), &operand(right, resolver))
        }
        Condition::NotEquals { left, right } => {
            !loose_eq(&operand(left, resolver), &operand(right, resolver))
        }
        Condition::GreaterThan { left, right } => ordered(left, right, resolver, Ordering::is_gt),
        Condition::GreaterOrEqual { left, right } => {
            ordered(left, right, resolver, Ordering::is_ge)
        }
        Condition::LessThan { left, right } => ordered(left, right, resolver, Ordering::is_lt),
        Condition::LessOrEqual { left, right } => ordered(left, right, resolver, Ordering::is_le),
        Condition::Contains { left, right } => {
            contains(&operand(left, resolver), &operand(right, resolver))
        }
        Condition::IsEmpty { operand: op } => is_empty(&operand(op, resolver)),
        Condition::IsNotEmpty { operand: op } => !is_empty(&operand(op, resolver)),
        Condition::And { conditions } => conditions.iter().all(|c| evaluate(c, resolver)),
        Condition::Or { conditions } => conditions.iter().any(|c| evaluate(c, resolver)),
        Condition::Not { condition } => !evaluate(condition, resolver),
        Condition::Always => true,
        Condition::Never => false,
    }
}

/// Visibility and enablement conditions of one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentConditions {
    pub visible_when: Option<Condition>,
    pub disabled_when: Option<Condition>,
}

impl From<&ComponentDef> for ComponentConditions {
    fn from(component: &ComponentDef) -> Self {
        Self {
            visible_when: component.visible_when.clone(),
            disabled_when: component.disabled_when.clone(),
        }
    }
}

/// Decides visibility and enablement per component against the live
/// store and state. Nothing is cached: every call reads current data.
pub struct ConditionalRenderer {
    ctx: RuntimeContext,
    conditions: Mutex<HashMap<String, ComponentConditions>>,
}

impl ConditionalRenderer {
    pub fn new(ctx: RuntimeContext) -> Self {
        Self {
            ctx,
            conditions: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, component_id: &str, conditions: ComponentConditions) {
        lock(&self.conditions).insert(component_id.to_string(), conditions);
    }

    pub fn unregister(&self, component_id: &str) -> bool {
        lock(&self.conditions).remove(component_id).is_some()
    }

    pub fn clear(&self) {
        lock(&self.conditions).clear();
    }

    fn scoped(&self, component_id: &str, scope: &RenderScope) -> RenderScope {
        let mut scope = scope.clone();
        if scope.component_id.is_none() {
            scope.component_id = Some(component_id.to_string());
        }
        scope
    }

    /// Visible unless the component's state hides it or its `visible_when`
    /// condition is false.
    pub fn should_show(&self, component_id: &str, scope: &RenderScope) -> bool {
        if !self.ctx.state.component_state(component_id).visible {
            return false;
        }
        let condition = lock(&self.conditions)
            .get(component_id)
            .and_then(|c| c.visible_when.clone());
        match condition {
            Some(condition) => self.evaluate(&condition, &self.scoped(component_id, scope)),
            None => true,
        }
    }

    /// Disabled when the component's state says disabled or loading, or its
    /// `disabled_when` condition holds.
    pub fn should_disable(&self, component_id: &str, scope: &RenderScope) -> bool {
        let state = self.ctx.state.component_state(component_id);
        if state.disabled || state.loading {
            return true;
        }
        let condition = lock(&self.conditions)
            .get(component_id)
            .and_then(|c| c.disabled_when.clone());
        match condition {
            Some(condition) => self.evaluate(&condition, &self.scoped(component_id, scope)),
            None => false,
        }
    }

    /// Evaluates an arbitrary condition against a fresh context.
    pub fn evaluate(&self, condition: &Condition, scope: &RenderScope) -> bool {
        evaluate(condition, &EvalContext::new(&self.ctx, scope))
    }
}
