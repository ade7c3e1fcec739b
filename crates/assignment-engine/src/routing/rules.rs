//! Assignment rule model: conditions, operators and actions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{AssignmentError, Result};
use crate::model::{AgentId, AgentRole, Lead, RuleId};

/// Comparison applied by a single condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    In,
    NotIn,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not_equals",
            ConditionOperator::Contains => "contains",
            ConditionOperator::NotContains => "not_contains",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not_in",
        }
    }

    /// Compare a present lead value against the condition value
    ///
    /// Type mismatches are non-matches, never errors.
    pub fn apply(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            ConditionOperator::Equals => values_equal(actual, expected),
            ConditionOperator::NotEquals => !values_equal(actual, expected),
            ConditionOperator::Contains => contains(actual, expected).unwrap_or(false),
            ConditionOperator::NotContains => contains(actual, expected).map(|c| !c).unwrap_or(false),
            ConditionOperator::GreaterThan => match (as_number(actual), as_number(expected)) {
                (Some(a), Some(e)) => a > e,
                _ => false,
            },
            ConditionOperator::LessThan => match (as_number(actual), as_number(expected)) {
                (Some(a), Some(e)) => a < e,
                _ => false,
            },
            ConditionOperator::In => match expected {
                Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
                _ => false,
            },
            ConditionOperator::NotIn => match expected {
                Value::Array(items) => !items.iter().any(|item| values_equal(actual, item)),
                _ => false,
            },
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numbers compare numerically (numeric strings included), strings case-insensitively
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(e)) => a.eq_ignore_ascii_case(e),
        (Value::Bool(a), Value::Bool(e)) => a == e,
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(e)) => a == e,
            _ => false,
        },
        _ => actual == expected,
    }
}

/// `None` when containment is undefined for the value's type
fn contains(actual: &Value, expected: &Value) -> Option<bool> {
    match actual {
        Value::String(haystack) => {
            let needle = match expected {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return Some(false),
            };
            Some(haystack.to_lowercase().contains(&needle.to_lowercase()))
        }
        Value::Array(items) => Some(items.iter().any(|item| values_equal(item, expected))),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// One `{field, operator, value}` test against the lead attribute bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Attribute key or dotted path (`score.value`)
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// A condition on a missing field is a non-match for every operator
    pub fn matches(&self, lead: &Lead) -> bool {
        match lead.field(&self.field) {
            Some(actual) => self.operator.apply(&actual, &self.value),
            None => false,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("condition field cannot be empty".to_string());
        }
        match self.operator {
            ConditionOperator::In | ConditionOperator::NotIn if !self.value.is_array() => Err(format!(
                "operator '{}' on '{}' requires an array value",
                self.operator, self.field
            )),
            ConditionOperator::GreaterThan | ConditionOperator::LessThan
                if as_number(&self.value).is_none() =>
            {
                Err(format!(
                    "operator '{}' on '{}' requires a numeric value",
                    self.operator, self.field
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Rule action, stored as `{"type": ..., "parameters": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum RuleAction {
    /// Give the lead to one specific agent
    AssignToUser { user_id: AgentId },
    /// Balance across a fixed list of agents
    AssignToPool { agent_ids: Vec<AgentId> },
    /// Balance across eligible agents holding a role (e.g. senior reps for hot leads)
    AssignToRole { role: AgentRole },
    /// Balance across every eligible agent the rule allows
    RoundRobin,
    SetPriority { priority: String },
    AddTags { tags: Vec<String> },
    /// Ask the notification collaborator to reach out
    Notify {
        channel: String,
        #[serde(default)]
        template: Option<String>,
    },
}

impl RuleAction {
    /// Does this action decide who owns the lead?
    pub fn is_ownership(&self) -> bool {
        matches!(
            self,
            RuleAction::AssignToUser { .. }
                | RuleAction::AssignToPool { .. }
                | RuleAction::AssignToRole { .. }
                | RuleAction::RoundRobin
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuleAction::AssignToUser { .. } => "assign_to_user",
            RuleAction::AssignToPool { .. } => "assign_to_pool",
            RuleAction::AssignToRole { .. } => "assign_to_role",
            RuleAction::RoundRobin => "round_robin",
            RuleAction::SetPriority { .. } => "set_priority",
            RuleAction::AddTags { .. } => "add_tags",
            RuleAction::Notify { .. } => "notify",
        }
    }
}

/// Priority-ordered condition to action mapping
///
/// Conditions are AND-combined; a rule with no conditions always matches.
/// The engine only reads rules, administrators own them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Lower values are evaluated first
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Calendar id; the rule only applies during its working hours
    #[serde(default)]
    pub working_hours: Option<String>,
    /// Restrict candidates to agents serving one of these territories
    #[serde(default)]
    pub territories: Vec<String>,
    #[serde(default)]
    pub created_by: Option<AgentId>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl AssignmentRule {
    pub fn new(id: impl Into<RuleId>, name: impl Into<String>, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            priority,
            conditions: Vec::new(),
            actions: Vec::new(),
            is_active: true,
            working_hours: None,
            territories: Vec::new(),
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_condition(mut self, field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        self.conditions.push(Condition::new(field, operator, value));
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_territories<I, S>(mut self, territories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.territories = territories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_hours(mut self, calendar_id: impl Into<String>) -> Self {
        self.working_hours = Some(calendar_id.into());
        self
    }

    pub fn matches_conditions(&self, lead: &Lead) -> bool {
        self.conditions.iter().all(|c| c.matches(lead))
    }

    /// The first action that decides ownership, if any
    pub fn ownership_action(&self) -> Option<&RuleAction> {
        self.actions.iter().find(|a| a.is_ownership())
    }

    /// Actions the engine hands back as intents instead of applying
    pub fn side_effects(&self) -> Vec<RuleAction> {
        self.actions
            .iter()
            .filter(|a| !a.is_ownership())
            .cloned()
            .collect()
    }

    pub fn has_constraints(&self) -> bool {
        self.working_hours.is_some() || !self.territories.is_empty()
    }

    /// Reject malformed rules before they are stored
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| AssignmentError::validation(format!("rule '{}': {}", self.id, msg));

        if self.name.trim().is_empty() {
            return Err(fail("name cannot be empty".to_string()));
        }
        for condition in &self.conditions {
            condition.validate().map_err(fail)?;
        }
        let ownership = self.actions.iter().filter(|a| a.is_ownership()).count();
        if ownership > 1 {
            return Err(fail(format!("has {} ownership actions, at most one allowed", ownership)));
        }
        for action in &self.actions {
            match action {
                RuleAction::AssignToPool { agent_ids } if agent_ids.is_empty() => {
                    return Err(fail("assign_to_pool needs at least one agent".to_string()));
                }
                RuleAction::AssignToUser { user_id } if user_id.as_str().is_empty() => {
                    return Err(fail("assign_to_user needs a user id".to_string()));
                }
                RuleAction::Notify { channel, .. } if channel.trim().is_empty() => {
                    return Err(fail("notify needs a channel".to_string()));
                }
                _ => {}
            }
        }
        if self.territories.iter().any(|t| t.trim().is_empty()) {
            return Err(fail("territory names cannot be empty".to_string()));
        }
        Ok(())
    }
}
