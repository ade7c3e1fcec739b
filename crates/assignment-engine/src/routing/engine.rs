//! # Rule Engine
//!
//! Stateless first-match-wins evaluation of assignment rules against a lead
//! snapshot. Rules are visited in ascending priority; the first active rule whose
//! conditions all hold and which leaves at least one eligible candidate wins.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::calendar::CalendarSet;
use crate::model::{AgentId, AgentSnapshot, Lead};

use super::rules::{AssignmentRule, ConditionOperator, RuleAction};

/// What the engine may look at besides the lead and the rules
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Agents already eligible for this lead
    pub agents: &'a [AgentSnapshot],
    pub calendars: &'a CalendarSet,
    pub now: DateTime<Utc>,
}

/// Winning rule and the agents it allows
#[derive(Debug, Clone)]
pub struct RuleMatch<'r> {
    pub rule: &'r AssignmentRule,
    /// Sorted, never empty
    pub candidates: Vec<AgentId>,
}

/// Per-condition result used by the rule test surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionOutcome {
    pub field: String,
    pub operator: ConditionOperator,
    pub expected: Value,
    /// `None` when the lead has no such field
    pub actual: Option<Value>,
    pub matched: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    /// First active rule whose conditions hold and which yields a candidate
    ///
    /// Returns `None` when nothing matches; the caller falls back to the balancer.
    pub fn evaluate<'r>(
        &self,
        lead: &Lead,
        rules: &'r [AssignmentRule],
        ctx: &EvaluationContext<'_>,
    ) -> Option<RuleMatch<'r>> {
        for rule in ordered(rules) {
            if !rule.matches_conditions(lead) {
                continue;
            }

            if let Some(calendar_id) = rule.working_hours.as_deref() {
                if !ctx.calendars.resolve(Some(calendar_id)).is_working_time(ctx.now) {
                    debug!("Rule '{}' matched lead {} outside its working hours", rule.name, lead.id);
                    continue;
                }
            }

            let candidates = candidates_for(rule, ctx.agents);
            if candidates.is_empty() {
                debug!("Rule '{}' matched lead {} but has no eligible agent", rule.name, lead.id);
                continue;
            }

            debug!("Rule '{}' (priority {}) matched lead {}", rule.name, rule.priority, lead.id);
            return Some(RuleMatch { rule, candidates });
        }
        None
    }

    /// First active rule whose conditions hold, ignoring agent availability
    pub fn first_condition_match<'r>(&self, lead: &Lead, rules: &'r [AssignmentRule]) -> Option<&'r AssignmentRule> {
        ordered(rules).into_iter().find(|rule| rule.matches_conditions(lead))
    }

    /// Evaluate each condition of one rule separately
    pub fn explain(&self, lead: &Lead, rule: &AssignmentRule) -> Vec<ConditionOutcome> {
        rule.conditions
            .iter()
            .map(|condition| {
                let actual = lead.field(&condition.field);
                let matched = actual
                    .as_ref()
                    .map(|a| condition.operator.apply(a, &condition.value))
                    .unwrap_or(false);
                ConditionOutcome {
                    field: condition.field.clone(),
                    operator: condition.operator,
                    expected: condition.value.clone(),
                    actual,
                    matched,
                }
            })
            .collect()
    }
}

/// Active rules by ascending priority; equal priorities keep their input order
fn ordered(rules: &[AssignmentRule]) -> Vec<&AssignmentRule> {
    let mut active: Vec<&AssignmentRule> = rules.iter().filter(|r| r.is_active).collect();
    active.sort_by_key(|r| r.priority);
    active
}

fn candidates_for(rule: &AssignmentRule, agents: &[AgentSnapshot]) -> Vec<AgentId> {
    let mut candidates: Vec<AgentId> = agents
        .iter()
        .filter(|s| {
            rule.territories.is_empty()
                || rule.territories.iter().any(|t| s.agent.serves_territory(t))
        })
        .filter(|s| match rule.ownership_action() {
            Some(RuleAction::AssignToUser { user_id }) => &s.agent.id == user_id,
            Some(RuleAction::AssignToPool { agent_ids }) => agent_ids.contains(&s.agent.id),
            Some(RuleAction::AssignToRole { role }) => s.agent.role == *role,
            _ => true,
        })
        .map(|s| s.agent.id.clone())
        .collect();
    candidates.sort();
    candidates.dedup();
    candidates
}
