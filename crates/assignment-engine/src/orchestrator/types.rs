//! Result and filter types returned by the coordinator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AgentId, AssignmentReason, LeadId, RuleId};
use crate::routing::RuleAction;
use crate::sla::SlaStatus;

/// Outcome of an automatic assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResult {
    pub lead_id: LeadId,
    pub assigned_to: AgentId,
    pub assignment_reason: AssignmentReason,
    pub assigned_at: DateTime<Utc>,
    /// Rule that selected the pool, `None` for balancer fallback
    pub rule_id: Option<RuleId>,
    /// Side effects requested by the matched rule, not applied here
    pub actions: Vec<RuleAction>,
    /// `None` when the SLA calendar could not produce a deadline
    pub sla_deadline: Option<DateTime<Utc>>,
}

/// Outcome of a manual reassignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignmentResult {
    pub lead_id: LeadId,
    pub assigned_to: AgentId,
    pub previous_assignee: Option<AgentId>,
    pub assignment_reason: AssignmentReason,
    pub assigned_at: DateTime<Utc>,
}

/// Narrowing for overdue queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdueFilter {
    pub assigned_to: Option<AgentId>,
    pub min_escalation_level: Option<u8>,
}

impl OverdueFilter {
    pub fn for_agent(agent: impl Into<AgentId>) -> Self {
        Self {
            assigned_to: Some(agent.into()),
            ..Default::default()
        }
    }

    pub fn with_min_level(mut self, level: u8) -> Self {
        self.min_escalation_level = Some(level);
        self
    }

    pub fn matches(&self, status: &SlaStatus) -> bool {
        status.is_overdue
            && self.assigned_to.as_ref().map_or(true, |a| a == &status.assigned_to)
            && self.min_escalation_level.map_or(true, |l| status.escalation_level >= l)
    }
}

/// One failed lead in a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub lead_id: LeadId,
    pub error: String,
}

/// Result of [`assign_unassigned_leads`](super::AssignmentCoordinator::assign_unassigned_leads)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub assigned: Vec<AssignmentResult>,
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn attempted(&self) -> usize {
        self.assigned.len() + self.failed.len()
    }
}
