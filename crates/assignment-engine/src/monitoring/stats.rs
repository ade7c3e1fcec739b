//! Workload and compliance aggregation
//!
//! Pure folds over directory rows, lead snapshots and SLA statuses. Nothing is
//! stored; every report is recomputed from current data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::model::{AgentId, AgentRole, AgentSnapshot, Lead, AssignmentReason};
use crate::sla::SlaStatus;

/// Load of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWorkload {
    pub agent_id: AgentId,
    pub name: String,
    pub role: AgentRole,
    pub is_active: bool,
    pub active_leads: u32,
    pub capacity: Option<u32>,
    /// `active_leads / capacity`, when a capacity is set
    pub utilization: Option<f64>,
    pub overdue_leads: u32,
}

/// Workload per agent, in directory order
pub fn workloads(agents: &[AgentSnapshot], statuses: &[SlaStatus]) -> Vec<UserWorkload> {
    let mut overdue: HashMap<&AgentId, u32> = HashMap::new();
    for status in statuses.iter().filter(|s| s.is_overdue) {
        *overdue.entry(&status.assigned_to).or_insert(0) += 1;
    }

    agents
        .iter()
        .map(|snapshot| {
            let agent = &snapshot.agent;
            let capacity = agent.max_active_leads;
            UserWorkload {
                agent_id: agent.id.clone(),
                name: agent.name.clone(),
                role: agent.role,
                is_active: agent.is_active,
                active_leads: snapshot.active_lead_count,
                capacity,
                utilization: capacity
                    .filter(|c| *c > 0)
                    .map(|c| snapshot.active_lead_count as f64 / c as f64),
                overdue_leads: overdue.get(&agent.id).copied().unwrap_or(0),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonBreakdown {
    pub rule: u64,
    pub round_robin: u64,
    pub manual: u64,
}

/// Assignment and compliance summary over open leads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStatistics {
    pub open_leads: u64,
    pub assigned: u64,
    pub unassigned: u64,
    pub by_reason: ReasonBreakdown,
    /// Current assignments per rule name
    pub by_rule: BTreeMap<String, u64>,
    pub overdue: u64,
    pub by_escalation_level: BTreeMap<u8, u64>,
    pub average_hours_remaining: Option<f64>,
    pub generated_at: DateTime<Utc>,
}

impl AssignmentStatistics {
    /// Fold open leads and their SLA statuses into a summary
    pub fn collect(open_leads: &[Lead], statuses: &[SlaStatus], generated_at: DateTime<Utc>) -> Self {
        let mut by_reason = ReasonBreakdown::default();
        let mut by_rule = BTreeMap::new();
        let mut assigned = 0;

        for lead in open_leads.iter().filter(|l| l.assignment.is_assigned()) {
            assigned += 1;
            match &lead.assignment.assignment_reason {
                Some(AssignmentReason::Rule { name }) => {
                    by_reason.rule += 1;
                    *by_rule.entry(name.clone()).or_insert(0) += 1;
                }
                Some(AssignmentReason::RoundRobin) => by_reason.round_robin += 1,
                Some(AssignmentReason::Manual(_)) | None => by_reason.manual += 1,
            }
        }

        let mut by_escalation_level = BTreeMap::new();
        for status in statuses {
            *by_escalation_level.entry(status.escalation_level).or_insert(0) += 1;
        }

        let average_hours_remaining = if statuses.is_empty() {
            None
        } else {
            Some(statuses.iter().map(|s| s.hours_remaining).sum::<f64>() / statuses.len() as f64)
        };

        Self {
            open_leads: open_leads.len() as u64,
            assigned,
            unassigned: open_leads.len() as u64 - assigned,
            by_reason,
            by_rule,
            overdue: statuses.iter().filter(|s| s.is_overdue).count() as u64,
            by_escalation_level,
            average_hours_remaining,
            generated_at,
        }
    }
}
