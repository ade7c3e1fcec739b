//! Which agents may own a given lead right now

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::CalendarSet;
use crate::config::AssignmentConfig;
use crate::error::{AssignmentError, Result};
use crate::model::{Agent, AgentRole, AgentSnapshot, Lead};

/// Per-call overrides for automatic assignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignOptions {
    /// Accept agents who are currently off shift
    pub ignore_working_hours: bool,
}

/// Eligibility filter built from the assignment configuration
#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    owner_roles: Vec<AgentRole>,
    respect_working_hours: bool,
    enforce_capacity: bool,
    territory_field: String,
}

impl EligibilityPolicy {
    pub fn from_config(config: &AssignmentConfig) -> Self {
        Self {
            owner_roles: config.owner_roles.clone(),
            respect_working_hours: config.respect_working_hours,
            enforce_capacity: config.enforce_capacity,
            territory_field: config.territory_field.clone(),
        }
    }

    pub fn role_can_own(&self, role: AgentRole) -> bool {
        role.can_own_leads() && self.owner_roles.contains(&role)
    }

    /// Territory requested by the lead itself, if any
    pub fn lead_territory(&self, lead: &Lead) -> Option<String> {
        lead.field(&self.territory_field)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|t| !t.trim().is_empty())
    }

    /// Agents allowed to receive `lead` through automatic assignment
    ///
    /// Active, role permits ownership, territory compatible, below capacity and,
    /// unless overridden, on shift according to their own calendar.
    pub fn eligible_pool(
        &self,
        lead: &Lead,
        agents: Vec<AgentSnapshot>,
        calendars: &CalendarSet,
        now: DateTime<Utc>,
        options: AssignOptions,
    ) -> Vec<AgentSnapshot> {
        let territory = self.lead_territory(lead);
        let check_hours = self.respect_working_hours && !options.ignore_working_hours;

        agents
            .into_iter()
            .filter(|snapshot| {
                let agent = &snapshot.agent;
                let reason = if !agent.is_active {
                    Some("inactive")
                } else if !self.role_can_own(agent.role) {
                    Some("role cannot own leads")
                } else if territory.as_deref().is_some_and(|t| !agent.serves_territory(t)) {
                    Some("territory mismatch")
                } else if self.enforce_capacity && snapshot.at_capacity() {
                    Some("at capacity")
                } else if check_hours
                    && !calendars
                        .resolve(agent.working_hours.as_deref())
                        .is_working_time(now)
                {
                    Some("off shift")
                } else {
                    None
                };
                if let Some(reason) = reason {
                    debug!("Agent {} skipped for lead {}: {}", agent.id, lead.id, reason);
                }
                reason.is_none()
            })
            .collect()
    }

    /// Manual reassignment only requires an active agent whose role may own leads
    pub fn check_manual(&self, agent: &Agent) -> Result<()> {
        if !agent.is_active {
            return Err(AssignmentError::not_eligible(agent.id.clone(), "agent is inactive"));
        }
        if !self.role_can_own(agent.role) {
            return Err(AssignmentError::not_eligible(
                agent.id.clone(),
                format!("role '{}' cannot own leads", agent.role),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{WorkingHoursCalendar, WorkingHoursConfig};
    use crate::model::LeadStatus;
    use chrono::{NaiveTime, TimeZone};
    use serde_json::{json, Map, Value};

    fn calendars() -> CalendarSet {
        let config = WorkingHoursConfig::business_week(
            "default",
            "UTC",
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        );
        CalendarSet::new(WorkingHoursCalendar::new(config, Vec::new()).unwrap())
    }

    fn snapshot(agent: Agent, load: u32) -> AgentSnapshot {
        AgentSnapshot {
            agent,
            active_lead_count: load,
        }
    }

    fn lead(attributes: Value) -> Lead {
        let map = match attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Lead::new("lead-1", LeadStatus::New, map)
    }

    #[test]
    fn test_eligible_pool_filters() {
        let policy = EligibilityPolicy::from_config(&AssignmentConfig::default());
        let monday_noon = Utc.with_ymd_and_hms(2024, 3, 11, 12, 0, 0).unwrap();
        let agents = vec![
            snapshot(Agent::new("active", "Active", AgentRole::SalesRep).with_territory("west"), 0),
            snapshot(Agent::new("inactive", "Inactive", AgentRole::SalesRep).with_territory("west").inactive(), 0),
            snapshot(Agent::new("viewer", "Viewer", AgentRole::Viewer).with_territory("west"), 0),
            snapshot(Agent::new("east", "East", AgentRole::SalesRep).with_territory("east"), 0),
            snapshot(
                Agent::new("full", "Full", AgentRole::SalesRep)
                    .with_territory("west")
                    .with_max_active_leads(2),
                2,
            ),
        ];

        let pool = policy.eligible_pool(
            &lead(json!({ "territory": "West" })),
            agents,
            &calendars(),
            monday_noon,
            AssignOptions::default(),
        );
        let ids: Vec<_> = pool.iter().map(|s| s.agent.id.as_str()).collect();
        assert_eq!(ids, vec!["active"]);
    }

    #[test]
    fn test_working_hours_override() {
        let policy = EligibilityPolicy::from_config(&AssignmentConfig::default());
        let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let agents = vec![snapshot(Agent::new("rep", "Rep", AgentRole::SalesRep), 0)];

        let pool = policy.eligible_pool(&lead(json!({})), agents.clone(), &calendars(), saturday, AssignOptions::default());
        assert!(pool.is_empty());

        let pool = policy.eligible_pool(
            &lead(json!({})),
            agents,
            &calendars(),
            saturday,
            AssignOptions {
                ignore_working_hours: true,
            },
        );
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_manual_check() {
        let policy = EligibilityPolicy::from_config(&AssignmentConfig::default());
        assert!(policy.check_manual(&Agent::new("rep", "Rep", AgentRole::SalesRep)).is_ok());
        assert!(matches!(
            policy.check_manual(&Agent::new("rep", "Rep", AgentRole::SalesRep).inactive()),
            Err(AssignmentError::AgentNotEligible { .. })
        ));
        assert!(policy.check_manual(&Agent::new("v", "Viewer", AgentRole::Viewer)).is_err());
    }
}
