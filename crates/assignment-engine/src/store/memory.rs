//! In-process implementation of every collaborator trait

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{AgentCriteria, AgentDirectory, CalendarStore, CursorStore, LeadFilter, LeadStore, RuleStore, WriteGuard};
use crate::calendar::{Holiday, WorkingHoursConfig};
use crate::error::{AssignmentError, Result};
use crate::model::{Agent, AgentId, AgentSnapshot, Assignment, Lead, LeadId, LeadStatus, RuleId};
use crate::routing::AssignmentRule;

/// Lead, agent, rule, calendar and cursor state held in memory
///
/// Open-lead counts are derived from the leads themselves, so an assignment
/// write is also the load update.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    leads: RwLock<HashMap<LeadId, Lead>>,
    agents: RwLock<HashMap<AgentId, Agent>>,
    rules: RwLock<Vec<AssignmentRule>>,
    calendars: RwLock<HashMap<String, WorkingHoursConfig>>,
    holidays: RwLock<Vec<Holiday>>,
    cursors: DashMap<String, u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_lead(&self, lead: Lead) {
        self.leads.write().insert(lead.id.clone(), lead);
    }

    pub fn set_lead_status(&self, id: &LeadId, status: LeadStatus) -> Result<()> {
        let mut leads = self.leads.write();
        let lead = leads
            .get_mut(id)
            .ok_or_else(|| AssignmentError::LeadNotFound(id.clone()))?;
        lead.status = status;
        lead.updated_at = Utc::now();
        Ok(())
    }

    pub fn upsert_agent(&self, agent: Agent) {
        self.agents.write().insert(agent.id.clone(), agent);
    }

    pub fn insert_calendar(&self, config: WorkingHoursConfig) {
        self.calendars.write().insert(config.id.clone(), config);
    }

    pub fn add_holiday(&self, holiday: Holiday) {
        self.holidays.write().push(holiday);
    }

    fn open_counts(&self) -> HashMap<AgentId, u32> {
        let leads = self.leads.read();
        let mut counts = HashMap::new();
        for lead in leads.values().filter(|l| !l.is_closed()) {
            if let Some(agent) = &lead.assignment.assigned_to {
                *counts.entry(agent.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[async_trait]
impl LeadStore for InMemoryStore {
    async fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>> {
        Ok(self.leads.read().get(id).cloned())
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .leads
            .read()
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            leads.truncate(limit);
        }
        Ok(leads)
    }

    async fn write_assignment(&self, id: &LeadId, assignment: &Assignment, guard: WriteGuard) -> Result<Assignment> {
        let mut leads = self.leads.write();
        let lead = leads
            .get_mut(id)
            .ok_or_else(|| AssignmentError::LeadNotFound(id.clone()))?;

        if lead.is_closed() {
            return Err(AssignmentError::LeadAlreadyClosed {
                lead_id: id.clone(),
                status: lead.status,
            });
        }
        if guard == WriteGuard::Unassigned {
            if let Some(owner) = &lead.assignment.assigned_to {
                return Err(AssignmentError::AlreadyAssigned {
                    lead_id: id.clone(),
                    assigned_to: owner.clone(),
                });
            }
        }

        let previous = std::mem::replace(&mut lead.assignment, assignment.clone());
        lead.updated_at = assignment.assigned_at.unwrap_or_else(Utc::now);
        Ok(previous)
    }
}

#[async_trait]
impl AgentDirectory for InMemoryStore {
    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>> {
        Ok(self.agents.read().get(id).cloned())
    }

    async fn list_agents(&self, criteria: &AgentCriteria) -> Result<Vec<AgentSnapshot>> {
        let counts = self.open_counts();
        let mut snapshots: Vec<AgentSnapshot> = self
            .agents
            .read()
            .values()
            .filter(|a| criteria.matches(a))
            .map(|agent| AgentSnapshot {
                active_lead_count: counts.get(&agent.id).copied().unwrap_or(0),
                agent: agent.clone(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.agent.id.cmp(&b.agent.id));
        Ok(snapshots)
    }

    async fn active_lead_counts(&self, ids: &[AgentId]) -> Result<HashMap<AgentId, u32>> {
        let counts = self.open_counts();
        Ok(ids
            .iter()
            .map(|id| (id.clone(), counts.get(id).copied().unwrap_or(0)))
            .collect())
    }
}

#[async_trait]
impl RuleStore for InMemoryStore {
    async fn list_active_rules_by_priority(&self) -> Result<Vec<AssignmentRule>> {
        let mut rules: Vec<AssignmentRule> = self.rules.read().iter().filter(|r| r.is_active).cloned().collect();
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(rules)
    }

    async fn get_rule(&self, id: &RuleId) -> Result<Option<AssignmentRule>> {
        Ok(self.rules.read().iter().find(|r| &r.id == id).cloned())
    }

    async fn save_rule(&self, rule: &AssignmentRule) -> Result<()> {
        rule.validate()?;
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule.clone(),
            None => rules.push(rule.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarStore for InMemoryStore {
    async fn get_calendar(&self, id: &str) -> Result<Option<WorkingHoursConfig>> {
        Ok(self.calendars.read().get(id).cloned())
    }

    async fn list_holidays(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Holiday>> {
        Ok(self
            .holidays
            .read()
            .iter()
            .filter(|h| h.recurring || (h.date >= from && h.date <= to))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn next_cursor(&self, pool_key: &str) -> Result<u64> {
        let mut entry = self.cursors.entry(pool_key.to_string()).or_insert(0);
        let current = *entry;
        *entry = current.wrapping_add(1);
        Ok(current)
    }
}
