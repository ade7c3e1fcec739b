//! # Collaborator Interfaces
//!
//! The engine owns no persistence of its own. Everything it reads or writes goes
//! through the traits below, injected into the
//! [`AssignmentCoordinator`](crate::orchestrator::AssignmentCoordinator):
//!
//! | Trait | Role |
//! |-------|------|
//! | [`LeadStore`] | lead snapshots and the atomic assignment write |
//! | [`AgentDirectory`] | agents with their open-lead counts |
//! | [`RuleStore`] | assignment rules by priority |
//! | [`CalendarStore`] | working-hours configs and holidays |
//! | [`CursorStore`] | shared round-robin cursors |
//! | [`AuditSink`] | fire-and-forget activity log |
//!
//! Two implementations ship with the crate: [`memory::InMemoryStore`] for tests
//! and demos, and [`sqlite::SqliteStore`] backed by sqlx.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::calendar::{Holiday, WorkingHoursConfig};
use crate::error::Result;
use crate::model::{Agent, AgentId, AgentSnapshot, Assignment, Lead, LeadId, LeadStatus, RuleId};
use crate::monitoring::AuditEntry;
use crate::routing::AssignmentRule;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Lead selection for bulk reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFilter {
    /// Only these statuses (`None` = any)
    pub statuses: Option<Vec<LeadStatus>>,
    /// Only leads owned by this agent
    pub assigned_to: Option<AgentId>,
    /// `Some(true)` owned leads, `Some(false)` unowned leads
    pub assigned: Option<bool>,
    pub limit: Option<usize>,
}

impl LeadFilter {
    /// Leads in a non-terminal status
    pub fn open() -> Self {
        Self {
            statuses: Some(LeadStatus::open_statuses().to_vec()),
            ..Default::default()
        }
    }

    pub fn assigned(mut self) -> Self {
        self.assigned = Some(true);
        self
    }

    pub fn unassigned(mut self) -> Self {
        self.assigned = Some(false);
        self
    }

    pub fn owned_by(mut self, agent: AgentId) -> Self {
        self.assigned_to = Some(agent);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, lead: &Lead) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&lead.status) {
                return false;
            }
        }
        if let Some(agent) = &self.assigned_to {
            if lead.assignment.assigned_to.as_ref() != Some(agent) {
                return false;
            }
        }
        if let Some(assigned) = self.assigned {
            if lead.assignment.is_assigned() != assigned {
                return false;
            }
        }
        true
    }
}

/// Precondition for an assignment write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteGuard {
    /// Only write when the lead has no owner; otherwise `AlreadyAssigned`
    Unassigned,
    /// Replace whatever owner the lead has
    Overwrite,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>>;

    /// Leads matching `filter`, oldest first
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>>;

    /// Atomically replace the assignment sub-record of one lead
    ///
    /// Fails with `LeadNotFound`, `LeadAlreadyClosed` for terminal leads, or
    /// `AlreadyAssigned` when `guard` is [`WriteGuard::Unassigned`] and the lead
    /// has an owner. Returns the previous assignment.
    async fn write_assignment(&self, id: &LeadId, assignment: &Assignment, guard: WriteGuard) -> Result<Assignment>;
}

/// Directory query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentCriteria {
    pub active_only: bool,
    /// Restrict to these ids
    pub agent_ids: Option<Vec<AgentId>>,
}

impl AgentCriteria {
    pub fn active() -> Self {
        Self {
            active_only: true,
            agent_ids: None,
        }
    }

    pub fn matches(&self, agent: &Agent) -> bool {
        (!self.active_only || agent.is_active)
            && self
                .agent_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&agent.id))
    }
}

#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>>;

    /// Agents with their current open-lead counts, ordered by id
    async fn list_agents(&self, criteria: &AgentCriteria) -> Result<Vec<AgentSnapshot>>;

    /// Fresh open-lead counts; ids without leads map to 0
    async fn active_lead_counts(&self, ids: &[AgentId]) -> Result<HashMap<AgentId, u32>>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active rules, ascending priority
    async fn list_active_rules_by_priority(&self) -> Result<Vec<AssignmentRule>>;

    async fn get_rule(&self, id: &RuleId) -> Result<Option<AssignmentRule>>;

    /// Insert or replace; the rule is validated first
    async fn save_rule(&self, rule: &AssignmentRule) -> Result<()>;
}

#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn get_calendar(&self, id: &str) -> Result<Option<WorkingHoursConfig>>;

    /// Holidays dated within `[from, to]`, plus every recurring holiday
    async fn list_holidays(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Holiday>>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Return the pool's cursor and advance it by one, atomically
    async fn next_cursor(&self, pool_key: &str) -> Result<u64>;
}

/// Activity log collaborator
///
/// Failures are logged by the caller and never fail the assignment.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}
