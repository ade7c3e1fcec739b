//! The assignment coordinator
//!
//! Every store access of the engine happens here. Calendars, rules and agents
//! are loaded per call, handed to the pure components, and the outcome is
//! written back through [`LeadStore::write_assignment`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::gate::PoolGate;
use super::types::{AssignmentResult, OverdueFilter, ReassignmentResult, SweepFailure, SweepReport};
use crate::calendar::{CalendarSet, WorkingHoursCalendar, MAX_DAY_STEPS};
use crate::config::EngineConfig;
use crate::error::{AssignmentError, Result};
use crate::model::{AgentId, AgentSnapshot, Assignment, AssignmentReason, Lead, LeadId, RuleId};
use crate::monitoring::{
    workloads, AssignmentEvent, AssignmentEvents, AssignmentStatistics, AuditEntry, AuditKind, TracingAuditSink,
    UserWorkload,
};
use crate::routing::{
    AssignOptions, AssignmentRule, ConditionOutcome, EligibilityPolicy, EvaluationContext, RuleAction, RuleEngine,
    WorkloadBalancer,
};
use crate::sla::{SlaClock, SlaStatus};
use crate::store::{
    AgentCriteria, AgentDirectory, AuditSink, CalendarStore, CursorStore, LeadFilter, LeadStore, RuleStore,
    WriteGuard,
};

/// Actor recorded for automatic assignments
const SYSTEM_ACTOR: &str = "system";

/// Pool chosen for one lead before the balancer runs
struct Selection {
    candidates: Vec<AgentId>,
    reason: AssignmentReason,
    rule_id: Option<RuleId>,
    actions: Vec<RuleAction>,
}

/// Orchestrates rule matching, balancing, persistence and SLA queries
///
/// Built with [`AssignmentCoordinatorBuilder`]. All collaborators are trait
/// objects so tests can inject [`InMemoryStore`](crate::store::InMemoryStore)
/// and a [`ManualClock`](super::ManualClock).
pub struct AssignmentCoordinator {
    config: EngineConfig,
    leads: Arc<dyn LeadStore>,
    agents: Arc<dyn AgentDirectory>,
    rules: Arc<dyn RuleStore>,
    calendars: Arc<dyn CalendarStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    engine: RuleEngine,
    balancer: WorkloadBalancer,
    sla: SlaClock,
    eligibility: EligibilityPolicy,
    gate: PoolGate,
    events: AssignmentEvents,
}

impl AssignmentCoordinator {
    pub fn builder() -> AssignmentCoordinatorBuilder {
        AssignmentCoordinatorBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive assignment events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<AssignmentEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &AssignmentEvents {
        &self.events
    }

    /// Assign an unowned open lead using rules, then the balancer
    pub async fn assign_lead(&self, lead_id: &LeadId) -> Result<AssignmentResult> {
        self.assign_lead_with(lead_id, AssignOptions::default()).await
    }

    /// [`assign_lead`](Self::assign_lead) with per-call eligibility overrides
    pub async fn assign_lead_with(&self, lead_id: &LeadId, options: AssignOptions) -> Result<AssignmentResult> {
        let result = self.try_assign(lead_id, options).await;
        if let Err(e) = &result {
            warn!("❌ Assignment of lead {} failed: {}", lead_id, e);
            self.events.publish(AssignmentEvent::AssignmentFailed {
                event_id: Uuid::new_v4(),
                lead_id: lead_id.clone(),
                error: e.to_string(),
                at: self.clock.now(),
            });
        }
        result
    }

    async fn try_assign(&self, lead_id: &LeadId, options: AssignOptions) -> Result<AssignmentResult> {
        let now = self.clock.now();
        let lead = self.load_open_lead(lead_id).await?;
        if let Some(owner) = &lead.assignment.assigned_to {
            return Err(AssignmentError::AlreadyAssigned {
                lead_id: lead_id.clone(),
                assigned_to: owner.clone(),
            });
        }

        let rules = self.rules.list_active_rules_by_priority().await?;
        let agents = self.agents.list_agents(&AgentCriteria::active()).await?;

        let mut calendar_ids = self.sla_calendar_ids();
        calendar_ids.extend(agents.iter().filter_map(|a| a.agent.working_hours.clone()));
        calendar_ids.extend(rules.iter().filter_map(|r| r.working_hours.clone()));
        let calendars = self.load_calendars(calendar_ids, now, now).await?;

        let pool = self
            .eligibility
            .eligible_pool(&lead, agents, &calendars, now, options);
        debug!("Lead {} has {} eligible agent(s)", lead_id, pool.len());

        let selection = self.select_pool(&lead, &rules, &pool, &calendars, now);
        if selection.candidates.is_empty() {
            return Err(AssignmentError::NoEligibleAgent(lead_id.clone()));
        }

        let capacities: HashMap<&AgentId, Option<u32>> = pool
            .iter()
            .map(|s| (&s.agent.id, s.agent.max_active_leads))
            .collect();

        // Loads are re-read under the gate so concurrent picks see each other's writes
        let guard = self.gate.lock(&selection.candidates).await;
        let loads = self.agents.active_lead_counts(&selection.candidates).await?;
        let candidates: Vec<AgentId> = if self.config.assignment.enforce_capacity {
            selection
                .candidates
                .iter()
                .filter(|id| match capacities.get(id).copied().flatten() {
                    Some(max) => loads.get(*id).copied().unwrap_or(0) < max,
                    None => true,
                })
                .cloned()
                .collect()
        } else {
            selection.candidates.clone()
        };

        let assigned_to = self
            .balancer
            .pick(&candidates, &loads)
            .await?
            .ok_or_else(|| AssignmentError::NoEligibleAgent(lead_id.clone()))?;

        let assignment = Assignment::new(assigned_to.clone(), now, selection.reason.clone());
        self.leads
            .write_assignment(lead_id, &assignment, WriteGuard::Unassigned)
            .await?;
        drop(guard);

        info!(
            "✅ Lead {} assigned to {} ({})",
            lead_id, assigned_to, selection.reason
        );

        let sla_deadline = self.deadline_for(&lead, &calendars, now);

        self.record_audit(AuditEntry::new(
            lead_id.clone(),
            AuditKind::Assigned,
            json!({
                "assignedTo": assigned_to,
                "assignmentReason": selection.reason,
                "ruleId": selection.rule_id,
                "candidates": selection.candidates,
                "slaDeadline": sla_deadline,
            }),
            SYSTEM_ACTOR,
            now,
        ))
        .await;

        self.events.publish(AssignmentEvent::LeadAssigned {
            event_id: Uuid::new_v4(),
            lead_id: lead_id.clone(),
            assigned_to: assigned_to.clone(),
            reason: selection.reason.clone(),
            rule_id: selection.rule_id.clone(),
            at: now,
        });
        if let Some(rule_id) = &selection.rule_id {
            for action in &selection.actions {
                self.events.publish(AssignmentEvent::ActionRequested {
                    event_id: Uuid::new_v4(),
                    lead_id: lead_id.clone(),
                    rule_id: rule_id.clone(),
                    assigned_to: assigned_to.clone(),
                    action: action.clone(),
                    at: now,
                });
            }
        }

        Ok(AssignmentResult {
            lead_id: lead_id.clone(),
            assigned_to,
            assignment_reason: selection.reason,
            assigned_at: now,
            rule_id: selection.rule_id,
            actions: selection.actions,
            sla_deadline,
        })
    }

    fn select_pool(
        &self,
        lead: &Lead,
        rules: &[AssignmentRule],
        pool: &[AgentSnapshot],
        calendars: &CalendarSet,
        now: DateTime<Utc>,
    ) -> Selection {
        let ctx = EvaluationContext {
            agents: pool,
            calendars,
            now,
        };

        match self.engine.evaluate(lead, rules, &ctx) {
            Some(matched) => Selection {
                candidates: matched.candidates,
                reason: AssignmentReason::rule(matched.rule.name.clone()),
                rule_id: Some(matched.rule.id.clone()),
                actions: matched.rule.side_effects(),
            },
            None => {
                debug!("No rule matched lead {}, falling back to the balancer", lead.id);
                let mut candidates: Vec<AgentId> = pool.iter().map(|s| s.agent.id.clone()).collect();
                candidates.sort();
                Selection {
                    candidates,
                    reason: AssignmentReason::RoundRobin,
                    rule_id: None,
                    actions: Vec::new(),
                }
            }
        }
    }

    /// Deadline for a just-written assignment; the write is already committed
    fn deadline_for(&self, lead: &Lead, calendars: &CalendarSet, assigned_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let hours = self.config.sla.hours_for(lead);
        let timing = self
            .sla_calendar(calendars)
            .and_then(|calendar| self.sla.compute_status(calendar, assigned_at, hours, assigned_at));
        match timing {
            Ok(timing) => Some(timing.sla_deadline),
            Err(e) => {
                warn!("⚠️ No SLA deadline for lead {}: {}", lead.id, e);
                None
            }
        }
    }

    /// Hand an open lead to `new_assignee`, whatever its current owner
    pub async fn reassign_lead(
        &self,
        lead_id: &LeadId,
        new_assignee: &AgentId,
        reason: &str,
        actor: &AgentId,
    ) -> Result<ReassignmentResult> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AssignmentError::validation("reassignment reason cannot be empty"));
        }
        let assignment_reason = AssignmentReason::manual(reason)?;

        let now = self.clock.now();
        self.load_open_lead(lead_id).await?;

        let agent = self
            .agents
            .get_agent(new_assignee)
            .await?
            .ok_or_else(|| AssignmentError::AgentNotFound(new_assignee.clone()))?;
        self.eligibility.check_manual(&agent)?;

        let assignment = Assignment::new(new_assignee.clone(), now, assignment_reason.clone());

        let previous = {
            let _guard = self.gate.lock(std::slice::from_ref(new_assignee)).await;
            self.leads
                .write_assignment(lead_id, &assignment, WriteGuard::Overwrite)
                .await?
        };
        let previous_assignee = previous.assigned_to;

        info!(
            "🔄 Lead {} reassigned from {} to {} by {}",
            lead_id,
            previous_assignee.as_ref().map_or("nobody", |a| a.as_str()),
            new_assignee,
            actor
        );

        self.record_audit(AuditEntry::new(
            lead_id.clone(),
            AuditKind::Reassigned,
            json!({
                "from": previous_assignee,
                "to": new_assignee,
                "reason": reason,
            }),
            actor.to_string(),
            now,
        ))
        .await;

        self.events.publish(AssignmentEvent::LeadReassigned {
            event_id: Uuid::new_v4(),
            lead_id: lead_id.clone(),
            previous_assignee: previous_assignee.clone(),
            assigned_to: new_assignee.clone(),
            reason: assignment_reason.clone(),
            actor: actor.clone(),
            at: now,
        });

        Ok(ReassignmentResult {
            lead_id: lead_id.clone(),
            assigned_to: new_assignee.clone(),
            previous_assignee,
            assignment_reason,
            assigned_at: now,
        })
    }

    /// SLA status of one lead; `None` while it is unassigned
    pub async fn check_sla_compliance(&self, lead_id: &LeadId) -> Result<Option<SlaStatus>> {
        let lead = self
            .leads
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| AssignmentError::LeadNotFound(lead_id.clone()))?;

        let mut statuses = self.statuses_for(std::slice::from_ref(&lead), self.clock.now()).await?;
        Ok(statuses.pop())
    }

    /// Overdue open leads, earliest deadline first
    pub async fn get_overdue_leads(&self, filter: &OverdueFilter) -> Result<Vec<SlaStatus>> {
        let mut lead_filter = LeadFilter::open().assigned();
        if let Some(agent) = &filter.assigned_to {
            lead_filter = lead_filter.owned_by(agent.clone());
        }

        let leads = self.leads.list_leads(&lead_filter).await?;
        let mut overdue: Vec<SlaStatus> = self
            .statuses_for(&leads, self.clock.now())
            .await?
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();
        overdue.sort_by(|a, b| a.sla_deadline.cmp(&b.sla_deadline).then_with(|| a.lead_id.cmp(&b.lead_id)));

        debug!("{} overdue lead(s) for {:?}", overdue.len(), filter);
        Ok(overdue)
    }

    /// Open-lead load of every agent, active or not
    pub async fn get_all_user_workloads(&self) -> Result<Vec<UserWorkload>> {
        let agents = self.agents.list_agents(&AgentCriteria::default()).await?;
        let leads = self.leads.list_leads(&LeadFilter::open().assigned()).await?;
        let statuses = self.statuses_for(&leads, self.clock.now()).await?;
        Ok(workloads(&agents, &statuses))
    }

    pub async fn get_assignment_statistics(&self) -> Result<AssignmentStatistics> {
        let now = self.clock.now();
        let leads = self.leads.list_leads(&LeadFilter::open()).await?;
        let statuses = self.statuses_for(&leads, now).await?;
        Ok(AssignmentStatistics::collect(&leads, &statuses, now))
    }

    /// Try to assign up to `limit` unowned open leads, oldest first
    ///
    /// Each lead is attempted once; failures are collected, not retried.
    pub async fn assign_unassigned_leads(&self, limit: usize) -> Result<SweepReport> {
        let leads = self
            .leads
            .list_leads(&LeadFilter::open().unassigned().with_limit(limit))
            .await?;

        let mut report = SweepReport::default();
        for lead in leads {
            match self.assign_lead(&lead.id).await {
                Ok(result) => report.assigned.push(result),
                Err(e) => report.failed.push(SweepFailure {
                    lead_id: lead.id,
                    error: e.to_string(),
                }),
            }
        }

        info!(
            "🧹 Sweep attempted {} lead(s): {} assigned, {} failed",
            report.attempted(),
            report.assigned.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Condition-by-condition evaluation of one rule against one lead
    pub async fn explain_rule(&self, lead_id: &LeadId, rule_id: &RuleId) -> Result<Vec<ConditionOutcome>> {
        let lead = self
            .leads
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| AssignmentError::LeadNotFound(lead_id.clone()))?;
        let rule = self
            .rules
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| AssignmentError::RuleNotFound(rule_id.clone()))?;
        Ok(self.engine.explain(&lead, &rule))
    }

    async fn load_open_lead(&self, lead_id: &LeadId) -> Result<Lead> {
        let lead = self
            .leads
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| AssignmentError::LeadNotFound(lead_id.clone()))?;
        if lead.is_closed() {
            return Err(AssignmentError::LeadAlreadyClosed {
                lead_id: lead_id.clone(),
                status: lead.status,
            });
        }
        Ok(lead)
    }

    async fn statuses_for(&self, leads: &[Lead], now: DateTime<Utc>) -> Result<Vec<SlaStatus>> {
        let owned: Vec<(&Lead, &AgentId, DateTime<Utc>)> = leads
            .iter()
            .filter_map(|lead| {
                let agent = lead.assignment.assigned_to.as_ref()?;
                let assigned_at = lead.assignment.assigned_at?;
                Some((lead, agent, assigned_at))
            })
            .collect();
        if owned.is_empty() {
            return Ok(Vec::new());
        }

        let earliest = owned.iter().map(|(_, _, at)| *at).min().unwrap_or(now);
        let calendars = self.load_calendars(self.sla_calendar_ids(), earliest, now).await?;
        let calendar = self.sla_calendar(&calendars)?;

        let mut statuses = Vec::with_capacity(owned.len());
        for (lead, agent, assigned_at) in owned {
            let hours = self.config.sla.hours_for(lead);
            let timing = self.sla.compute_status(calendar, assigned_at, hours, now)?;
            statuses.push(SlaStatus::new(lead.id.clone(), agent.clone(), assigned_at, hours, timing));
        }
        Ok(statuses)
    }

    fn sla_calendar_ids(&self) -> BTreeSet<String> {
        BTreeSet::from([self.config.sla_calendar_id().to_string()])
    }

    fn sla_calendar<'s>(&self, calendars: &'s CalendarSet) -> Result<&'s WorkingHoursCalendar> {
        let id = self.config.sla_calendar_id();
        if !calendars.contains(id) {
            return Err(AssignmentError::CalendarNotFound(id.to_string()));
        }
        Ok(calendars.resolve(Some(id)))
    }

    /// Build the calendars named by `ids` plus the default one
    ///
    /// Holidays are fetched for a window wide enough for any walk starting
    /// between `earliest` and `latest`. Unknown non-default ids fall back to
    /// the default calendar.
    async fn load_calendars(
        &self,
        ids: BTreeSet<String>,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> Result<CalendarSet> {
        let (from, to) = holiday_window(earliest, latest);
        let holidays = self.calendars.list_holidays(from, to).await?;
        let holiday_types = self.config.assignment.holiday_types.as_deref();

        let default_id = &self.config.assignment.default_calendar_id;
        let default = self
            .calendars
            .get_calendar(default_id)
            .await?
            .ok_or_else(|| AssignmentError::CalendarNotFound(default_id.clone()))?;
        let mut set = CalendarSet::new(WorkingHoursCalendar::with_holiday_filter(
            default,
            holidays.clone(),
            holiday_types,
        )?);

        for id in ids {
            if set.contains(&id) {
                continue;
            }
            match self.calendars.get_calendar(&id).await? {
                Some(config) => set.insert(WorkingHoursCalendar::with_holiday_filter(
                    config,
                    holidays.clone(),
                    holiday_types,
                )?),
                None => warn!("⚠️ Calendar '{}' not found, using '{}'", id, default_id),
            }
        }
        Ok(set)
    }

    async fn record_audit(&self, entry: AuditEntry) {
        let lead_id = entry.lead_id.clone();
        if let Err(e) = self.audit.record(entry).await {
            warn!("⚠️ Failed to record audit entry for lead {}: {}", lead_id, e);
        }
    }
}

impl std::fmt::Debug for AssignmentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentCoordinator")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Dates whose holidays can affect a walk starting in `[earliest, latest]`
fn holiday_window(earliest: DateTime<Utc>, latest: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let from = earliest.min(latest) - Duration::days(1);
    let to = earliest.max(latest) + Duration::days(i64::from(MAX_DAY_STEPS) + 2);
    (from.date_naive(), to.date_naive())
}

/// Builder for [`AssignmentCoordinator`] with fluent API
///
/// [`with_store`](Self::with_store) wires one value that implements every
/// store trait; individual setters override single collaborators.
pub struct AssignmentCoordinatorBuilder {
    config: Option<EngineConfig>,
    leads: Option<Arc<dyn LeadStore>>,
    agents: Option<Arc<dyn AgentDirectory>>,
    rules: Option<Arc<dyn RuleStore>>,
    calendars: Option<Arc<dyn CalendarStore>>,
    cursors: Option<Arc<dyn CursorStore>>,
    audit: Option<Arc<dyn AuditSink>>,
    clock: Option<Arc<dyn Clock>>,
    event_capacity: usize,
}

impl AssignmentCoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            leads: None,
            agents: None,
            rules: None,
            calendars: None,
            cursors: None,
            audit: None,
            clock: None,
            event_capacity: 1024,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store<S>(mut self, store: Arc<S>) -> Self
    where
        S: LeadStore + AgentDirectory + RuleStore + CalendarStore + CursorStore + 'static,
    {
        self.leads = Some(store.clone());
        self.agents = Some(store.clone());
        self.rules = Some(store.clone());
        self.calendars = Some(store.clone());
        self.cursors = Some(store);
        self
    }

    pub fn with_lead_store(mut self, store: Arc<dyn LeadStore>) -> Self {
        self.leads = Some(store);
        self
    }

    pub fn with_agent_directory(mut self, directory: Arc<dyn AgentDirectory>) -> Self {
        self.agents = Some(directory);
        self
    }

    pub fn with_rule_store(mut self, store: Arc<dyn RuleStore>) -> Self {
        self.rules = Some(store);
        self
    }

    pub fn with_calendar_store(mut self, store: Arc<dyn CalendarStore>) -> Self {
        self.calendars = Some(store);
        self
    }

    pub fn with_cursor_store(mut self, store: Arc<dyn CursorStore>) -> Self {
        self.cursors = Some(store);
        self
    }

    /// Defaults to [`TracingAuditSink`]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Defaults to [`SystemClock`]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<AssignmentCoordinator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let missing = |name: &str| AssignmentError::configuration(format!("{} not provided", name));
        let leads = self.leads.ok_or_else(|| missing("lead store"))?;
        let agents = self.agents.ok_or_else(|| missing("agent directory"))?;
        let rules = self.rules.ok_or_else(|| missing("rule store"))?;
        let calendars = self.calendars.ok_or_else(|| missing("calendar store"))?;
        let cursors = self.cursors.ok_or_else(|| missing("cursor store"))?;

        info!(
            "🚀 Assignment coordinator ready (default calendar '{}', SLA {}h)",
            config.assignment.default_calendar_id, config.sla.default_response_hours
        );

        Ok(AssignmentCoordinator {
            eligibility: EligibilityPolicy::from_config(&config.assignment),
            sla: SlaClock::new(config.sla.escalation.clone()),
            engine: RuleEngine::new(),
            balancer: WorkloadBalancer::new(cursors),
            gate: PoolGate::new(),
            events: AssignmentEvents::new(self.event_capacity),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config,
            leads,
            agents,
            rules,
            calendars,
        })
    }
}

impl Default for AssignmentCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
