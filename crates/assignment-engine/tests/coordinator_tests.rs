//! End-to-end tests for the assignment coordinator over the in-memory store
//!
//! 2024-03-06 is a Wednesday and 2024-03-08 a Friday; the default calendar is
//! Monday to Friday, 09:00-17:00 UTC, with a 4 hour SLA.

use async_trait::async_trait;
use chrono::{Duration, NaiveTime, TimeZone};
use leadflow_assignment_engine::monitoring::AuditKind;
use leadflow_assignment_engine::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn attrs(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap()
}

struct Harness {
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    audit: Arc<MemoryAuditLog>,
    coordinator: AssignmentCoordinator,
}

impl Harness {
    fn new(now: DateTime<Utc>) -> Self {
        Self::with_config(EngineConfig::default(), now)
    }

    fn with_config(config: EngineConfig, now: DateTime<Utc>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        store.insert_calendar(WorkingHoursConfig::business_week("default", "UTC", hm(9, 0), hm(17, 0)));

        let clock = Arc::new(ManualClock::new(now));
        let audit = Arc::new(MemoryAuditLog::new());
        let coordinator = AssignmentCoordinator::builder()
            .with_config(config)
            .with_store(store.clone())
            .with_audit_sink(audit.clone())
            .with_clock(clock.clone())
            .build()
            .unwrap();

        Self {
            store,
            clock,
            audit,
            coordinator,
        }
    }

    fn agent(&self, agent: Agent) {
        self.store.upsert_agent(agent);
    }

    fn lead(&self, id: &str, attributes: Value) -> LeadId {
        let lead = Lead::new(id, LeadStatus::New, attrs(attributes));
        let lead_id = lead.id.clone();
        self.store.insert_lead(lead);
        lead_id
    }

    /// Open lead already owned by `agent`
    fn owned_lead(&self, id: &str, agent: &str) {
        let mut lead = Lead::new(id, LeadStatus::Contacted, serde_json::Map::new());
        lead.assignment = Assignment::new(AgentId::from(agent), self.clock.now(), AssignmentReason::RoundRobin);
        self.store.insert_lead(lead);
    }

    async fn rule(&self, rule: AssignmentRule) {
        self.store.save_rule(&rule).await.unwrap();
    }
}

fn two_reps(h: &Harness) {
    h.agent(Agent::new("rep-a", "Alice", AgentRole::SalesRep));
    h.agent(Agent::new("rep-b", "Bob", AgentRole::SalesRep));
}

#[tokio::test]
async fn test_rule_match_assigns_named_user() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    h.rule(
        AssignmentRule::new("hot", "Hot leads", 1)
            .with_condition("score.value", ConditionOperator::GreaterThan, json!(80))
            .with_action(RuleAction::AssignToUser {
                user_id: AgentId::from("rep-a"),
            }),
    )
    .await;
    let lead_id = h.lead("lead-1", json!({"score": {"value": 95}}));

    let result = h.coordinator.assign_lead(&lead_id).await.unwrap();

    assert_eq!(result.assigned_to, AgentId::from("rep-a"));
    assert_eq!(result.assignment_reason.to_string(), "rule:Hot leads");
    assert_eq!(result.rule_id, Some(RuleId::from("hot")));
    assert_eq!(result.sla_deadline, Some(at(6, 14, 0)));

    let stored = h.store.get_lead(&lead_id).await.unwrap().unwrap();
    assert_eq!(stored.assignment.assigned_to, Some(AgentId::from("rep-a")));
    assert_eq!(stored.assignment.assigned_at, Some(at(6, 10, 0)));
}

#[tokio::test]
async fn test_low_score_falls_back_to_balancer() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    h.rule(
        AssignmentRule::new("hot", "Hot leads", 1)
            .with_condition("score.value", ConditionOperator::GreaterThan, json!(80))
            .with_action(RuleAction::AssignToUser {
                user_id: AgentId::from("rep-a"),
            }),
    )
    .await;
    h.owned_lead("old-1", "rep-a");
    let lead_id = h.lead("lead-1", json!({"score": {"value": 40}}));

    let result = h.coordinator.assign_lead(&lead_id).await.unwrap();
    assert_eq!(result.assigned_to, AgentId::from("rep-b"));
    assert_eq!(result.assignment_reason, AssignmentReason::RoundRobin);
    assert_eq!(result.rule_id, None);
}

#[tokio::test]
async fn test_least_loaded_then_round_robin() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    for i in 0..3 {
        h.owned_lead(&format!("a-{}", i), "rep-a");
    }
    h.owned_lead("b-0", "rep-b");

    let mut picks = Vec::new();
    for i in 0..4 {
        let lead_id = h.lead(&format!("new-{}", i), json!({}));
        let result = h.coordinator.assign_lead(&lead_id).await.unwrap();
        picks.push(result.assigned_to.to_string());
    }

    // {3,1} -> b, {3,2} -> b, {3,3} tie at cursor 2 -> a, {4,3} -> b
    assert_eq!(picks, vec!["rep-b", "rep-b", "rep-a", "rep-b"]);
}

#[tokio::test]
async fn test_friday_afternoon_deadline_rolls_to_monday() {
    let h = Harness::new(at(8, 15, 30));
    two_reps(&h);
    let lead_id = h.lead("lead-1", json!({}));

    let result = h.coordinator.assign_lead(&lead_id).await.unwrap();
    assert_eq!(result.sla_deadline, Some(at(11, 11, 30)));

    h.clock.set(at(8, 16, 0));
    let status = h.coordinator.check_sla_compliance(&lead_id).await.unwrap().unwrap();
    assert_eq!(status.sla_deadline, at(11, 11, 30));
    assert!((status.hours_remaining - 3.5).abs() < 1e-9);
    assert!(!status.is_overdue);
    assert_eq!(status.escalation_level, 0);
}

#[tokio::test]
async fn test_reassignment_restarts_sla() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    let lead_id = h.lead("lead-1", json!({"score": {"value": 10}}));
    h.rule(
        AssignmentRule::new("to-a", "Everything to Alice", 1).with_action(RuleAction::AssignToUser {
            user_id: AgentId::from("rep-a"),
        }),
    )
    .await;
    h.coordinator.assign_lead(&lead_id).await.unwrap();

    h.clock.advance(Duration::hours(2));
    let result = h
        .coordinator
        .reassign_lead(&lead_id, &AgentId::from("rep-b"), "covering vacation", &AgentId::from("manager-1"))
        .await
        .unwrap();

    assert_eq!(result.previous_assignee, Some(AgentId::from("rep-a")));
    assert_eq!(result.assigned_to, AgentId::from("rep-b"));
    assert_eq!(result.assignment_reason, AssignmentReason::Manual("covering vacation".to_string()));

    let status = h.coordinator.check_sla_compliance(&lead_id).await.unwrap().unwrap();
    assert_eq!(status.assigned_at, at(6, 12, 0));
    assert_eq!(status.sla_deadline, at(6, 16, 0));
    assert_eq!(status.assigned_to, AgentId::from("rep-b"));
}

#[tokio::test]
async fn test_assignment_state_errors() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);

    let err = h.coordinator.assign_lead(&LeadId::from("ghost")).await.unwrap_err();
    assert!(matches!(err, AssignmentError::LeadNotFound(_)));

    let closed = h.lead("closed", json!({}));
    h.store.set_lead_status(&closed, LeadStatus::ClosedWon).unwrap();
    let err = h.coordinator.assign_lead(&closed).await.unwrap_err();
    assert!(matches!(err, AssignmentError::LeadAlreadyClosed { .. }));

    let lead_id = h.lead("lead-1", json!({}));
    h.coordinator.assign_lead(&lead_id).await.unwrap();
    let err = h.coordinator.assign_lead(&lead_id).await.unwrap_err();
    assert!(matches!(err, AssignmentError::AlreadyAssigned { .. }));
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_no_eligible_agent() {
    let h = Harness::new(at(6, 10, 0));
    h.agent(Agent::new("rep-a", "Alice", AgentRole::SalesRep).inactive());
    h.agent(Agent::new("viewer", "Vic", AgentRole::Viewer));
    let lead_id = h.lead("lead-1", json!({}));

    let err = h.coordinator.assign_lead(&lead_id).await.unwrap_err();
    assert!(matches!(err, AssignmentError::NoEligibleAgent(_)));

    let stored = h.store.get_lead(&lead_id).await.unwrap().unwrap();
    assert!(!stored.assignment.is_assigned());
}

#[tokio::test]
async fn test_off_shift_agents_unless_overridden() {
    // Saturday
    let h = Harness::new(at(9, 10, 0));
    two_reps(&h);
    let lead_id = h.lead("lead-1", json!({}));

    let err = h.coordinator.assign_lead(&lead_id).await.unwrap_err();
    assert!(matches!(err, AssignmentError::NoEligibleAgent(_)));

    let result = h
        .coordinator
        .assign_lead_with(
            &lead_id,
            AssignOptions {
                ignore_working_hours: true,
            },
        )
        .await
        .unwrap();
    // Saturday counts nothing; four hours from Monday 09:00
    assert_eq!(result.sla_deadline, Some(at(11, 13, 0)));
}

#[tokio::test]
async fn test_capacity_and_territory_filters() {
    let h = Harness::new(at(6, 10, 0));
    h.agent(
        Agent::new("rep-a", "Alice", AgentRole::SalesRep)
            .with_territory("EMEA")
            .with_max_active_leads(1),
    );
    h.agent(Agent::new("rep-b", "Bob", AgentRole::SalesRep).with_territory("APAC"));
    h.agent(Agent::new("rep-c", "Cleo", AgentRole::SalesRep).with_territory("EMEA"));
    h.owned_lead("old-1", "rep-a");

    let emea = h.lead("emea", json!({"territory": "emea"}));
    let result = h.coordinator.assign_lead(&emea).await.unwrap();
    // rep-a is full and rep-b serves another territory
    assert_eq!(result.assigned_to, AgentId::from("rep-c"));
}

#[tokio::test]
async fn test_role_rule_routes_to_senior_reps() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    h.agent(Agent::new("senior-1", "Sam", AgentRole::SeniorSalesRep));
    h.rule(
        AssignmentRule::new("senior", "High value to seniors", 1)
            .with_condition("dealSize", ConditionOperator::GreaterThan, json!(50000))
            .with_action(RuleAction::AssignToRole {
                role: AgentRole::SeniorSalesRep,
            }),
    )
    .await;

    let big = h.lead("big", json!({"dealSize": 120000}));
    let result = h.coordinator.assign_lead(&big).await.unwrap();
    assert_eq!(result.assigned_to, AgentId::from("senior-1"));

    // Seniors are still part of the general pool
    let small = h.lead("small", json!({"dealSize": 100}));
    let result = h.coordinator.assign_lead(&small).await.unwrap();
    assert_eq!(result.assignment_reason, AssignmentReason::RoundRobin);
}

#[tokio::test]
async fn test_rule_without_candidate_is_skipped() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    h.rule(
        AssignmentRule::new("apac", "APAC desk", 1)
            .with_territories(["APAC"])
            .with_action(RuleAction::RoundRobin),
    )
    .await;
    h.rule(
        AssignmentRule::new("fallback", "Catch all", 2).with_action(RuleAction::AssignToUser {
            user_id: AgentId::from("rep-b"),
        }),
    )
    .await;

    let lead_id = h.lead("lead-1", json!({}));
    let result = h.coordinator.assign_lead(&lead_id).await.unwrap();
    assert_eq!(result.assigned_to, AgentId::from("rep-b"));
    assert_eq!(result.assignment_reason.to_string(), "rule:Catch all");
}

#[tokio::test]
async fn test_reassign_errors() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    h.agent(Agent::new("gone", "Gone", AgentRole::SalesRep).inactive());
    h.agent(Agent::new("viewer", "Vic", AgentRole::Viewer));
    let lead_id = h.lead("lead-1", json!({}));
    let actor = AgentId::from("manager-1");

    let err = h
        .coordinator
        .reassign_lead(&lead_id, &AgentId::from("gone"), "cover", &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AssignmentError::AgentNotEligible { .. }));

    let err = h
        .coordinator
        .reassign_lead(&lead_id, &AgentId::from("viewer"), "cover", &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AssignmentError::AgentNotEligible { .. }));

    let err = h
        .coordinator
        .reassign_lead(&lead_id, &AgentId::from("nobody"), "cover", &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AssignmentError::AgentNotFound(_)));

    let err = h
        .coordinator
        .reassign_lead(&LeadId::from("ghost"), &AgentId::from("rep-a"), "cover", &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AssignmentError::LeadNotFound(_)));

    let err = h
        .coordinator
        .reassign_lead(&lead_id, &AgentId::from("rep-a"), "  ", &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AssignmentError::Validation(_)));

    // Unassigned leads can be handed out manually
    let result = h
        .coordinator
        .reassign_lead(&lead_id, &AgentId::from("rep-a"), "cover", &actor)
        .await
        .unwrap();
    assert_eq!(result.previous_assignee, None);
}

#[tokio::test]
async fn test_audit_trail_and_events() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    h.rule(
        AssignmentRule::new("hot", "Hot leads", 1)
            .with_condition("score.value", ConditionOperator::GreaterThan, json!(80))
            .with_action(RuleAction::AssignToUser {
                user_id: AgentId::from("rep-a"),
            })
            .with_action(RuleAction::Notify {
                channel: "email".to_string(),
                template: Some("hot-lead".to_string()),
            }),
    )
    .await;
    let mut events = h.coordinator.subscribe();
    let lead_id = h.lead("lead-1", json!({"score": {"value": 99}}));

    let result = h.coordinator.assign_lead(&lead_id).await.unwrap();
    assert_eq!(result.actions.len(), 1);
    h.coordinator
        .reassign_lead(&lead_id, &AgentId::from("rep-b"), "territory change", &AgentId::from("manager-1"))
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        AssignmentEvent::LeadAssigned { assigned_to, .. } => assert_eq!(assigned_to.as_str(), "rep-a"),
        other => panic!("unexpected event: {:?}", other),
    }
    match events.recv().await.unwrap() {
        AssignmentEvent::ActionRequested { action, .. } => assert_eq!(action.type_name(), "notify"),
        other => panic!("unexpected event: {:?}", other),
    }
    match events.recv().await.unwrap() {
        AssignmentEvent::LeadReassigned { previous_assignee, .. } => {
            assert_eq!(previous_assignee, Some(AgentId::from("rep-a")))
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let trail = h.audit.entries_for(&lead_id);
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].kind, AuditKind::Assigned);
    assert_eq!(trail[0].actor, "system");
    assert_eq!(trail[1].kind, AuditKind::Reassigned);
    assert_eq!(trail[1].actor, "manager-1");
    assert_eq!(trail[1].details["from"], json!("rep-a"));
}

#[tokio::test]
async fn test_failed_assignment_is_broadcast() {
    let h = Harness::new(at(6, 10, 0));
    let mut events = h.coordinator.subscribe();
    let lead_id = h.lead("lead-1", json!({}));

    assert!(h.coordinator.assign_lead(&lead_id).await.is_err());
    match events.recv().await.unwrap() {
        AssignmentEvent::AssignmentFailed { lead_id: failed, .. } => assert_eq!(failed, lead_id),
        other => panic!("unexpected event: {:?}", other),
    }
}

struct BrokenAuditSink;

#[async_trait]
impl AuditSink for BrokenAuditSink {
    async fn record(&self, _entry: AuditEntry) -> Result<()> {
        Err(AssignmentError::database("activity log unavailable"))
    }
}

#[tokio::test]
async fn test_audit_failure_does_not_fail_assignment() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_calendar(WorkingHoursConfig::always_open("default"));
    store.upsert_agent(Agent::new("rep-a", "Alice", AgentRole::SalesRep));
    store.insert_lead(Lead::new("lead-1", LeadStatus::New, serde_json::Map::new()));

    let coordinator = AssignmentCoordinator::builder()
        .with_store(store)
        .with_audit_sink(Arc::new(BrokenAuditSink))
        .build()
        .unwrap();

    let result = coordinator.assign_lead(&LeadId::from("lead-1")).await.unwrap();
    assert_eq!(result.assigned_to, AgentId::from("rep-a"));
}

#[tokio::test]
async fn test_missing_default_calendar() {
    let store = Arc::new(InMemoryStore::new());
    store.upsert_agent(Agent::new("rep-a", "Alice", AgentRole::SalesRep));
    store.insert_lead(Lead::new("lead-1", LeadStatus::New, serde_json::Map::new()));

    let coordinator = AssignmentCoordinator::builder().with_store(store).build().unwrap();
    let err = coordinator.assign_lead(&LeadId::from("lead-1")).await.unwrap_err();
    assert!(matches!(err, AssignmentError::CalendarNotFound(id) if id == "default"));
}

#[tokio::test]
async fn test_builder_requires_stores() {
    let err = AssignmentCoordinator::builder().build().unwrap_err();
    assert!(matches!(err, AssignmentError::Configuration(_)));
}

#[tokio::test]
async fn test_overdue_queries_and_reports() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    h.agent(Agent::new("rep-c", "Cleo", AgentRole::SalesRep).inactive());
    let first = h.lead("lead-1", json!({}));
    let second = h.lead("lead-2", json!({}));
    h.coordinator.assign_lead(&first).await.unwrap();
    h.coordinator.assign_lead(&second).await.unwrap();
    h.lead("lead-3", json!({}));

    // Deadlines are Wednesday 14:00; Thursday 10:00 is four working hours late
    h.clock.set(at(7, 10, 0));

    let overdue = h.coordinator.get_overdue_leads(&OverdueFilter::default()).await.unwrap();
    assert_eq!(overdue.len(), 2);
    assert!(overdue.iter().all(|s| s.is_overdue && s.escalation_level == 2));
    assert!((overdue[0].hours_remaining + 4.0).abs() < 1e-9);

    let severe = h
        .coordinator
        .get_overdue_leads(&OverdueFilter::default().with_min_level(3))
        .await
        .unwrap();
    assert!(severe.is_empty());

    let owner = overdue[0].assigned_to.clone();
    let mine = h
        .coordinator
        .get_overdue_leads(&OverdueFilter::for_agent(owner.clone()))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].assigned_to, owner);

    let workloads = h.coordinator.get_all_user_workloads().await.unwrap();
    assert_eq!(workloads.len(), 3);
    let rep_a = workloads.iter().find(|w| w.agent_id.as_str() == "rep-a").unwrap();
    assert_eq!(rep_a.active_leads, 1);
    assert_eq!(rep_a.overdue_leads, 1);
    let rep_c = workloads.iter().find(|w| w.agent_id.as_str() == "rep-c").unwrap();
    assert!(!rep_c.is_active);
    assert_eq!(rep_c.active_leads, 0);

    let stats = h.coordinator.get_assignment_statistics().await.unwrap();
    assert_eq!(stats.open_leads, 3);
    assert_eq!(stats.assigned, 2);
    assert_eq!(stats.unassigned, 1);
    assert_eq!(stats.by_reason.round_robin, 2);
    assert_eq!(stats.overdue, 2);
    assert_eq!(stats.by_escalation_level.get(&2), Some(&2));
}

#[tokio::test]
async fn test_check_sla_for_unassigned_lead() {
    let h = Harness::new(at(6, 10, 0));
    let lead_id = h.lead("lead-1", json!({}));
    assert!(h.coordinator.check_sla_compliance(&lead_id).await.unwrap().is_none());

    let err = h
        .coordinator
        .check_sla_compliance(&LeadId::from("ghost"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_priority_specific_sla_hours() {
    let mut config = EngineConfig::default();
    config.sla.priority_hours.insert("urgent".to_string(), 1.0);
    let h = Harness::with_config(config, at(6, 10, 0));
    two_reps(&h);

    let urgent = h.lead("urgent", json!({"priority": "URGENT"}));
    let result = h.coordinator.assign_lead(&urgent).await.unwrap();
    assert_eq!(result.sla_deadline, Some(at(6, 11, 0)));
}

#[tokio::test]
async fn test_sweep_assigns_unowned_open_leads() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    for i in 0..3 {
        h.lead(&format!("lead-{}", i), json!({}));
    }
    let closed = h.lead("closed", json!({}));
    h.store.set_lead_status(&closed, LeadStatus::ClosedLost).unwrap();
    h.owned_lead("owned", "rep-a");

    let report = h.coordinator.assign_unassigned_leads(10).await.unwrap();
    assert_eq!(report.assigned.len(), 3);
    assert!(report.failed.is_empty());

    let again = h.coordinator.assign_unassigned_leads(10).await.unwrap();
    assert_eq!(again.attempted(), 0);
}

#[tokio::test]
async fn test_sweep_collects_failures() {
    let h = Harness::new(at(6, 10, 0));
    for i in 0..2 {
        h.lead(&format!("lead-{}", i), json!({}));
    }

    let report = h.coordinator.assign_unassigned_leads(1).await.unwrap();
    assert_eq!(report.attempted(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("No eligible agent"));
}

#[tokio::test]
async fn test_explain_rule() {
    let h = Harness::new(at(6, 10, 0));
    h.rule(
        AssignmentRule::new("hot", "Hot leads", 1)
            .with_condition("score.value", ConditionOperator::GreaterThan, json!(80))
            .with_condition("source", ConditionOperator::Equals, json!("web")),
    )
    .await;
    let lead_id = h.lead("lead-1", json!({"score": {"value": 95}}));

    let outcomes = h
        .coordinator
        .explain_rule(&lead_id, &RuleId::from("hot"))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].matched);
    assert!(!outcomes[1].matched);
    assert_eq!(outcomes[1].actual, None);

    let err = h
        .coordinator
        .explain_rule(&lead_id, &RuleId::from("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, AssignmentError::RuleNotFound(_)));
}

#[tokio::test]
async fn test_exhausted_sla_calendar_surfaces_to_caller() {
    let mut config = EngineConfig::default();
    config.sla.calendar_id = Some("closed".to_string());
    let h = Harness::with_config(config, at(6, 10, 0));
    two_reps(&h);

    let mut closed = WorkingHoursConfig::business_week("closed", "UTC", hm(9, 0), hm(17, 0));
    closed.schedule = WeeklySchedule::default();
    h.store.insert_calendar(closed);
    let lead_id = h.lead("lead-1", json!({}));

    // The assignment still commits, just without a deadline
    let result = h.coordinator.assign_lead(&lead_id).await.unwrap();
    assert_eq!(result.sla_deadline, None);
    let stored = h.store.get_lead(&lead_id).await.unwrap().unwrap();
    assert_eq!(stored.assignment.assigned_to, Some(result.assigned_to.clone()));

    let err = h.coordinator.check_sla_compliance(&lead_id).await.unwrap_err();
    assert!(
        matches!(&err, AssignmentError::CalendarExhausted { calendar_id, .. } if calendar_id == "closed"),
        "unexpected error: {:?}",
        err
    );
    let err = h
        .coordinator
        .get_overdue_leads(&OverdueFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AssignmentError::CalendarExhausted { .. }));
}

#[tokio::test]
async fn test_oversized_priority_sla_rejected_at_build() {
    let mut config = EngineConfig::default();
    config.sla.priority_hours.insert("someday".to_string(), 1e16);

    let err = AssignmentCoordinator::builder()
        .with_config(config)
        .with_store(Arc::new(InMemoryStore::new()))
        .build()
        .unwrap_err();
    assert!(matches!(err, AssignmentError::Configuration(_)));
}

#[tokio::test]
async fn test_reserved_reassignment_reasons_rejected() {
    let h = Harness::new(at(6, 10, 0));
    two_reps(&h);
    let lead_id = h.lead("lead-1", json!({}));
    h.coordinator.assign_lead(&lead_id).await.unwrap();

    for reason in ["round_robin", "rule: escalated by manager"] {
        let err = h
            .coordinator
            .reassign_lead(&lead_id, &AgentId::from("rep-b"), reason, &AgentId::from("manager-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssignmentError::Validation(_)), "'{}' accepted", reason);
    }

    let stats = h.coordinator.get_assignment_statistics().await.unwrap();
    assert_eq!(stats.by_reason.manual, 0);
}

#[tokio::test]
async fn test_named_timezone_calendar_tracks_daylight_saving() {
    // Wednesday 2024-07-03 16:00 EDT
    let h = Harness::new(Utc.with_ymd_and_hms(2024, 7, 3, 20, 0, 0).unwrap());
    h.store.insert_calendar(WorkingHoursConfig::business_week(
        "default",
        "America/New_York",
        hm(9, 0),
        hm(17, 0),
    ));
    two_reps(&h);
    let lead_id = h.lead("lead-1", json!({}));

    // 1h Wednesday, then Thursday 09:00 EDT (13:00 UTC) + 3h
    let result = h.coordinator.assign_lead(&lead_id).await.unwrap();
    assert_eq!(result.sla_deadline, Some(Utc.with_ymd_and_hms(2024, 7, 4, 16, 0, 0).unwrap()));

    // 17:30 EDT: every rep is off shift
    h.clock.set(Utc.with_ymd_and_hms(2024, 7, 3, 21, 30, 0).unwrap());
    let late = h.lead("lead-2", json!({}));
    let err = h.coordinator.assign_lead(&late).await.unwrap_err();
    assert!(matches!(err, AssignmentError::NoEligibleAgent(_)));
}
