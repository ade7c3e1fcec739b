//! Property tests for calendar arithmetic, balancing, escalation and rule ordering

use chrono::{Duration, NaiveTime, TimeZone};
use leadflow_assignment_engine::prelude::*;
use leadflow_assignment_engine::routing::{select_least_loaded, EvaluationContext};
use proptest::prelude::*;
use serde_json::json;
use std::collections::{HashMap, HashSet};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Weekdays 09:00-17:30 at +05:30 with a lunch break and one holiday
fn office() -> WorkingHoursCalendar {
    let config = WorkingHoursConfig::business_week("office", "+05:30", t(9, 0), t(17, 30)).with_break(t(12, 30), t(13, 15));
    let holiday = Holiday::new(
        chrono::NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
        "Offsite",
        HolidayType::Company,
    );
    WorkingHoursCalendar::new(config, vec![holiday]).unwrap()
}

/// Weekdays 08:00-18:00 in New York; March 2024 crosses the spring-forward
fn new_york() -> WorkingHoursCalendar {
    let config = WorkingHoursConfig::business_week("nyc", "America/New_York", t(8, 0), t(18, 0));
    WorkingHoursCalendar::new(config, Vec::new()).unwrap()
}

/// Any instant in March and April 2024, to the minute
fn instant() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..61 * 24 * 60).prop_map(|minutes| Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes))
}

fn agent_ids(n: usize) -> Vec<AgentId> {
    (0..n).map(|i| AgentId::from(format!("rep-{:02}", i))).collect()
}

proptest! {
    #[test]
    fn zero_duration_is_identity(start in instant()) {
        let calendar = office();
        prop_assert_eq!(calendar.add_working_duration(start, Duration::zero()).unwrap(), start);
    }

    #[test]
    fn walked_duration_is_measured_back(start in instant(), minutes in 1i64..6_000) {
        let calendar = office();
        let duration = Duration::minutes(minutes);
        let deadline = calendar.add_working_duration(start, duration).unwrap();

        prop_assert!(deadline > start);
        prop_assert_eq!(calendar.working_duration_between(start, deadline), duration);
        prop_assert_eq!(calendar.working_duration_between(deadline, start), -duration);
        // A positive walk always ends inside working time or on a segment's end
        prop_assert!(calendar.is_working_time(deadline - Duration::seconds(1)));
    }

    #[test]
    fn walks_across_dst_are_measured_back(start in instant(), minutes in 1i64..6_000) {
        let calendar = new_york();
        let duration = Duration::minutes(minutes);
        let deadline = calendar.add_working_duration(start, duration).unwrap();

        prop_assert_eq!(calendar.working_duration_between(start, deadline), duration);
        prop_assert!(calendar.is_working_time(deadline - Duration::seconds(1)));
    }

    #[test]
    fn longer_walks_never_end_earlier(start in instant(), a in 0i64..3_000, b in 0i64..3_000) {
        let calendar = office();
        let (short, long) = (a.min(b), a.max(b));
        let first = calendar.add_working_duration(start, Duration::minutes(short)).unwrap();
        let second = calendar.add_working_duration(start, Duration::minutes(long)).unwrap();
        prop_assert!(first <= second);
    }

    #[test]
    fn balancer_picks_a_least_loaded_agent(
        loads in prop::collection::vec(0u32..5, 1..8),
        cursor in 0u64..1_000,
    ) {
        let ids = agent_ids(loads.len());
        let load_map: HashMap<AgentId, u32> = ids.iter().cloned().zip(loads.iter().copied()).collect();
        let min = *loads.iter().min().unwrap();

        let picked = select_least_loaded(&ids, &load_map, cursor).unwrap();
        prop_assert_eq!(load_map[&picked], min);
    }

    #[test]
    fn cursor_rotates_through_every_tie(loads in prop::collection::vec(0u32..3, 1..8), start in 0u64..1_000) {
        let ids = agent_ids(loads.len());
        let load_map: HashMap<AgentId, u32> = ids.iter().cloned().zip(loads.iter().copied()).collect();
        let min = *loads.iter().min().unwrap();
        let tied: HashSet<AgentId> = ids.iter().filter(|id| load_map[*id] == min).cloned().collect();

        let seen: HashSet<AgentId> = (0..tied.len() as u64)
            .map(|offset| select_least_loaded(&ids, &load_map, start + offset).unwrap())
            .collect();
        prop_assert_eq!(seen, tied);
    }

    #[test]
    fn escalation_never_decreases(assigned in instant(), a in 0i64..20_000, b in 0i64..20_000, hours in 0.5f64..24.0) {
        let calendar = office();
        let clock = SlaClock::default();
        let earlier = assigned + Duration::minutes(a.min(b));
        let later = assigned + Duration::minutes(a.max(b));

        let first = clock.compute_status(&calendar, assigned, hours, earlier).unwrap();
        let second = clock.compute_status(&calendar, assigned, hours, later).unwrap();

        prop_assert_eq!(first.sla_deadline, second.sla_deadline);
        prop_assert!(first.escalation_level <= second.escalation_level);
        prop_assert!(first.hours_remaining >= second.hours_remaining);
        prop_assert!(!first.is_overdue || second.is_overdue);
    }

    #[test]
    fn rule_evaluation_is_first_match(
        thresholds in prop::collection::vec((0i32..5, 0i64..100), 1..6),
        score in 0i64..100,
    ) {
        let rules: Vec<AssignmentRule> = thresholds
            .iter()
            .enumerate()
            .map(|(i, (priority, threshold))| {
                AssignmentRule::new(format!("rule-{}", i), format!("Rule {}", i), *priority)
                    .with_condition("score", ConditionOperator::GreaterThan, json!(threshold))
                    .with_action(RuleAction::RoundRobin)
            })
            .collect();

        let agents = vec![AgentSnapshot {
            agent: Agent::new("rep-a", "Alice", AgentRole::SalesRep),
            active_lead_count: 0,
        }];
        let calendars = CalendarSet::new(WorkingHoursCalendar::new(WorkingHoursConfig::always_open("default"), Vec::new()).unwrap());
        let ctx = EvaluationContext {
            agents: &agents,
            calendars: &calendars,
            now: Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap(),
        };
        let attributes = json!({"score": score}).as_object().cloned().unwrap();
        let lead = Lead::new("lead-1", LeadStatus::New, attributes);

        let engine = RuleEngine::new();
        let evaluated = engine.evaluate(&lead, &rules, &ctx).map(|m| m.rule.id.clone());
        let again = engine.evaluate(&lead, &rules, &ctx).map(|m| m.rule.id.clone());
        let expected = engine.first_condition_match(&lead, &rules).map(|r| r.id.clone());
        prop_assert_eq!(&evaluated, &again);
        prop_assert_eq!(&evaluated, &expected);

        // The winner has the lowest priority among the rules that hold
        if let Some(id) = evaluated {
            let winner = rules.iter().find(|r| r.id == id).unwrap();
            let best = rules
                .iter()
                .filter(|r| r.matches_conditions(&lead))
                .map(|r| r.priority)
                .min()
                .unwrap();
            prop_assert_eq!(winner.priority, best);
        }
    }
}
