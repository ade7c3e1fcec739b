//! Table and JSON rendering

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use leadflow_assignment_engine::monitoring::{AssignmentStatistics, UserWorkload};
use leadflow_assignment_engine::routing::ConditionOutcome;
use leadflow_assignment_engine::sla::SlaStatus;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Tabled)]
struct SlaRow {
    #[tabled(rename = "Lead")]
    lead: String,
    #[tabled(rename = "Agent")]
    agent: String,
    #[tabled(rename = "Deadline")]
    deadline: String,
    #[tabled(rename = "Hours left")]
    hours_remaining: String,
    #[tabled(rename = "Level")]
    level: u8,
}

pub fn print_sla(statuses: &[SlaStatus]) {
    let rows = statuses.iter().map(|s| SlaRow {
        lead: s.lead_id.to_string(),
        agent: s.assigned_to.to_string(),
        deadline: s.sla_deadline.format("%Y-%m-%d %H:%M UTC").to_string(),
        hours_remaining: if s.is_overdue {
            format!("{:.2}", s.hours_remaining).red().to_string()
        } else {
            format!("{:.2}", s.hours_remaining)
        },
        level: s.escalation_level,
    });
    println!("{}", Table::new(rows).with(Style::rounded()));
}

#[derive(Tabled)]
struct WorkloadRow {
    #[tabled(rename = "Agent")]
    agent: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Open leads")]
    open_leads: String,
    #[tabled(rename = "Overdue")]
    overdue: u32,
}

pub fn print_workloads(workloads: &[UserWorkload]) {
    let rows = workloads.iter().map(|w| WorkloadRow {
        agent: w.agent_id.to_string(),
        name: w.name.clone(),
        role: w.role.to_string(),
        active: if w.is_active { "yes".to_string() } else { "no".dimmed().to_string() },
        open_leads: match w.capacity {
            Some(capacity) => format!("{}/{}", w.active_leads, capacity),
            None => w.active_leads.to_string(),
        },
        overdue: w.overdue_leads,
    });
    println!("{}", Table::new(rows).with(Style::rounded()));
}

pub fn print_statistics(stats: &AssignmentStatistics) {
    println!("{}", "Assignment statistics".bold());
    println!("  open leads:     {}", stats.open_leads);
    println!("  assigned:       {}", stats.assigned);
    println!("  unassigned:     {}", stats.unassigned);
    println!(
        "  by reason:      rule {}, round robin {}, manual {}",
        stats.by_reason.rule, stats.by_reason.round_robin, stats.by_reason.manual
    );
    for (rule, count) in &stats.by_rule {
        println!("    {:<24} {}", rule, count);
    }
    println!("  overdue:        {}", stats.overdue);
    for (level, count) in &stats.by_escalation_level {
        println!("    level {}:      {}", level, count);
    }
    if let Some(avg) = stats.average_hours_remaining {
        println!("  avg hours left: {:.2}", avg);
    }
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Operator")]
    operator: String,
    #[tabled(rename = "Expected")]
    expected: String,
    #[tabled(rename = "Actual")]
    actual: String,
    #[tabled(rename = "Match")]
    matched: String,
}

pub fn print_outcomes(outcomes: &[ConditionOutcome]) {
    let rows = outcomes.iter().map(|o| OutcomeRow {
        field: o.field.clone(),
        operator: format!("{:?}", o.operator),
        expected: o.expected.to_string(),
        actual: o
            .actual
            .as_ref()
            .map_or_else(|| "(missing)".dimmed().to_string(), |v| v.to_string()),
        matched: if o.matched { "✓".green().to_string() } else { "✗".red().to_string() },
    });
    println!("{}", Table::new(rows).with(Style::rounded()));
    let all = outcomes.iter().all(|o| o.matched);
    println!("rule {}", if all { "matches".green() } else { "does not match".red() });
}
