//! # SLA Clock
//!
//! Working-hours aware response deadlines and escalation levels.
//!
//! Deadlines are `assigned_at` advanced by the SLA in *working* time, and the
//! remaining time is measured the same way, so nights, weekends and holidays
//! neither count against the agent nor shorten the window. Escalation is a pure
//! step function of the timing, recomputed on every query.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::WorkingHoursCalendar;
use crate::error::{AssignmentError, Result};
use crate::model::{AgentId, LeadId};

/// Condition that raises the escalation level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// Share of the SLA already consumed (1.0 = the full window)
    ElapsedFraction { fraction: f64 },
    /// Overdue by at least this many working hours
    OverdueBy { hours: f64 },
}

impl EscalationTrigger {
    fn fires(&self, timing: &SlaTiming) -> bool {
        match self {
            EscalationTrigger::ElapsedFraction { fraction } => timing.elapsed_fraction >= *fraction,
            EscalationTrigger::OverdueBy { hours } => timing.is_overdue && -timing.hours_remaining >= *hours,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscalationStep {
    pub level: u8,
    #[serde(flatten)]
    pub trigger: EscalationTrigger,
}

/// Ordered escalation thresholds
///
/// The level is the highest step whose trigger fires, or 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub steps: Vec<EscalationStep>,
}

impl Default for EscalationPolicy {
    /// 1 from 75% consumed, 2 once overdue, 3 from 24 working hours overdue
    fn default() -> Self {
        Self {
            steps: vec![
                EscalationStep {
                    level: 1,
                    trigger: EscalationTrigger::ElapsedFraction { fraction: 0.75 },
                },
                EscalationStep {
                    level: 2,
                    trigger: EscalationTrigger::OverdueBy { hours: 0.0 },
                },
                EscalationStep {
                    level: 3,
                    trigger: EscalationTrigger::OverdueBy { hours: 24.0 },
                },
            ],
        }
    }
}

impl EscalationPolicy {
    pub fn level_for(&self, timing: &SlaTiming) -> u8 {
        self.steps
            .iter()
            .filter(|step| step.trigger.fires(timing))
            .map(|step| step.level)
            .max()
            .unwrap_or(0)
    }

    pub fn max_level(&self) -> u8 {
        self.steps.iter().map(|s| s.level).max().unwrap_or(0)
    }

    /// Levels must rise with stricter triggers, or escalation could regress
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut last_fraction: Option<(f64, u8)> = None;
        let mut last_overdue: Option<(f64, u8)> = None;

        for step in &self.steps {
            if step.level == 0 {
                return Err("escalation level 0 is implicit and cannot be configured".to_string());
            }
            let (value, last) = match step.trigger {
                EscalationTrigger::ElapsedFraction { fraction } => {
                    if !fraction.is_finite() || fraction < 0.0 {
                        return Err(format!("invalid elapsed fraction {}", fraction));
                    }
                    (fraction, &mut last_fraction)
                }
                EscalationTrigger::OverdueBy { hours } => {
                    if !hours.is_finite() || hours < 0.0 {
                        return Err(format!("invalid overdue hours {}", hours));
                    }
                    (hours, &mut last_overdue)
                }
            };
            if let Some((prev_value, prev_level)) = *last {
                if value <= prev_value || step.level <= prev_level {
                    return Err(format!(
                        "escalation step for level {} must have a higher threshold and level than the previous step",
                        step.level
                    ));
                }
            }
            *last = Some((value, step.level));
        }
        Ok(())
    }
}

/// Computed deadline and urgency for one assignment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaTiming {
    pub sla_deadline: DateTime<Utc>,
    /// Working hours from now to the deadline; negative once overdue
    pub hours_remaining: f64,
    pub is_overdue: bool,
    /// Working time since assignment divided by the SLA
    pub elapsed_fraction: f64,
    pub escalation_level: u8,
}

/// SLA view of one assigned lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaStatus {
    pub lead_id: LeadId,
    pub assigned_to: AgentId,
    pub assigned_at: DateTime<Utc>,
    pub sla_hours: f64,
    pub sla_deadline: DateTime<Utc>,
    pub hours_remaining: f64,
    pub is_overdue: bool,
    pub escalation_level: u8,
}

impl SlaStatus {
    pub fn new(lead_id: LeadId, assigned_to: AgentId, assigned_at: DateTime<Utc>, sla_hours: f64, timing: SlaTiming) -> Self {
        Self {
            lead_id,
            assigned_to,
            assigned_at,
            sla_hours,
            sla_deadline: timing.sla_deadline,
            hours_remaining: timing.hours_remaining,
            is_overdue: timing.is_overdue,
            escalation_level: timing.escalation_level,
        }
    }
}

/// Applies an escalation policy over a working-hours calendar
#[derive(Debug, Clone, Default)]
pub struct SlaClock {
    policy: EscalationPolicy,
}

impl SlaClock {
    pub fn new(policy: EscalationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Deadline, remaining time and escalation level at `now`
    pub fn compute_status(
        &self,
        calendar: &WorkingHoursCalendar,
        assigned_at: DateTime<Utc>,
        sla_hours: f64,
        now: DateTime<Utc>,
    ) -> Result<SlaTiming> {
        let sla = hours_to_duration(sla_hours)?;
        let sla_deadline = calendar.add_working_duration(assigned_at, sla)?;

        let remaining = calendar.working_duration_between(now, sla_deadline);
        let elapsed = calendar.working_duration_between(assigned_at, now).max(Duration::zero());

        let elapsed_fraction = if sla.is_zero() {
            if now >= sla_deadline { 1.0 } else { 0.0 }
        } else {
            seconds(elapsed) / seconds(sla)
        };

        let mut timing = SlaTiming {
            sla_deadline,
            hours_remaining: seconds(remaining) / 3600.0,
            is_overdue: now > sla_deadline,
            elapsed_fraction,
            escalation_level: 0,
        };
        timing.escalation_level = self.policy.level_for(&timing);
        Ok(timing)
    }
}

fn seconds(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

/// Longest SLA window accepted, in working hours
pub const MAX_SLA_HOURS: f64 = 1_000.0;

/// Fractional hours to a whole-second duration
pub fn hours_to_duration(hours: f64) -> Result<Duration> {
    if !hours.is_finite() || hours < 0.0 || hours > MAX_SLA_HOURS {
        return Err(AssignmentError::validation(format!(
            "invalid SLA hours {} (allowed 0 to {})",
            hours, MAX_SLA_HOURS
        )));
    }
    Duration::try_seconds((hours * 3600.0).round() as i64)
        .ok_or_else(|| AssignmentError::validation(format!("SLA hours {} out of range", hours)))
}
