//! Lead snapshot and its assignment sub-record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::ids::{AgentId, LeadId};
use crate::error::{AssignmentError, Result};

/// Lead pipeline status
///
/// `ClosedWon` and `ClosedLost` are terminal: a closed lead never changes owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Proposal => "proposal",
            LeadStatus::Negotiation => "negotiation",
            LeadStatus::ClosedWon => "closed_won",
            LeadStatus::ClosedLost => "closed_lost",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LeadStatus::ClosedWon | LeadStatus::ClosedLost)
    }

    /// Statuses that still accept assignment
    pub fn open_statuses() -> &'static [LeadStatus] {
        &[
            LeadStatus::New,
            LeadStatus::Contacted,
            LeadStatus::Qualified,
            LeadStatus::Proposal,
            LeadStatus::Negotiation,
        ]
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "proposal" => Ok(LeadStatus::Proposal),
            "negotiation" => Ok(LeadStatus::Negotiation),
            "closed_won" | "won" => Ok(LeadStatus::ClosedWon),
            "closed_lost" | "lost" => Ok(LeadStatus::ClosedLost),
            _ => Err(format!("Unknown lead status: {}", s)),
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a lead ended up with its current owner
///
/// Persisted as a plain string: `rule:<name>`, `round_robin`, or the free-text
/// reason supplied on manual reassignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum AssignmentReason {
    /// Matched an assignment rule
    Rule { name: String },
    /// Fallback least-loaded pick
    RoundRobin,
    /// Manual reassignment with the operator's reason
    Manual(String),
}

impl AssignmentReason {
    pub fn rule(name: impl Into<String>) -> Self {
        AssignmentReason::Rule { name: name.into() }
    }

    /// Manual reason, rejecting text that would read back as another kind
    pub fn manual(reason: impl Into<String>) -> Result<Self> {
        let reason = reason.into();
        match AssignmentReason::from(reason.clone()) {
            AssignmentReason::Manual(_) => Ok(AssignmentReason::Manual(reason)),
            other => Err(AssignmentError::validation(format!(
                "reason '{}' is reserved for {} assignments",
                reason,
                other.kind()
            ))),
        }
    }

    /// Bucket name used in statistics
    pub fn kind(&self) -> &'static str {
        match self {
            AssignmentReason::Rule { .. } => "rule",
            AssignmentReason::RoundRobin => "round_robin",
            AssignmentReason::Manual(_) => "manual",
        }
    }
}

impl fmt::Display for AssignmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentReason::Rule { name } => write!(f, "rule:{}", name),
            AssignmentReason::RoundRobin => f.write_str("round_robin"),
            AssignmentReason::Manual(reason) => f.write_str(reason),
        }
    }
}

impl From<String> for AssignmentReason {
    fn from(s: String) -> Self {
        if s == "round_robin" {
            AssignmentReason::RoundRobin
        } else if let Some(name) = s.strip_prefix("rule:") {
            AssignmentReason::rule(name)
        } else {
            AssignmentReason::Manual(s)
        }
    }
}

impl From<AssignmentReason> for String {
    fn from(reason: AssignmentReason) -> Self {
        reason.to_string()
    }
}

/// The part of a lead this engine owns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub assigned_to: Option<AgentId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assignment_reason: Option<AssignmentReason>,
}

impl Assignment {
    pub fn new(assigned_to: AgentId, assigned_at: DateTime<Utc>, reason: AssignmentReason) -> Self {
        Self {
            assigned_to: Some(assigned_to),
            assigned_at: Some(assigned_at),
            assignment_reason: Some(reason),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_to.is_some()
    }
}

/// Lead snapshot as read from the lead store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: LeadId,
    pub status: LeadStatus,
    /// Flat attribute bag (score, company and qualification fields, source)
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub assignment: Assignment,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(id: impl Into<LeadId>, status: LeadStatus, attributes: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status,
            attributes,
            assignment: Assignment::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolve a condition field against this lead
    ///
    /// `status` and `id` come from the typed fields. Anything else is looked up
    /// as an exact attribute key first, then as a dotted path into nested
    /// objects (`score.value`). JSON `null` counts as missing.
    pub fn field(&self, path: &str) -> Option<Value> {
        match path {
            "status" => return Some(Value::String(self.status.as_str().to_string())),
            "id" => return Some(Value::String(self.id.0.clone())),
            _ => {}
        }

        if let Some(value) = self.attributes.get(path) {
            return non_null(value);
        }

        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.attributes.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        non_null(current)
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }
}

fn non_null(value: &Value) -> Option<Value> {
    if value.is_null() {
        None
    } else {
        Some(value.clone())
    }
}
