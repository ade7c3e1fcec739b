use thiserror::Error;

use crate::model::{AgentId, LeadId, LeadStatus, RuleId};

/// Error types for lead assignment and SLA operations
///
/// Covers every failure the engine surfaces to its callers, from malformed rules
/// and calendars to state conflicts on a lead and storage failures. The
/// coordinator passes these through untranslated; retry policy belongs to the
/// caller.
///
/// # Examples
///
/// ```
/// use leadflow_assignment_engine::{AssignmentError, Result};
///
/// fn save_rule(name: &str) -> Result<()> {
///     if name.is_empty() {
///         return Err(AssignmentError::validation("rule name cannot be empty"));
///     }
///     Ok(())
/// }
///
/// match save_rule("") {
///     Ok(_) => println!("Rule saved"),
///     Err(AssignmentError::Validation(msg)) => println!("Rejected: {}", msg),
///     Err(e) => println!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum AssignmentError {
    /// Malformed input rejected before it reaches the engine
    ///
    /// # Examples
    /// - Rule with an empty name or condition field
    /// - `in` operator with a non-array value
    /// - Working day whose end time is not after its start time
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested lead does not exist
    #[error("Lead not found: {0}")]
    LeadNotFound(LeadId),

    /// The requested agent does not exist
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// The requested assignment rule does not exist
    #[error("Assignment rule not found: {0}")]
    RuleNotFound(RuleId),

    /// No working-hours calendar is registered under the id
    #[error("Working-hours calendar not found: {0}")]
    CalendarNotFound(String),

    /// Neither a rule match nor the balancer produced a candidate
    #[error("No eligible agent for lead {0}")]
    NoEligibleAgent(LeadId),

    /// The lead already has an owner and the write required it to be unassigned
    #[error("Lead {lead_id} is already assigned to {assigned_to}")]
    AlreadyAssigned {
        lead_id: LeadId,
        assigned_to: AgentId,
    },

    /// The lead is in a terminal status and can no longer be assigned
    #[error("Lead {lead_id} is closed ({status})")]
    LeadAlreadyClosed {
        lead_id: LeadId,
        status: LeadStatus,
    },

    /// The agent exists but cannot own leads right now
    ///
    /// # Examples
    /// - Agent deactivated
    /// - Role without lead ownership
    #[error("Agent {agent_id} is not eligible: {reason}")]
    AgentNotEligible {
        agent_id: AgentId,
        reason: String,
    },

    /// A calendar walk hit the iteration cap without finding working time
    ///
    /// Raised for calendars with no working days, or whose holidays cover
    /// every working day in the searched window.
    #[error("Calendar {calendar_id} has no working time within {steps} day steps")]
    CalendarExhausted {
        calendar_id: String,
        steps: u32,
    },

    /// Database operation errors
    ///
    /// # Examples
    /// - Connection failures
    /// - Migration failures
    /// - Row decoding errors
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AssignmentError {
    fn from(err: anyhow::Error) -> Self {
        AssignmentError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AssignmentError {
    fn from(err: sqlx::Error) -> Self {
        AssignmentError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AssignmentError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AssignmentError::Database(format!("migration failed: {}", err))
    }
}

impl From<serde_json::Error> for AssignmentError {
    fn from(err: serde_json::Error) -> Self {
        AssignmentError::Validation(format!("invalid JSON payload: {}", err))
    }
}

impl From<config::ConfigError> for AssignmentError {
    fn from(err: config::ConfigError) -> Self {
        AssignmentError::Configuration(err.to_string())
    }
}

impl AssignmentError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        AssignmentError::Validation(msg.into())
    }

    /// Create a database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        AssignmentError::Database(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        AssignmentError::Configuration(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        AssignmentError::Internal(msg.into())
    }

    /// Create an agent-not-eligible error
    pub fn not_eligible<S: Into<String>>(agent_id: AgentId, reason: S) -> Self {
        AssignmentError::AgentNotEligible {
            agent_id,
            reason: reason.into(),
        }
    }

    /// True for the not-found family (lead, agent, rule, calendar)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AssignmentError::LeadNotFound(_)
                | AssignmentError::AgentNotFound(_)
                | AssignmentError::RuleNotFound(_)
                | AssignmentError::CalendarNotFound(_)
        )
    }

    /// True for state conflicts on the lead itself
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AssignmentError::AlreadyAssigned { .. } | AssignmentError::LeadAlreadyClosed { .. }
        )
    }
}

/// Result type alias for assignment engine operations
pub type Result<T> = std::result::Result<T, AssignmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = AssignmentError::LeadNotFound(LeadId::from("lead-1"));
        assert!(err.is_not_found());
        assert!(!err.is_conflict());

        let err = AssignmentError::AlreadyAssigned {
            lead_id: LeadId::from("lead-1"),
            assigned_to: AgentId::from("rep-a"),
        };
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "Lead lead-1 is already assigned to rep-a");
    }

    #[test]
    fn test_anyhow_maps_to_internal() {
        let err: AssignmentError = anyhow::anyhow!("boom").into();
        match err {
            AssignmentError::Internal(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
