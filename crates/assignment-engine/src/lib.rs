//! # Lead Assignment & Routing Engine
//!
//! Decides which sales agent owns each new lead and tracks whether that agent
//! responds within a working-hours aware SLA.
//!
//! ## Features
//!
//! - **Rule Routing**: priority-ordered, first-match-wins rules over lead attributes
//! - **Workload Balancing**: least-loaded agent, ties rotated by a per-pool cursor
//! - **Working-Hours Calendars**: weekly schedules, breaks and holidays in an IANA timezone or fixed offset
//! - **SLA Tracking**: deadlines and escalation levels measured in working time
//! - **Manual Reassignment**: overwrite ownership with an audit trail
//! - **Persistence**: in-memory and SQLite implementations of every store trait
//!
//! ## Architecture
//!
//! - [`calendar`]: working-hours calendar and holiday handling
//! - [`routing`]: rule engine, eligibility filter and workload balancer
//! - [`sla`]: SLA clock and escalation policy
//! - [`orchestrator`]: the `AssignmentCoordinator` tying everything to the stores
//! - [`store`]: collaborator traits and their implementations
//! - [`monitoring`]: events, audit entries, workloads and statistics
//! - [`model`]: leads, agents and their identifiers
//! - [`config`] / [`logging`] / [`error`]: the ambient stack
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use leadflow_assignment_engine::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = EngineConfig::load(None)?;
//!     setup_logging(&config.logging)?;
//!
//!     let store = Arc::new(SqliteStore::from_config(&config.database).await?);
//!     let coordinator = AssignmentCoordinator::builder()
//!         .with_config(config)
//!         .with_store(store)
//!         .build()?;
//!
//!     let report = coordinator.assign_unassigned_leads(100).await?;
//!     println!("Assigned {} lead(s)", report.assigned.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod config;
pub mod logging;

pub mod model;
pub mod calendar;
pub mod routing;
pub mod sla;

pub mod orchestrator;
pub mod store;
pub mod monitoring;

pub use error::{AssignmentError, Result};
pub use config::EngineConfig;
pub use orchestrator::AssignmentCoordinator;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{AssignmentCoordinator, AssignmentError, EngineConfig, Result};

    pub use crate::config::{AssignmentConfig, DatabaseConfig, SlaConfig};
    pub use crate::logging::{setup_logging, LoggingConfig};

    pub use crate::model::{
        Agent, AgentId, AgentRole, AgentSnapshot, Assignment, AssignmentReason, Lead, LeadId, LeadStatus, RuleId,
    };

    pub use crate::calendar::{
        CalendarSet, DaySchedule, Holiday, HolidayType, WeeklySchedule, WorkingHoursCalendar, WorkingHoursConfig,
    };

    pub use crate::routing::{
        AssignOptions, AssignmentRule, Condition, ConditionOperator, RuleAction, RuleEngine, WorkloadBalancer,
    };

    pub use crate::sla::{EscalationPolicy, EscalationStep, EscalationTrigger, SlaClock, SlaStatus};

    pub use crate::orchestrator::{
        AssignmentCoordinatorBuilder, AssignmentResult, Clock, ManualClock, OverdueFilter, ReassignmentResult,
        SweepReport, SystemClock,
    };

    pub use crate::store::{
        AgentDirectory, AuditSink, CalendarStore, CursorStore, InMemoryStore, LeadFilter, LeadStore, RuleStore,
        SqliteStore,
    };

    pub use crate::monitoring::{
        AssignmentEvent, AssignmentStatistics, AuditEntry, MemoryAuditLog, TracingAuditSink, UserWorkload,
    };

    pub use chrono::{DateTime, Utc};
}
