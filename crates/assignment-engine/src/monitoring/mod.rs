//! Events, audit entries and aggregate reports

pub mod audit;
pub mod events;
pub mod stats;

pub use audit::{AuditEntry, AuditKind, MemoryAuditLog, TracingAuditSink};
pub use events::{AssignmentEvent, AssignmentEvents};
pub use stats::{workloads, AssignmentStatistics, ReasonBreakdown, UserWorkload};
